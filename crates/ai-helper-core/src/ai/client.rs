use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::TransportError;
use crate::state::Turn;

/// Shown in place of an answer when the endpoint replied without one.
pub const NO_RESPONSE: &str = "⚠️ No response available";

/// Appended to the system prompt when the user asks for another answer.
pub const REGENERATE_HINT: &str = "Give a different answer than your previous one.";

const TEST_PROMPT: &str =
    "Hello, this is a test. Please respond with \"API connection successful!\"";
const TEST_MAX_TOKENS: u32 = 50;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Every call is exactly one POST. Nothing is retried.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_tokens: Option<u32>,
}

impl CompletionClient {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            max_tokens: None,
        }
    }

    /// Client with the configured timeout applied to every request.
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask for the next assistant turn.
    ///
    /// The system prompt goes first, followed by the conversation in order.
    /// A success response without `choices[0].message.content` resolves to
    /// [`NO_RESPONSE`].
    pub async fn send(
        &self,
        system_prompt: &str,
        conversation: &[Turn],
        model: &str,
    ) -> Result<String, TransportError> {
        let request = build_request(system_prompt, conversation, model, self.max_tokens);
        info!(model, turns = conversation.len(), "sending completion request");

        Ok(self.post(&request).await?.unwrap_or_else(|| {
            warn!(model, "completion response had no answer");
            NO_RESPONSE.to_string()
        }))
    }

    /// Same as [`send`](Self::send), but asks the model not to repeat itself.
    pub async fn regenerate(
        &self,
        system_prompt: &str,
        conversation: &[Turn],
        model: &str,
    ) -> Result<String, TransportError> {
        let prompt = format!("{}\n\n{}", system_prompt.trim_end(), REGENERATE_HINT);
        self.send(&prompt, conversation, model).await
    }

    /// Check that the key and model are accepted with a tiny request.
    pub async fn test_connection(&self, model: &str) -> Result<String, TransportError> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: TEST_PROMPT,
            }],
            max_tokens: Some(TEST_MAX_TOKENS),
        };

        Ok(self
            .post(&request)
            .await?
            .unwrap_or_else(|| "Test completed".to_string()))
    }

    async fn post(&self, request: &ChatRequest<'_>) -> Result<Option<String>, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "completion endpoint responded");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status,
                message: error_message(&text),
            });
        }

        let body: Value = serde_json::from_str(&response.text().await?)?;
        Ok(extract_answer(&body))
    }
}

fn build_client(timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(TransportError::ClientBuild)
}

fn build_request<'a>(
    system_prompt: &'a str,
    conversation: &'a [Turn],
    model: &'a str,
    max_tokens: Option<u32>,
) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: system_prompt,
    });
    messages.extend(conversation.iter().map(|turn| ChatMessage {
        role: turn.role.as_str(),
        content: &turn.content,
    }));

    ChatRequest {
        model,
        messages,
        max_tokens,
    }
}

/// `choices[0].message.content`, if present and non-empty.
fn extract_answer(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

/// Prefer the endpoint's own `error.message`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_puts_system_prompt_first() {
        let turns = vec![Turn::user("2+2=?"), Turn::assistant("4"), Turn::user("why?")];
        let request = build_request("be brief", &turns, "m", None);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "2+2=?"},
                    {"role": "assistant", "content": "4"},
                    {"role": "user", "content": "why?"},
                ]
            })
        );
    }

    #[test]
    fn test_request_includes_max_tokens_when_set() {
        let request = build_request("s", &[], "m", Some(64));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["max_tokens"], 64);
    }

    #[test]
    fn test_extract_answer() {
        let body = json!({"choices": [{"message": {"content": "4"}}]});
        assert_eq!(extract_answer(&body).as_deref(), Some("4"));
    }

    #[test]
    fn test_extract_answer_missing_or_empty() {
        assert_eq!(extract_answer(&json!({})), None);
        assert_eq!(extract_answer(&json!({"choices": []})), None);
        assert_eq!(
            extract_answer(&json!({"choices": [{"message": {"content": ""}}]})),
            None
        );
        assert_eq!(extract_answer(&json!({"choices": "nope"})), None);
    }

    #[test]
    fn test_error_message_prefers_api_error() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Invalid API Key"}}"#),
            "Invalid API Key"
        );
        assert_eq!(error_message("bad gateway"), "bad gateway");
    }
}
