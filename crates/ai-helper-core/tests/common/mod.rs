//! Mock chat completion endpoint for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use ai_helper_core::{CompletionClient, Prompts, Session};

pub const MODEL: &str = "test-model";
pub const API_KEY: &str = "gsk_test";

/// One request as the endpoint saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct MockState {
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    reply: Arc<Mutex<(StatusCode, String)>>,
    gate: Option<Arc<Semaphore>>,
}

pub struct MockEndpoint {
    pub url: String,
    state: MockState,
}

pub fn answer(content: &str) -> String {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

impl MockEndpoint {
    /// Endpoint that answers every request immediately.
    pub async fn start(status: StatusCode, body: impl Into<String>) -> Self {
        Self::spawn(status, body.into(), None).await
    }

    /// Endpoint that holds every request until [`release`](Self::release).
    pub async fn gated(body: impl Into<String>) -> Self {
        Self::spawn(StatusCode::OK, body.into(), Some(Arc::new(Semaphore::new(0)))).await
    }

    async fn spawn(status: StatusCode, body: String, gate: Option<Arc<Semaphore>>) -> Self {
        let state = MockState {
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(Mutex::new((status, body))),
            gate,
        };

        let app = Router::new()
            .route("/v1/chat/completions", post(complete))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/v1/chat/completions"),
            state,
        }
    }

    pub fn client(&self) -> CompletionClient {
        CompletionClient::new(&self.url, API_KEY)
    }

    pub fn session(&self) -> Session {
        Session::new(self.client(), MODEL, Prompts::default())
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("no request recorded")
    }

    pub fn set_reply(&self, status: StatusCode, body: impl Into<String>) {
        *self.state.reply.lock().unwrap() = (status, body.into());
    }

    /// Let the next `count` requests through.
    pub fn admit(&self, count: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(count);
        }
    }

    /// Let every held and future request through.
    pub fn release(&self) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub async fn wait_for_calls(&self, expected: usize) {
        for _ in 0..500 {
            if self.calls() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} calls, saw {}", self.calls());
    }
}

async fn complete(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(Recorded {
        body,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
    state.calls.fetch_add(1, Ordering::SeqCst);

    if let Some(gate) = &state.gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }

    state.reply.lock().unwrap().clone()
}

/// URL on which nothing is listening.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/chat/completions")
}
