//! JSON-lines host bridge.
//!
//! The host (browser extension shim, editor plugin, test harness) writes one
//! JSON host message per line on stdin. Each event is dispatched on its own
//! task so a second selection can arrive, and be dropped, while the first
//! request is still in flight. After every handled event one snapshot line is
//! written to stdout.

use std::io::Write;

use ai_helper_core::events::parse_message;
use ai_helper_core::{Outcome, Session, SessionError, TriggerEvent, Turn};
use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct Snapshot {
    event: &'static str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    copied: Option<String>,
    phase: &'static str,
    html: String,
    conversation: Vec<Turn>,
}

impl Snapshot {
    fn capture(session: &Session, event: &'static str, result: Result<Outcome, SessionError>) -> Self {
        let (ok, outcome, error, copied) = match result {
            Ok(Outcome::Copied(text)) => (true, Some("copied"), None, Some(text)),
            Ok(outcome) => (true, Some(outcome_name(&outcome)), None, None),
            Err(err) => (false, None, Some(err.to_string()), None),
        };

        Self {
            event,
            ok,
            outcome,
            error,
            copied,
            phase: session.phase().as_str(),
            html: session.page_html(),
            conversation: session.conversation().turns().to_vec(),
        }
    }

    fn invalid(session: &Session, error: String) -> Self {
        Self {
            event: "invalid",
            ok: false,
            outcome: None,
            error: Some(error),
            copied: None,
            phase: session.phase().as_str(),
            html: session.page_html(),
            conversation: session.conversation().turns().to_vec(),
        }
    }
}

fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Displayed(_) => "displayed",
        Outcome::Dropped => "dropped",
        Outcome::Ignored => "ignored",
        Outcome::Replied(_) => "replied",
        Outcome::Copied(_) => "copied",
        Outcome::Updated => "updated",
    }
}

fn emit(snapshot: &Snapshot) {
    let line = match serde_json::to_string(snapshot) {
        Ok(line) => line,
        Err(err) => {
            warn!(error = %err, "failed to serialize snapshot");
            return;
        }
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if let Err(err) = writeln!(handle, "{line}").and_then(|_| handle.flush()) {
        warn!(error = %err, "failed to write snapshot");
    }
}

fn spawn_event(session: &Session, event: TriggerEvent) -> JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move {
        let name = event.name();
        let result = session.dispatch(event).await;
        emit(&Snapshot::capture(&session, name, result));
    })
}

/// Serve host messages until stdin closes, then wait for in-flight requests.
pub async fn run(session: Session) -> Result<()> {
    serve(session, BufReader::new(tokio::io::stdin())).await
}

async fn serve<R: AsyncBufRead + Unpin>(session: Session, reader: R) -> Result<()> {
    info!(model = session.model(), "host bridge started");

    let mut lines = reader.lines();
    let mut pending = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_message(line) {
            Ok(Some(event)) => {
                debug!(event = event.name(), "host message received");
                pending.push(spawn_event(&session, event));
            }
            Ok(None) => debug!("host message carried no event"),
            Err(err) => emit(&Snapshot::invalid(&session, format!("Parse error: {err}"))),
        }

        reap(&mut pending).await;
    }

    for task in pending {
        if let Err(err) = task.await {
            warn!(error = %err, "event task failed");
        }
    }

    info!("host bridge stopped");
    Ok(())
}

/// Drop finished event tasks from `pending`, logging any that panicked.
/// Returns the number of failed tasks.
async fn reap(pending: &mut Vec<JoinHandle<()>>) -> usize {
    let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(pending)
        .into_iter()
        .partition(|task| task.is_finished());
    *pending = running;

    let mut failed = 0;
    for task in finished {
        if let Err(err) = task.await {
            warn!(error = %err, "event task failed");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_helper_core::{CompletionClient, Prompts};
    use serde_json::{json, Value};

    fn offline_session() -> Session {
        let client = CompletionClient::new("http://127.0.0.1:9/v1/chat/completions", "gsk_test");
        Session::new(client, "test-model", Prompts::default())
    }

    fn to_json(snapshot: &Snapshot) -> Value {
        serde_json::to_value(snapshot).unwrap()
    }

    #[test]
    fn test_copied_snapshot() {
        let session = offline_session();
        let snapshot = Snapshot::capture(
            &session,
            "copyResponse",
            Ok(Outcome::Copied("**raw**".to_string())),
        );

        assert_eq!(
            to_json(&snapshot),
            json!({
                "event": "copyResponse",
                "ok": true,
                "outcome": "copied",
                "copied": "**raw**",
                "phase": "idle",
                "html": "",
                "conversation": [],
            })
        );
    }

    #[test]
    fn test_error_snapshot() {
        let session = offline_session();
        let snapshot = Snapshot::capture(&session, "copyResponse", Err(SessionError::NoResponse));

        assert_eq!(
            to_json(&snapshot),
            json!({
                "event": "copyResponse",
                "ok": false,
                "error": "no response is being displayed",
                "phase": "idle",
                "html": "",
                "conversation": [],
            })
        );
    }

    #[test]
    fn test_invalid_line_snapshot() {
        let session = offline_session();
        let err = parse_message("not json").unwrap_err();
        let value = to_json(&Snapshot::invalid(&session, format!("Parse error: {err}")));

        assert_eq!(value["event"], "invalid");
        assert_eq!(value["ok"], false);
        assert!(value["error"].as_str().unwrap().starts_with("Parse error:"));
        assert!(value.get("outcome").is_none());
    }

    #[test]
    fn test_snapshot_reflects_page_state() {
        let session = offline_session();
        session.open_chat();
        let value = to_json(&Snapshot::capture(
            &session,
            "selection",
            Ok(Outcome::Dropped),
        ));

        assert_eq!(value["outcome"], "dropped");
        assert!(value["html"].as_str().unwrap().contains("ai-helper-chat"));
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(outcome_name(&Outcome::Dropped), "dropped");
        assert_eq!(outcome_name(&Outcome::Ignored), "ignored");
        assert_eq!(outcome_name(&Outcome::Replied(3)), "replied");
        assert_eq!(outcome_name(&Outcome::Updated), "updated");
    }

    #[tokio::test]
    async fn test_serve_handles_lines_until_eof() {
        let session = offline_session();
        let input = "{\"toggleChat\": true}\n\nnot json\n{}\n";

        serve(session.clone(), BufReader::new(input.as_bytes()))
            .await
            .unwrap();

        assert!(session.chat_panel().unwrap().is_visible());
    }

    #[tokio::test]
    async fn test_reap_logs_failed_tasks() {
        let failing = tokio::spawn(async { panic!("event handler failed") });
        let finishing = tokio::spawn(async {});
        while !(failing.is_finished() && finishing.is_finished()) {
            tokio::task::yield_now().await;
        }
        let mut pending = vec![failing, finishing];

        assert_eq!(reap(&mut pending).await, 1);
        assert!(pending.is_empty());
    }
}
