//! Error types.
//!
//! A payload without an answer is not an error: the client substitutes
//! [`crate::ai::NO_RESPONSE`] so the UI always has something to render.

use reqwest::StatusCode;

/// Failure talking to the completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (connection refused, DNS,
    /// timeout, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("API error {status}: {message}")]
    Http { status: StatusCode, message: String },

    /// The HTTP client could not be set up (TLS backend, invalid options).
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),

    /// A success status whose body is not JSON at all.
    #[error("invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// Missing or unusable settings, detected once at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no API key configured for {provider}; set {env_var} or run `ai-helper config set-key`")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("invalid API key format: {provider} keys start with \"{prefix}\"")]
    InvalidApiKey {
        provider: &'static str,
        prefix: &'static str,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A UI action that cannot be carried out in the current state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The affordance is already waiting on its own request.
    #[error("a request from this control is already in flight")]
    Busy,

    #[error("no turn at index {0}")]
    NoSuchTurn(usize),

    #[error("turn {0} is not an assistant turn")]
    NotAnAssistantTurn(usize),

    #[error("no response is being displayed")]
    NoResponse,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
