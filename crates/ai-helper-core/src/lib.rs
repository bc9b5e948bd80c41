pub mod ai;
pub mod card;
pub mod config;
pub mod error;
pub mod events;
pub mod markdown;
pub mod page;
pub mod panel;
pub mod provider;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionClient, NO_RESPONSE, REGENERATE_HINT};
pub use card::ResponseCard;
pub use config::{Config, Settings};
pub use error::{ConfigError, SessionError, TransportError};
pub use events::{HostMessage, TriggerEvent};
pub use page::{ElementId, Page};
pub use panel::{ChatPanel, Position, Viewport};
pub use provider::Provider;
pub use session::{Outcome, Phase, Prompts, Session};
pub use state::{ChatRole, Conversation, Turn};
