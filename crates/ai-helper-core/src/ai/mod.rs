pub mod client;

pub use client::{CompletionClient, NO_RESPONSE, REGENERATE_HINT};
