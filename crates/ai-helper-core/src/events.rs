//! Trigger events delivered by the host page.
//!
//! Hosts send small JSON objects such as `{"text": "..."}` or
//! `{"toggleChat": true}`. [`HostMessage`] is that wire shape and
//! [`TriggerEvent`] the typed event the session reacts to.

use serde::Deserialize;

use crate::panel::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// The user submitted selected text from the page.
    SelectionSubmitted { text: String },
    /// Keyboard shortcut: answer whatever is currently selected.
    GenerateResponse { selection: Option<String> },
    ToggleChat,
    OpenChat,
    CloseChat,
    /// Keyboard shortcut: show or hide the response card.
    ToggleResponse,
    CloseResponse,
    CopyResponse,
    RegenerateResponse,
    ContinueToChat,
    SendChat { text: String },
    RegenerateTurn { index: usize },
    NewChat,
    /// The chat panel was dragged to `(x, y)`.
    MoveChat { x: f64, y: f64, viewport: Viewport },
}

impl TriggerEvent {
    /// Map a named keyboard command to its event.
    pub fn from_command(command: &str, selection: Option<String>) -> Option<Self> {
        match command {
            "toggle-chat" => Some(TriggerEvent::ToggleChat),
            "toggle-response" => Some(TriggerEvent::ToggleResponse),
            "generate-response" => Some(TriggerEvent::GenerateResponse { selection }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TriggerEvent::SelectionSubmitted { .. } => "selection",
            TriggerEvent::GenerateResponse { .. } => "generateResponse",
            TriggerEvent::ToggleChat => "toggleChat",
            TriggerEvent::OpenChat => "openChat",
            TriggerEvent::CloseChat => "closeChat",
            TriggerEvent::ToggleResponse => "toggleResponse",
            TriggerEvent::CloseResponse => "closeResponse",
            TriggerEvent::CopyResponse => "copyResponse",
            TriggerEvent::RegenerateResponse => "regenerateResponse",
            TriggerEvent::ContinueToChat => "continueToChat",
            TriggerEvent::SendChat { .. } => "chat",
            TriggerEvent::RegenerateTurn { .. } => "regenerateTurn",
            TriggerEvent::NewChat => "newChat",
            TriggerEvent::MoveChat { .. } => "moveChat",
        }
    }
}

/// Drop point of a chat panel drag, with the viewport it happened in.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelDrag {
    pub x: f64,
    pub y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostMessage {
    pub text: Option<String>,
    pub selection: Option<String>,
    pub command: Option<String>,
    pub open_chat: bool,
    pub toggle_chat: bool,
    pub close_chat: bool,
    pub generate_response: bool,
    pub toggle_response: bool,
    pub close_response: bool,
    pub copy_response: bool,
    pub regenerate_response: bool,
    pub continue_to_chat: bool,
    pub chat: Option<String>,
    pub regenerate_turn: Option<usize>,
    pub move_chat: Option<PanelDrag>,
    pub new_chat: bool,
}

impl HostMessage {
    /// The event this message carries, if any. Chat panel commands win over
    /// selected text, as in the page script.
    pub fn into_event(self) -> Option<TriggerEvent> {
        if self.open_chat {
            return Some(TriggerEvent::OpenChat);
        }
        if self.toggle_chat {
            return Some(TriggerEvent::ToggleChat);
        }
        if let Some(command) = &self.command {
            return TriggerEvent::from_command(command, self.selection.or(self.text));
        }
        if self.generate_response {
            return Some(TriggerEvent::GenerateResponse {
                selection: self.selection.or(self.text),
            });
        }
        if let Some(text) = self.text {
            return Some(TriggerEvent::SelectionSubmitted { text });
        }
        if let Some(text) = self.chat {
            return Some(TriggerEvent::SendChat { text });
        }
        if let Some(index) = self.regenerate_turn {
            return Some(TriggerEvent::RegenerateTurn { index });
        }
        if let Some(drag) = self.move_chat {
            return Some(TriggerEvent::MoveChat {
                x: drag.x,
                y: drag.y,
                viewport: Viewport {
                    width: drag.viewport_width,
                    height: drag.viewport_height,
                },
            });
        }

        [
            (self.close_chat, TriggerEvent::CloseChat),
            (self.toggle_response, TriggerEvent::ToggleResponse),
            (self.close_response, TriggerEvent::CloseResponse),
            (self.copy_response, TriggerEvent::CopyResponse),
            (self.regenerate_response, TriggerEvent::RegenerateResponse),
            (self.continue_to_chat, TriggerEvent::ContinueToChat),
            (self.new_chat, TriggerEvent::NewChat),
        ]
        .into_iter()
        .find_map(|(set, event)| set.then_some(event))
    }
}

/// Parse one JSON host message.
pub fn parse_message(line: &str) -> Result<Option<TriggerEvent>, serde_json::Error> {
    let message: HostMessage = serde_json::from_str(line)?;
    Ok(message.into_event())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_message() {
        assert_eq!(
            parse_message(r#"{"text": "2+2=?"}"#).unwrap(),
            Some(TriggerEvent::SelectionSubmitted {
                text: "2+2=?".to_string()
            })
        );
    }

    #[test]
    fn test_chat_flags_take_priority_over_text() {
        assert_eq!(
            parse_message(r#"{"openChat": true, "text": "x"}"#).unwrap(),
            Some(TriggerEvent::OpenChat)
        );
        assert_eq!(
            parse_message(r#"{"toggleChat": true}"#).unwrap(),
            Some(TriggerEvent::ToggleChat)
        );
    }

    #[test]
    fn test_generate_response_carries_selection() {
        assert_eq!(
            parse_message(r#"{"generateResponse": true, "selection": "hi"}"#).unwrap(),
            Some(TriggerEvent::GenerateResponse {
                selection: Some("hi".to_string())
            })
        );
        assert_eq!(
            parse_message(r#"{"generateResponse": true}"#).unwrap(),
            Some(TriggerEvent::GenerateResponse { selection: None })
        );
    }

    #[test]
    fn test_keyboard_commands() {
        assert_eq!(
            parse_message(r#"{"command": "toggle-chat"}"#).unwrap(),
            Some(TriggerEvent::ToggleChat)
        );
        assert_eq!(
            parse_message(r#"{"command": "toggle-response"}"#).unwrap(),
            Some(TriggerEvent::ToggleResponse)
        );
        assert_eq!(parse_message(r#"{"command": "unknown"}"#).unwrap(), None);
    }

    #[test]
    fn test_panel_actions() {
        assert_eq!(
            parse_message(r#"{"chat": "more please"}"#).unwrap(),
            Some(TriggerEvent::SendChat {
                text: "more please".to_string()
            })
        );
        assert_eq!(
            parse_message(r#"{"regenerateTurn": 3}"#).unwrap(),
            Some(TriggerEvent::RegenerateTurn { index: 3 })
        );
        assert_eq!(
            parse_message(r#"{"newChat": true}"#).unwrap(),
            Some(TriggerEvent::NewChat)
        );
        assert_eq!(
            parse_message(r#"{"copyResponse": true}"#).unwrap(),
            Some(TriggerEvent::CopyResponse)
        );
    }

    #[test]
    fn test_panel_drag() {
        let message = r#"{"moveChat": {"x": 40, "y": 12.5, "viewportWidth": 1280, "viewportHeight": 720}}"#;
        assert_eq!(
            parse_message(message).unwrap(),
            Some(TriggerEvent::MoveChat {
                x: 40.0,
                y: 12.5,
                viewport: Viewport {
                    width: 1280.0,
                    height: 720.0
                },
            })
        );
        assert!(parse_message(r#"{"moveChat": {"x": 1}}"#).is_err());
    }

    #[test]
    fn test_empty_and_invalid_messages() {
        assert_eq!(parse_message("{}").unwrap(), None);
        assert!(parse_message("not json").is_err());
    }
}
