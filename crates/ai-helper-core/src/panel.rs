//! The persistent chat panel.
//!
//! The panel does not own the conversation; it renders whatever the session
//! hands it. Busy flags here are per control: the send button and each
//! turn's regenerate button are disabled only while their own request runs.

use std::collections::BTreeSet;

use crate::error::SessionError;
use crate::markdown;
use crate::state::{ChatRole, Conversation};

pub const PANEL_WIDTH: f64 = 400.0;
pub const PANEL_HEIGHT: f64 = 600.0;

/// Part of the panel that must stay on screen while dragging.
const MIN_VISIBLE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Keep an element of the given size inside the viewport.
pub fn clamp_to_viewport(x: f64, y: f64, width: f64, height: f64, viewport: Viewport) -> Position {
    let max_x = viewport.width - MIN_VISIBLE.max(width);
    let max_y = viewport.height - MIN_VISIBLE.max(height);
    Position {
        x: x.min(max_x).max(0.0),
        y: y.min(max_y).max(0.0),
    }
}

#[derive(Debug, Clone)]
pub struct ChatPanel {
    visible: bool,
    /// `None` while docked at the default top-right spot.
    position: Option<Position>,
    sending: bool,
    regenerating: BTreeSet<usize>,
    notice: Option<String>,
}

impl Default for ChatPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatPanel {
    pub fn new() -> Self {
        Self {
            visible: true,
            position: None,
            sending: false,
            regenerating: BTreeSet::new(),
            notice: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn move_to(&mut self, x: f64, y: f64, viewport: Viewport) -> Position {
        let position = clamp_to_viewport(x, y, PANEL_WIDTH, PANEL_HEIGHT, viewport);
        self.position = Some(position);
        position
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_regenerating(&self, index: usize) -> bool {
        self.regenerating.contains(&index)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub(crate) fn begin_send(&mut self) -> Result<(), SessionError> {
        if self.sending {
            return Err(SessionError::Busy);
        }
        self.sending = true;
        self.notice = None;
        Ok(())
    }

    pub(crate) fn finish_send(&mut self) {
        self.sending = false;
    }

    pub(crate) fn begin_regenerate(&mut self, index: usize) -> Result<(), SessionError> {
        if !self.regenerating.insert(index) {
            return Err(SessionError::Busy);
        }
        self.notice = None;
        Ok(())
    }

    pub(crate) fn finish_regenerate(&mut self, index: usize) {
        self.regenerating.remove(&index);
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub(crate) fn clear_notice(&mut self) {
        self.notice = None;
    }

    /// User turns are shown as plain text, assistant turns as rendered
    /// markdown.
    pub fn to_html(&self, conversation: &Conversation) -> String {
        let mut html = String::new();

        let display = if self.visible { "flex" } else { "none" };
        let placement = match self.position {
            Some(Position { x, y }) => format!("left: {x}px; top: {y}px"),
            None => "top: 100px; right: 50px".to_string(),
        };
        html.push_str(&format!(
            r#"<div class="ai-helper-chat" style="display: {display}; {placement}">"#
        ));
        html.push_str(r#"<div class="ai-helper-chat-header"><button class="ai-helper-close">×</button></div>"#);
        html.push_str(r#"<div class="ai-helper-chat-messages">"#);

        for (index, turn) in conversation.turns().iter().enumerate() {
            match turn.role {
                ChatRole::User => {
                    html.push_str(&format!(
                        r#"<div class="ai-helper-msg user">{}</div>"#,
                        escape_text(&turn.content)
                    ));
                }
                ChatRole::Assistant => {
                    let disabled = if self.is_regenerating(index) { " disabled" } else { "" };
                    html.push_str(&format!(
                        r#"<div class="ai-helper-msg assistant">{}<button class="ai-helper-regenerate" data-turn="{index}"{disabled}>Regenerate</button></div>"#,
                        markdown::render(&turn.content)
                    ));
                }
            }
        }

        if let Some(notice) = &self.notice {
            html.push_str(&format!(
                r#"<div class="ai-helper-error">{}</div>"#,
                escape_text(notice)
            ));
        }
        html.push_str("</div>");

        let disabled = if self.sending { " disabled" } else { "" };
        html.push_str(&format!(
            r#"<div class="ai-helper-chat-input"><input type="text" placeholder="Type your message..."><button class="ai-helper-send"{disabled}>Send</button><button class="ai-helper-new-chat">New Chat</button></div>"#
        ));
        html.push_str("</div>");
        html
    }
}

/// Escape text for use as element content.
pub(crate) fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Turn;

    const VIEWPORT: Viewport = Viewport {
        width: 1280.0,
        height: 800.0,
    };

    #[test]
    fn test_clamp_inside_is_unchanged() {
        let pos = clamp_to_viewport(100.0, 50.0, PANEL_WIDTH, PANEL_HEIGHT, VIEWPORT);
        assert_eq!(pos, Position { x: 100.0, y: 50.0 });
    }

    #[test]
    fn test_clamp_negative_to_zero() {
        let pos = clamp_to_viewport(-20.0, -5.0, PANEL_WIDTH, PANEL_HEIGHT, VIEWPORT);
        assert_eq!(pos, Position { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_clamp_keeps_panel_on_screen() {
        let pos = clamp_to_viewport(5000.0, 5000.0, PANEL_WIDTH, PANEL_HEIGHT, VIEWPORT);
        assert_eq!(pos, Position { x: 880.0, y: 200.0 });
    }

    #[test]
    fn test_clamp_small_element_keeps_min_visible() {
        let pos = clamp_to_viewport(5000.0, 5000.0, 10.0, 10.0, VIEWPORT);
        assert_eq!(pos, Position { x: 1230.0, y: 750.0 });
    }

    #[test]
    fn test_send_busy_is_local() {
        let mut panel = ChatPanel::new();
        panel.begin_send().unwrap();
        assert!(matches!(panel.begin_send(), Err(SessionError::Busy)));

        // A regenerate button is a different control.
        panel.begin_regenerate(1).unwrap();
        assert!(matches!(panel.begin_regenerate(1), Err(SessionError::Busy)));

        panel.finish_send();
        panel.finish_regenerate(1);
        assert!(!panel.is_sending());
        assert!(!panel.is_regenerating(1));
    }

    #[test]
    fn test_html_escapes_user_and_renders_assistant() {
        let mut conversation = Conversation::new();
        conversation.push(Turn::user("<b>hi</b>"));
        conversation.push(Turn::assistant("**hello**"));

        let html = ChatPanel::new().to_html(&conversation);
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(html.contains("<strong>hello</strong>"));
        assert!(html.contains(r#"data-turn="1""#));
    }

    #[test]
    fn test_hidden_panel_html() {
        let mut panel = ChatPanel::new();
        assert!(!panel.toggle());
        assert!(panel.to_html(&Conversation::new()).contains("display: none"));
    }
}
