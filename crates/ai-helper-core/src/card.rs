//! The ephemeral response card shown next to a selection.

use crate::markdown;
use crate::panel::escape_text;

#[derive(Debug, Clone)]
pub struct ResponseCard {
    question: String,
    answer: String,
    html: String,
    visible: bool,
    copied: bool,
    regenerating: bool,
}

impl ResponseCard {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self {
            question: question.into(),
            html: markdown::render(&answer),
            answer,
            visible: true,
            copied: false,
            regenerating: false,
        }
    }

    /// The selected text this card answers.
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Raw model output, before rendering.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Rendered body of the card.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle_visibility(&mut self) -> bool {
        self.copied = false;
        self.visible = !self.visible;
        self.visible
    }

    pub fn hide(&mut self) {
        self.copied = false;
        self.visible = false;
    }

    /// Raw answer for the host clipboard.
    pub fn copy(&mut self) -> &str {
        self.copied = true;
        &self.answer
    }

    /// "Copied!" until the next action on this card.
    pub fn copy_label(&self) -> &'static str {
        if self.copied {
            "Copied!"
        } else {
            "Copy Response"
        }
    }

    pub fn is_regenerating(&self) -> bool {
        self.regenerating
    }

    pub(crate) fn set_regenerating(&mut self, regenerating: bool) {
        if regenerating {
            self.copied = false;
        }
        self.regenerating = regenerating;
    }

    pub(crate) fn set_answer(&mut self, answer: impl Into<String>) {
        self.answer = answer.into();
        self.html = markdown::render(&self.answer);
        self.copied = false;
    }

    /// Replace the body with an error notice. The previous answer stays
    /// available to [`copy`](Self::copy).
    pub(crate) fn show_error(&mut self, message: &str) {
        self.html = format!(
            r#"<p class="ai-helper-error">Error: {}</p>"#,
            escape_text(message)
        );
    }

    pub fn to_html(&self) -> String {
        let display = if self.visible { "block" } else { "none" };
        let disabled = if self.regenerating { " disabled" } else { "" };
        format!(
            concat!(
                r#"<div class="ai-helper-card" style="display: {display}">"#,
                r#"<button class="ai-helper-close">X</button>"#,
                r#"<div class="ai-helper-response">{html}</div>"#,
                r#"<button class="ai-helper-copy">{copy}</button>"#,
                r#"<button class="ai-helper-regenerate"{disabled}>Regenerate</button>"#,
                r#"<button class="ai-helper-continue">Continue to Chat</button>"#,
                "</div>"
            ),
            display = display,
            html = self.html,
            copy = self.copy_label(),
            disabled = disabled,
        )
    }
}
