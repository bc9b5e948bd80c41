//! In-memory model of the host page the UI surfaces are mounted into.
//!
//! A host serialises the page with [`Page::to_html`] and injects the result;
//! the session only ever mutates this model.

use crate::card::ResponseCard;
use crate::panel::ChatPanel;
use crate::state::Conversation;

/// Handle to a mounted element. Never reused within one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ai-helper-{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    next_id: u64,
    cards: Vec<(ElementId, ResponseCard)>,
    chat_panel: Option<ChatPanel>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount_card(&mut self, card: ResponseCard) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.cards.push((id, card));
        id
    }

    pub fn remove_card(&mut self, id: ElementId) -> Option<ResponseCard> {
        let index = self.cards.iter().position(|(card_id, _)| *card_id == id)?;
        Some(self.cards.remove(index).1)
    }

    pub fn card(&self, id: ElementId) -> Option<&ResponseCard> {
        self.cards
            .iter()
            .find(|(card_id, _)| *card_id == id)
            .map(|(_, card)| card)
    }

    pub fn card_mut(&mut self, id: ElementId) -> Option<&mut ResponseCard> {
        self.cards
            .iter_mut()
            .find(|(card_id, _)| *card_id == id)
            .map(|(_, card)| card)
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn chat_panel(&self) -> Option<&ChatPanel> {
        self.chat_panel.as_ref()
    }

    pub fn chat_panel_mut(&mut self) -> Option<&mut ChatPanel> {
        self.chat_panel.as_mut()
    }

    /// The chat panel, created on first use. Creating it makes it visible;
    /// an existing panel keeps its current visibility.
    pub fn ensure_chat_panel(&mut self) -> &mut ChatPanel {
        self.chat_panel.get_or_insert_with(ChatPanel::new)
    }

    pub fn to_html(&self, conversation: &Conversation) -> String {
        let mut html = String::new();
        for (id, card) in &self.cards {
            html.push_str(&format!(r#"<div id="{id}">{}</div>"#, card.to_html()));
        }
        if let Some(panel) = &self.chat_panel {
            html.push_str(&panel.to_html(conversation));
        }
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_and_remove() {
        let mut page = Page::new();
        let first = page.mount_card(ResponseCard::new("q1", "a1"));
        let second = page.mount_card(ResponseCard::new("q2", "a2"));
        assert_ne!(first, second);
        assert_eq!(page.card_count(), 2);

        let removed = page.remove_card(first).unwrap();
        assert_eq!(removed.answer(), "a1");
        assert_eq!(page.card_count(), 1);
        assert!(page.card(first).is_none());
        assert!(page.remove_card(first).is_none());
    }

    #[test]
    fn test_ids_not_reused() {
        let mut page = Page::new();
        let first = page.mount_card(ResponseCard::new("q", "a"));
        page.remove_card(first);
        let second = page.mount_card(ResponseCard::new("q", "a"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_ensure_chat_panel_keeps_state() {
        let mut page = Page::new();
        assert!(page.chat_panel().is_none());
        page.ensure_chat_panel().hide();
        assert!(!page.ensure_chat_panel().is_visible());
    }
}
