//! Session controller.
//!
//! One [`Session`] exists per activated page. It owns the conversation, the
//! page model and the busy flag for selection-triggered requests, and routes
//! host trigger events to the response card or the chat panel.
//!
//! Selection requests move through `Idle -> Requesting -> Displaying`. While
//! `Requesting`, further selections are dropped, not queued. Chat panel
//! requests only hold their own control's busy flag and never consult the
//! selection flag, so both kinds of request can be in flight at once.
//!
//! State sits behind a mutex that is never held across an `.await`; the only
//! suspension points are the calls to the completion endpoint.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::ai::CompletionClient;
use crate::card::ResponseCard;
use crate::config::{Settings, DEFAULT_CHAT_PROMPT, DEFAULT_SELECTION_PROMPT};
use crate::error::{SessionError, TransportError};
use crate::events::TriggerEvent;
use crate::page::{ElementId, Page};
use crate::panel::{ChatPanel, Position, Viewport};
use crate::state::{ChatRole, Conversation, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Displaying,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Requesting => "requesting",
            Phase::Displaying => "displaying",
        }
    }
}

/// What a handled event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A response card was mounted.
    Displayed(ElementId),
    /// A selection arrived while another was in flight and was dropped.
    Dropped,
    /// Nothing to act on (empty text, no selection).
    Ignored,
    /// An assistant turn was appended at this index.
    Replied(usize),
    /// Raw answer text for the host clipboard.
    Copied(String),
    /// Visibility or content of a surface changed.
    Updated,
}

#[derive(Debug, Clone)]
pub struct Prompts {
    pub selection: String,
    pub chat: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            selection: DEFAULT_SELECTION_PROMPT.to_string(),
            chat: DEFAULT_CHAT_PROMPT.to_string(),
        }
    }
}

struct SessionState {
    phase: Phase,
    conversation: Conversation,
    page: Page,
    /// The single response card currently mounted, if any.
    display: Option<ElementId>,
}

struct Inner {
    client: CompletionClient,
    model: String,
    prompts: Prompts,
    state: Mutex<SessionState>,
}

/// A busy flag raised for one in-flight request.
enum Busy {
    Selection,
    Card(ElementId),
    ChatSend,
    ChatTurn(usize),
}

impl Busy {
    fn clear(&self, state: &mut SessionState) {
        match self {
            Busy::Selection => {
                if state.phase == Phase::Requesting {
                    state.phase = Phase::Idle;
                }
            }
            Busy::Card(id) => {
                if let Some(card) = state.page.card_mut(*id) {
                    card.set_regenerating(false);
                }
            }
            Busy::ChatSend => {
                if let Some(panel) = state.page.chat_panel_mut() {
                    panel.finish_send();
                }
            }
            Busy::ChatTurn(index) => {
                if let Some(panel) = state.page.chat_panel_mut() {
                    panel.finish_regenerate(*index);
                }
            }
        }
    }
}

/// Clears its flag when the request future is dropped before completing.
///
/// Completion paths call [`release`](Self::release) while holding the state
/// lock. The guard must be declared before that lock guard so it is dropped
/// after it.
struct BusyGuard {
    inner: Arc<Inner>,
    busy: Busy,
    armed: bool,
}

impl BusyGuard {
    fn new(inner: &Arc<Inner>, busy: Busy) -> Self {
        Self {
            inner: Arc::clone(inner),
            busy,
            armed: true,
        }
    }

    fn release(&mut self, state: &mut SessionState) {
        self.busy.clear(state);
        self.armed = false;
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("request abandoned before completion");
            self.busy.clear(&mut self.inner.state.lock());
        }
    }
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(client: CompletionClient, model: impl Into<String>, prompts: Prompts) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                model: model.into(),
                prompts,
                state: Mutex::new(SessionState {
                    phase: Phase::Idle,
                    conversation: Conversation::new(),
                    page: Page::new(),
                    display: None,
                }),
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        Ok(Self::new(
            CompletionClient::from_settings(settings)?,
            settings.model.clone(),
            Prompts {
                selection: settings.selection_prompt.clone(),
                chat: settings.chat_prompt.clone(),
            },
        ))
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn is_processing(&self) -> bool {
        self.phase() == Phase::Requesting
    }

    pub fn conversation(&self) -> Conversation {
        self.inner.state.lock().conversation.clone()
    }

    /// The response card currently displayed, if any.
    pub fn response_card(&self) -> Option<ResponseCard> {
        let state = self.inner.state.lock();
        state.display.and_then(|id| state.page.card(id).cloned())
    }

    pub fn response_card_count(&self) -> usize {
        self.inner.state.lock().page.card_count()
    }

    pub fn chat_panel(&self) -> Option<ChatPanel> {
        self.inner.state.lock().page.chat_panel().cloned()
    }

    /// Serialise everything currently mounted on the page.
    pub fn page_html(&self) -> String {
        let state = self.inner.state.lock();
        state.page.to_html(&state.conversation)
    }

    /// Route one host trigger event.
    pub async fn dispatch(&self, event: TriggerEvent) -> Result<Outcome, SessionError> {
        debug!(event = event.name(), "dispatching trigger event");
        match event {
            TriggerEvent::SelectionSubmitted { text } => Ok(self.submit_selection(&text).await?),
            TriggerEvent::GenerateResponse { selection } => match selection {
                Some(text) => Ok(self.submit_selection(&text).await?),
                None => Ok(Outcome::Ignored),
            },
            TriggerEvent::ToggleChat => {
                self.toggle_chat();
                Ok(Outcome::Updated)
            }
            TriggerEvent::OpenChat | TriggerEvent::ContinueToChat => {
                self.open_chat();
                Ok(Outcome::Updated)
            }
            TriggerEvent::CloseChat => {
                self.close_chat();
                Ok(Outcome::Updated)
            }
            TriggerEvent::ToggleResponse => {
                self.toggle_response();
                Ok(Outcome::Updated)
            }
            TriggerEvent::CloseResponse => {
                self.close_response()?;
                Ok(Outcome::Updated)
            }
            TriggerEvent::CopyResponse => Ok(Outcome::Copied(self.copy_response()?)),
            TriggerEvent::RegenerateResponse => {
                self.regenerate_response().await?;
                Ok(Outcome::Updated)
            }
            TriggerEvent::SendChat { text } => self.send_chat_message(&text).await,
            TriggerEvent::RegenerateTurn { index } => {
                Ok(Outcome::Replied(self.regenerate_turn(index).await?))
            }
            TriggerEvent::NewChat => {
                self.new_chat();
                Ok(Outcome::Updated)
            }
            TriggerEvent::MoveChat { x, y, viewport } => {
                self.move_chat(x, y, viewport);
                Ok(Outcome::Updated)
            }
        }
    }

    /// Answer text selected on the page.
    ///
    /// Dropped if a selection request is already in flight. Otherwise the
    /// conversation restarts from `text` and the previous response card is
    /// removed before the request is sent. On a transport failure nothing is
    /// mounted and the session returns to idle.
    pub async fn submit_selection(&self, text: &str) -> Result<Outcome, TransportError> {
        if text.trim().is_empty() {
            return Ok(Outcome::Ignored);
        }

        let seed = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Requesting {
                warn!("selection dropped: a request is already in flight");
                return Ok(Outcome::Dropped);
            }
            state.phase = Phase::Requesting;
            if let Some(id) = state.display.take() {
                state.page.remove_card(id);
            }
            state.conversation.reset(text);
            state.conversation.turns().to_vec()
        };
        let mut guard = BusyGuard::new(&self.inner, Busy::Selection);

        let result = self
            .inner
            .client
            .send(&self.inner.prompts.selection, &seed, &self.inner.model)
            .await;

        let mut state = self.inner.state.lock();
        guard.release(&mut state);
        match result {
            Ok(answer) => {
                state.conversation.push(Turn::assistant(answer.clone()));
                let id = state.page.mount_card(ResponseCard::new(text, answer));
                state.display = Some(id);
                state.phase = Phase::Displaying;
                info!(card = %id, "response displayed");
                Ok(Outcome::Displayed(id))
            }
            Err(err) => {
                error!(error = %err, "selection request failed");
                Err(err)
            }
        }
    }

    /// Ask again for the displayed card's question and show the new answer.
    pub async fn regenerate_response(&self) -> Result<(), SessionError> {
        let (id, seed) = {
            let mut state = self.inner.state.lock();
            let id = state.display.ok_or(SessionError::NoResponse)?;
            let card = state.page.card_mut(id).ok_or(SessionError::NoResponse)?;
            if card.is_regenerating() {
                return Err(SessionError::Busy);
            }
            card.set_regenerating(true);
            (id, vec![Turn::user(card.question())])
        };
        let mut guard = BusyGuard::new(&self.inner, Busy::Card(id));

        let result = self
            .inner
            .client
            .regenerate(&self.inner.prompts.selection, &seed, &self.inner.model)
            .await;

        let mut state = self.inner.state.lock();
        guard.release(&mut state);
        let state = &mut *state;
        let Some(card) = state.page.card_mut(id) else {
            // A newer selection replaced this card while we waited.
            debug!(card = %id, "regenerated answer discarded, card is gone");
            return Err(SessionError::NoResponse);
        };

        match result {
            Ok(answer) => {
                card.set_answer(answer.clone());
                state.conversation.push(Turn::assistant(answer));
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "regenerate request failed");
                card.show_error(&err.to_string());
                Err(err.into())
            }
        }
    }

    /// Raw text of the displayed answer, for the host clipboard.
    pub fn copy_response(&self) -> Result<String, SessionError> {
        let mut state = self.inner.state.lock();
        let id = state.display.ok_or(SessionError::NoResponse)?;
        let card = state.page.card_mut(id).ok_or(SessionError::NoResponse)?;
        Ok(card.copy().to_string())
    }

    /// Show or hide the response card. Does nothing when none is mounted.
    pub fn toggle_response(&self) {
        let mut state = self.inner.state.lock();
        if let Some(id) = state.display {
            if let Some(card) = state.page.card_mut(id) {
                card.toggle_visibility();
            }
        }
    }

    pub fn close_response(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.lock();
        let id = state.display.ok_or(SessionError::NoResponse)?;
        state
            .page
            .card_mut(id)
            .ok_or(SessionError::NoResponse)?
            .hide();
        Ok(())
    }

    pub fn open_chat(&self) {
        self.inner.state.lock().page.ensure_chat_panel().show();
    }

    /// Open the chat panel if it was never created, otherwise flip its
    /// visibility.
    pub fn toggle_chat(&self) {
        let mut state = self.inner.state.lock();
        let existed = state.page.chat_panel().is_some();
        let panel = state.page.ensure_chat_panel();
        if existed {
            panel.toggle();
        }
    }

    /// Hide the panel. Its history and any in-flight request are kept.
    pub fn close_chat(&self) {
        if let Some(panel) = self.inner.state.lock().page.chat_panel_mut() {
            panel.hide();
        }
    }

    pub fn move_chat(&self, x: f64, y: f64, viewport: Viewport) -> Position {
        self.inner
            .state
            .lock()
            .page
            .ensure_chat_panel()
            .move_to(x, y, viewport)
    }

    /// Send a message from the chat panel. Blank messages are ignored.
    pub async fn send_chat_message(&self, text: &str) -> Result<Outcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Outcome::Ignored);
        }

        let history = {
            let mut state = self.inner.state.lock();
            state.page.ensure_chat_panel().begin_send()?;
            state.conversation.push(Turn::user(text));
            state.conversation.turns().to_vec()
        };
        let mut guard = BusyGuard::new(&self.inner, Busy::ChatSend);

        let result = self
            .inner
            .client
            .send(&self.inner.prompts.chat, &history, &self.inner.model)
            .await;

        let mut state = self.inner.state.lock();
        guard.release(&mut state);
        match result {
            Ok(answer) => {
                state.conversation.push(Turn::assistant(answer));
                Ok(Outcome::Replied(state.conversation.len() - 1))
            }
            Err(err) => {
                error!(error = %err, "chat request failed");
                state
                    .page
                    .ensure_chat_panel()
                    .set_notice(format!("Error: {err}"));
                Err(err.into())
            }
        }
    }

    /// Ask for a different version of the assistant turn at `index`.
    ///
    /// The context is every turn before `index`. Turns are immutable, so the
    /// new answer is appended to the end of the conversation and its index
    /// returned.
    pub async fn regenerate_turn(&self, index: usize) -> Result<usize, SessionError> {
        let context = {
            let mut state = self.inner.state.lock();
            let turn = state
                .conversation
                .get(index)
                .ok_or(SessionError::NoSuchTurn(index))?;
            if turn.role != ChatRole::Assistant {
                return Err(SessionError::NotAnAssistantTurn(index));
            }
            state.page.ensure_chat_panel().begin_regenerate(index)?;
            state.conversation.turns()[..index].to_vec()
        };
        let mut guard = BusyGuard::new(&self.inner, Busy::ChatTurn(index));

        let result = self
            .inner
            .client
            .regenerate(&self.inner.prompts.chat, &context, &self.inner.model)
            .await;

        let mut state = self.inner.state.lock();
        guard.release(&mut state);
        match result {
            Ok(answer) => {
                state.conversation.push(Turn::assistant(answer));
                Ok(state.conversation.len() - 1)
            }
            Err(err) => {
                error!(error = %err, turn = index, "regenerate request failed");
                state
                    .page
                    .ensure_chat_panel()
                    .set_notice(format!("Error: {err}"));
                Err(err.into())
            }
        }
    }

    /// Forget the whole conversation. Surfaces stay as they are.
    pub fn new_chat(&self) {
        let mut state = self.inner.state.lock();
        state.conversation.clear();
        if let Some(panel) = state.page.chat_panel_mut() {
            panel.clear_notice();
        }
        info!("conversation cleared");
    }
}
