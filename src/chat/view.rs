use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, MutexGuard};

use super::reconcile;
use crate::api::events::ChatEvent;
use crate::api::models::{Conversation, ConversationStatus, Message};

/// The rendered thread of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageThread {
    conversation: Conversation,
    messages: Vec<Message>,
}

impl MessageThread {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.conversation.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.pending)
    }

    /// Returns true when the polled page replaced the thread.
    pub fn apply_poll(&mut self, remote: Vec<Message>) -> bool {
        match reconcile::merge_poll(&self.messages, remote) {
            Some(merged) => {
                self.messages = merged;
                true
            }
            None => false,
        }
    }

    pub fn push_pending(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn confirm(&mut self, pending_id: &str, confirmed: Message) {
        self.messages = reconcile::reconcile(&self.messages, confirmed, pending_id);
    }

    pub fn rollback(&mut self, pending_id: &str) {
        self.messages = reconcile::rollback(&self.messages, pending_id);
    }

    pub(crate) fn set_status(&mut self, status: ConversationStatus) {
        self.conversation.status = status;
    }
}

#[derive(Debug, Default)]
pub(crate) struct ViewState {
    pub thread: Option<MessageThread>,
    pub conversations: Vec<Conversation>,
    pub status_filter: Option<ConversationStatus>,
}

impl ViewState {
    /// The active thread, but only if it still belongs to `conversation_id`.
    pub fn thread_for(&mut self, conversation_id: &str) -> Option<&mut MessageThread> {
        self.thread.as_mut().filter(|t| t.id() == conversation_id)
    }
}

/// State owned by one chat view plus the channel its renderer listens on.
/// Cloning shares the same state.
#[derive(Clone)]
pub struct ChatView {
    state: Arc<Mutex<ViewState>>,
    events: UnboundedSender<ChatEvent>,
}

impl ChatView {
    pub fn new() -> (Self, UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let view = Self {
            state: Arc::new(Mutex::new(ViewState::default())),
            events,
        };
        (view, rx)
    }

    pub async fn active_id(&self) -> Option<String> {
        self.state.lock().await.thread.as_ref().map(|t| t.id().to_string())
    }

    pub async fn active_conversation(&self) -> Option<Conversation> {
        self.state.lock().await.thread.as_ref().map(|t| t.conversation().clone())
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .await
            .thread
            .as_ref()
            .map(|t| t.messages().to_vec())
            .unwrap_or_default()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn status_filter(&self) -> Option<ConversationStatus> {
        self.state.lock().await.status_filter.clone()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().await
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        // renderer gone means the view is being torn down
        let _ = self.events.send(event);
    }
}
