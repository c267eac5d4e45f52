use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::mpsc::UnboundedReceiver;

use super::resolver::{ConversationResolver, Principal};
use super::send::{Draft, SendPipeline};
use super::sync::{ConversationRefresher, MessageSynchronizer, PollHandle};
use super::view::{ChatView, MessageThread};
use crate::api::ChatTransport;
use crate::api::events::ChatEvent;
use crate::api::models::{Conversation, ConversationStatus, Message};
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub message_interval: Duration,
    pub conversation_interval: Duration,
    pub message_limit: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_secs(3),
            conversation_interval: Duration::from_secs(5),
            message_limit: 50,
        }
    }
}

/// One chat view for one principal. Owns its poll loops; closing or
/// dropping the session stops them.
pub struct ChatSession {
    principal: Principal,
    transport: Arc<dyn ChatTransport>,
    view: ChatView,
    resolver: ConversationResolver,
    synchronizer: Arc<MessageSynchronizer>,
    refresher: Arc<ConversationRefresher>,
    sender: SendPipeline,
    settings: PollSettings,
    message_poll: Option<PollHandle>,
    conversation_poll: Option<PollHandle>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        principal: Principal,
        settings: PollSettings,
    ) -> (Self, UnboundedReceiver<ChatEvent>) {
        let (view, events) = ChatView::new();
        let session = Self {
            resolver: ConversationResolver::new(transport.clone()),
            synchronizer: Arc::new(MessageSynchronizer::new(
                transport.clone(),
                principal.role(),
                view.clone(),
                settings.message_limit,
            )),
            refresher: Arc::new(ConversationRefresher::new(transport.clone(), view.clone())),
            sender: SendPipeline::new(transport.clone(), principal.clone(), view.clone()),
            principal,
            transport,
            view,
            settings,
            message_poll: None,
            conversation_poll: None,
        };
        (session, events)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub fn is_polling(&self) -> bool {
        self.message_poll.is_some()
    }

    pub fn is_sending(&self) -> bool {
        self.sender.is_sending()
    }

    fn require_admin(&self) -> Result<(), ChatError> {
        match self.principal {
            Principal::Admin { .. } => Ok(()),
            Principal::User { .. } => Err(ChatError::WrongRole("admin")),
        }
    }

    /// Resolve the user's own conversation and start polling it.
    pub async fn open_own(&mut self) -> Result<Conversation, ChatError> {
        if !matches!(self.principal, Principal::User { .. }) {
            return Err(ChatError::WrongRole("user"));
        }
        let conversation = self.resolver.resolve(&self.principal, None).await?;
        self.activate(conversation.clone()).await;
        Ok(conversation)
    }

    /// Admin: make `conversation_id` the active thread. The previous poll
    /// loop is stopped before the new thread is installed.
    pub async fn select(&mut self, conversation_id: &str) -> Result<Conversation, ChatError> {
        self.require_admin()?;
        let known = self
            .view
            .conversations()
            .await
            .into_iter()
            .find(|c| c.id == conversation_id);
        let conversation = match known {
            Some(c) => c,
            None => self.resolver.resolve(&self.principal, Some(conversation_id)).await?,
        };
        self.activate(conversation.clone()).await;
        Ok(conversation)
    }

    async fn activate(&mut self, conversation: Conversation) {
        if let Some(previous) = self.message_poll.take() {
            previous.cancel();
        }
        self.view.lock().await.thread = Some(MessageThread::new(conversation.clone()));
        info!("opened conversation {}", conversation.id);
        self.view.emit(ChatEvent::ConversationOpened(conversation));
        self.message_poll = Some(self.synchronizer.clone().spawn(self.settings.message_interval));
    }

    /// Admin: keep the conversation listing refreshed in the background.
    pub fn start_conversation_refresh(&mut self) -> Result<(), ChatError> {
        self.require_admin()?;
        if self.conversation_poll.is_none() {
            self.conversation_poll = Some(self.refresher.clone().spawn(self.settings.conversation_interval));
        }
        Ok(())
    }

    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        self.require_admin()?;
        self.refresher.tick().await?;
        Ok(self.view.conversations().await)
    }

    /// Admin: narrow the listing to one status (`None` shows everything) and
    /// refresh it right away.
    pub async fn set_status_filter(&self, filter: Option<ConversationStatus>) -> Result<Vec<Conversation>, ChatError> {
        self.require_admin()?;
        self.view.lock().await.status_filter = filter;
        self.refresh_conversations().await
    }

    pub async fn update_status(&self, status: ConversationStatus) -> Result<Conversation, ChatError> {
        self.require_admin()?;
        let mut updated = self
            .view
            .active_conversation()
            .await
            .ok_or(ChatError::NoActiveConversation)?;
        self.transport.update_status(&updated.id, &status).await?;
        updated.status = status.clone();

        let mut state = self.view.lock().await;
        if let Some(listed) = state.conversations.iter_mut().find(|c| c.id == updated.id) {
            listed.status = status.clone();
            updated = listed.clone();
        }
        // the selection may have moved while the request was out
        if let Some(thread) = state.thread_for(&updated.id) {
            thread.set_status(status);
            updated = thread.conversation().clone();
        }
        drop(state);

        info!("{} is now {}", updated.id, updated.status.as_str());
        self.view.emit(ChatEvent::StatusUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn send(&self, draft: &mut Draft) -> Result<Message, ChatError> {
        self.sender.send(draft).await
    }

    /// Stop every poll loop. The rendered state stays readable.
    pub fn close(&mut self) {
        self.message_poll = None;
        self.conversation_poll = None;
    }
}
