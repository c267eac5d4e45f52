//! Periodic fetch-and-merge of the active thread and the admin listing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::view::ChatView;
use crate::api::ChatTransport;
use crate::api::events::ChatEvent;
use crate::api::models::{MessagePage, SenderRole};
use crate::error::ChatError;

/// What one poll tick did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No conversation is active.
    Idle,
    /// The server page was not longer than the rendered thread.
    Unchanged,
    /// The thread was replaced; carries the new rendered length.
    Replaced(usize),
    /// The active conversation changed while the request was in flight.
    Stale,
}

/// A running poll loop. Dropping the handle stops it.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Run `tick` now and then every `period` until cancelled.
    pub fn every<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MessageSynchronizer {
    transport: Arc<dyn ChatTransport>,
    role: SenderRole,
    view: ChatView,
    limit: u32,
}

impl MessageSynchronizer {
    pub fn new(transport: Arc<dyn ChatTransport>, role: SenderRole, view: ChatView, limit: u32) -> Self {
        Self {
            transport,
            role,
            view,
            limit,
        }
    }

    /// One poll tick against whichever conversation is active when it starts.
    ///
    /// Once the thread holds `limit` messages the page asks for one more than
    /// is rendered, so a new reply still makes it longer.
    pub async fn tick(&self) -> Result<PollOutcome, ChatError> {
        let (conversation_id, rendered) = {
            let state = self.view.lock().await;
            match state.thread.as_ref() {
                Some(thread) => (thread.id().to_string(), thread.len()),
                None => return Ok(PollOutcome::Idle),
            }
        };
        let page = MessagePage {
            limit: self.limit.max(u32::try_from(rendered).unwrap_or(u32::MAX).saturating_add(1)),
            before: None,
        };

        let fetched = self.transport.messages(self.role, &conversation_id, &page).await?;

        let mut state = self.view.lock().await;
        let Some(thread) = state.thread_for(&conversation_id) else {
            debug!("dropping poll result for {conversation_id}: selection moved");
            return Ok(PollOutcome::Stale);
        };
        if !thread.apply_poll(fetched) {
            return Ok(PollOutcome::Unchanged);
        }
        let messages = thread.messages().to_vec();
        drop(state);

        debug!("{conversation_id}: thread grew to {}", messages.len());
        let len = messages.len();
        self.view.emit(ChatEvent::MessagesReplaced {
            messages,
            scroll_to_latest: true,
        });
        Ok(PollOutcome::Replaced(len))
    }

    async fn tick_logged(&self) {
        if let Err(err) = self.tick().await {
            warn!("message poll failed: {err}");
            self.view.emit(ChatEvent::PollFailed { error: err.to_string() });
        }
    }

    pub fn spawn(self: Arc<Self>, period: Duration) -> PollHandle {
        PollHandle::every(period, move || {
            let this = Arc::clone(&self);
            async move { this.tick_logged().await }
        })
    }
}

/// Keeps the admin conversation listing fresh.
pub struct ConversationRefresher {
    transport: Arc<dyn ChatTransport>,
    view: ChatView,
}

impl ConversationRefresher {
    pub fn new(transport: Arc<dyn ChatTransport>, view: ChatView) -> Self {
        Self { transport, view }
    }

    /// Fetch the listing under the current status filter. Returns `None` if
    /// the filter changed before the response arrived.
    pub async fn tick(&self) -> Result<Option<usize>, ChatError> {
        let filter = self.view.status_filter().await;
        let listing = self.transport.conversations(filter.as_ref()).await?;

        let mut state = self.view.lock().await;
        if state.status_filter != filter {
            return Ok(None);
        }
        // keep the open thread's header in step with the listing
        if let Some(thread) = state.thread.as_mut() {
            if let Some(fresh) = listing.iter().find(|c| c.id == thread.id()) {
                thread.set_status(fresh.status.clone());
            }
        }
        state.conversations = listing.clone();
        drop(state);

        let len = listing.len();
        self.view.emit(ChatEvent::ConversationsRefreshed(listing));
        Ok(Some(len))
    }

    async fn tick_logged(&self) {
        if let Err(err) = self.tick().await {
            warn!("conversation refresh failed: {err}");
            self.view.emit(ChatEvent::PollFailed { error: err.to_string() });
        }
    }

    pub fn spawn(self: Arc<Self>, period: Duration) -> PollHandle {
        PollHandle::every(period, move || {
            let this = Arc::clone(&self);
            async move { this.tick_logged().await }
        })
    }
}
