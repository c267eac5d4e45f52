//! Optimistic send: echo locally, post, then reconcile or roll back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::resolver::Principal;
use super::view::ChatView;
use crate::api::ChatTransport;
use crate::api::events::ChatEvent;
use crate::api::models::{ImageAttachment, Message, MessageType, OutgoingMessage};
use crate::error::ChatError;
use crate::utils;

/// What the composer currently holds. Only cleared after a confirmed send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl Draft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn is_sendable(&self) -> bool {
        !self.text.trim().is_empty() || self.image.is_some()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.image = None;
    }

    pub fn to_outgoing(&self, conversation_id: &str) -> Result<OutgoingMessage, ChatError> {
        if !self.is_sendable() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(OutgoingMessage {
            conversation_id: conversation_id.to_string(),
            content: self.text.clone(),
            message_type: if self.image.is_some() { MessageType::Image } else { MessageType::Text },
            image: self.image.clone(),
        })
    }
}

/// The local echo shown while `outgoing` is in flight.
pub fn pending_message(principal: &Principal, outgoing: &OutgoingMessage, now: DateTime<Utc>) -> Message {
    Message {
        id: utils::pending_id(),
        conversation_id: outgoing.conversation_id.clone(),
        sender_role: principal.role(),
        sender_name: principal.display_name().to_string(),
        content: Some(outgoing.content.clone()).filter(|c| !c.trim().is_empty()),
        message_type: outgoing.message_type,
        image_url: outgoing.image.as_ref().map(|i| i.preview.clone()),
        created_at: now,
        is_read: false,
        pending: true,
    }
}

/// Held for the duration of one send.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ChatError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::SendInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Removes the local echo if the send is abandoned before it settles.
struct PendingEcho {
    view: ChatView,
    conversation_id: String,
    pending_id: Option<String>,
}

impl PendingEcho {
    fn settle(&mut self) {
        self.pending_id = None;
    }
}

impl Drop for PendingEcho {
    fn drop(&mut self) {
        let Some(pending_id) = self.pending_id.take() else {
            return;
        };
        let view = self.view.clone();
        let conversation_id = std::mem::take(&mut self.conversation_id);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("{conversation_id}: send for {pending_id} abandoned outside the runtime");
            return;
        };
        runtime.spawn(async move {
            if let Some(thread) = view.lock().await.thread_for(&conversation_id) {
                thread.rollback(&pending_id);
            }
            debug!("{conversation_id}: send for {pending_id} abandoned");
            view.emit(ChatEvent::SendFailed {
                pending_id,
                error: "send cancelled".to_string(),
            });
        });
    }
}

pub struct SendPipeline {
    transport: Arc<dyn ChatTransport>,
    principal: Principal,
    view: ChatView,
    in_flight: AtomicBool,
}

impl SendPipeline {
    pub fn new(transport: Arc<dyn ChatTransport>, principal: Principal, view: ChatView) -> Self {
        Self {
            transport,
            principal,
            view,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send `draft` to the active conversation.
    ///
    /// A blank draft is rejected before any request is made. On success the
    /// pending echo is swapped for the server's message and the draft is
    /// cleared; on failure the echo is removed and the draft is left intact.
    pub async fn send(&self, draft: &mut Draft) -> Result<Message, ChatError> {
        if !draft.is_sendable() {
            return Err(ChatError::EmptyMessage);
        }
        let _guard = InFlight::acquire(&self.in_flight)?;

        let (outgoing, pending) = {
            let mut state = self.view.lock().await;
            let thread = state.thread.as_mut().ok_or(ChatError::NoActiveConversation)?;
            let outgoing = draft.to_outgoing(thread.id())?;
            let pending = pending_message(&self.principal, &outgoing, Utc::now());
            thread.push_pending(pending.clone());
            (outgoing, pending)
        };
        let pending_id = pending.id.clone();
        let mut echo = PendingEcho {
            view: self.view.clone(),
            conversation_id: outgoing.conversation_id.clone(),
            pending_id: Some(pending_id.clone()),
        };
        self.view.emit(ChatEvent::PendingAppended(pending));

        let result = self.transport.send_message(self.principal.role(), &outgoing).await;

        let mut state = self.view.lock().await;
        echo.settle();
        let thread = state.thread_for(&outgoing.conversation_id);
        match result {
            Ok(confirmed) => {
                if let Some(thread) = thread {
                    thread.confirm(&pending_id, confirmed.clone());
                }
                drop(state);
                info!("{}: {} confirmed as {}", outgoing.conversation_id, pending_id, confirmed.id);
                self.view.emit(ChatEvent::MessageConfirmed {
                    pending_id,
                    message: confirmed.clone(),
                });
                draft.clear();
                Ok(confirmed)
            }
            Err(err) => {
                if let Some(thread) = thread {
                    thread.rollback(&pending_id);
                }
                drop(state);
                warn!("{}: send failed: {err}", outgoing.conversation_id);
                self.view.emit(ChatEvent::SendFailed {
                    pending_id,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::api::models::SenderRole;
    use crate::chat::sync::{MessageSynchronizer, PollOutcome};
    use crate::chat::testing::{ScriptedTransport, conversation, message};
    use crate::chat::view::MessageThread;

    async fn setup(role: Principal) -> (Arc<ScriptedTransport>, ChatView, SendPipeline) {
        let transport = Arc::new(ScriptedTransport::new(conversation("conv_1")));
        let (view, _rx) = ChatView::new();
        view.lock().await.thread = Some(MessageThread::new(conversation("conv_1")));
        let pipeline = SendPipeline::new(transport.clone(), role, view.clone());
        (transport, view, pipeline)
    }

    #[tokio::test]
    async fn empty_draft_makes_no_request() {
        let (transport, view, pipeline) = setup(Principal::user("Lan")).await;
        for text in ["", "   \n\t"] {
            let mut draft = Draft::new(text);
            assert!(matches!(pipeline.send(&mut draft).await, Err(ChatError::EmptyMessage)));
        }
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 0);
        assert!(view.messages().await.is_empty());
        assert!(!pipeline.is_sending());
    }

    #[tokio::test]
    async fn hello_is_echoed_then_confirmed() {
        let (transport, view, pipeline) = setup(Principal::user("Lan")).await;
        let gate = transport.gate_sends();
        let mut draft = Draft::new("hello");

        let (sent, ()) = tokio::join!(pipeline.send(&mut draft), async {
            gate.started.notified().await;
            let echoed = view.messages().await;
            assert_eq!(echoed.len(), 1);
            assert!(echoed[0].pending);
            assert_eq!(echoed[0].content.as_deref(), Some("hello"));
            assert_eq!(echoed[0].sender_role, SenderRole::User);
            assert!(utils::is_pending_id(&echoed[0].id));
            gate.release.notify_one();
        });

        let sent = sent.unwrap();
        assert_eq!(sent.id, "srv-1");
        let after = view.messages().await;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, "srv-1");
        assert_eq!(after[0].content.as_deref(), Some("hello"));
        assert!(!after[0].pending);
        assert!(draft.text.is_empty());
    }

    #[tokio::test]
    async fn failed_send_restores_list_and_keeps_draft() {
        let (transport, view, pipeline) = setup(Principal::admin("Admin")).await;
        let earlier = message("msg_1", "conv_1", SenderRole::User, "where is my order?", 1);
        view.lock().await.thread.as_mut().unwrap().apply_poll(vec![earlier]);
        let before = view.messages().await;
        transport.fail_sends(true);

        let mut draft = Draft::new("checking now");
        let err = pipeline.send(&mut draft).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 403, .. }));
        assert_eq!(view.messages().await, before);
        assert_eq!(draft.text, "checking now");
        assert!(!pipeline.is_sending());
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_rejected() {
        let (transport, _view, pipeline) = setup(Principal::user("Lan")).await;
        let gate = transport.gate_sends();
        let mut first = Draft::new("one");
        let mut second = Draft::new("two");

        let (a, b) = tokio::join!(pipeline.send(&mut first), async {
            gate.started.notified().await;
            let rejected = pipeline.send(&mut second).await;
            gate.release.notify_one();
            rejected
        });
        assert!(a.is_ok());
        assert!(matches!(b, Err(ChatError::SendInFlight)));
        assert_eq!(second.text, "two");
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn image_send_uses_preview_then_hosted_url() {
        let (transport, view, pipeline) = setup(Principal::user("Lan")).await;
        let gate = transport.gate_sends();
        let image = ImageAttachment::from_bytes("receipt.png", "image/png", vec![1, 2, 3]);
        let mut draft = Draft::default().with_image(image);

        let (sent, ()) = tokio::join!(pipeline.send(&mut draft), async {
            gate.started.notified().await;
            let echoed = view.messages().await;
            assert_eq!(echoed[0].image_url.as_deref(), Some("local-preview:receipt.png"));
            assert_eq!(echoed[0].content, None);
            gate.release.notify_one();
        });

        let sent = sent.unwrap();
        assert_eq!(sent.message_type, MessageType::Image);
        let outgoing = transport.sent.lock().unwrap()[0].clone();
        assert_eq!(outgoing.message_type, MessageType::Image);
        assert_eq!(outgoing.image.map(|i| i.bytes), Some(vec![1, 2, 3]));
        assert!(draft.image.is_none());
    }

    #[tokio::test]
    async fn poll_during_send_does_not_duplicate() {
        let (transport, view, pipeline) = setup(Principal::user("Lan")).await;
        let first = message("msg_1", "conv_1", SenderRole::User, "hi", 1);
        transport.set_thread("conv_1", vec![first.clone()]);
        view.lock().await.thread.as_mut().unwrap().apply_poll(vec![first]);
        let sync = MessageSynchronizer::new(transport.clone(), SenderRole::User, view.clone(), 50);
        let gate = transport.gate_sends();
        let mut draft = Draft::new("hello");

        let (sent, ()) = tokio::join!(pipeline.send(&mut draft), async {
            gate.started.notified().await;
            // server already holds our message; an admin reply lands too
            transport.push_message(message("msg_2", "conv_1", SenderRole::Admin, "hello!", 31));
            assert_eq!(sync.tick().await.unwrap(), PollOutcome::Replaced(3));
            let during = view.messages().await;
            assert_eq!(during.iter().filter(|m| m.text() == Some("hello")).count(), 1);
            assert!(during.iter().all(|m| !m.pending));
            gate.release.notify_one();
        });

        let sent = sent.unwrap();
        let after = view.messages().await;
        assert_eq!(after.len(), 3);
        assert_eq!(after.iter().filter(|m| m.id == sent.id).count(), 1);
        assert!(after.iter().all(|m| !m.pending));
    }

    #[tokio::test]
    async fn result_for_previous_conversation_is_not_applied() {
        for fail in [false, true] {
            let (transport, view, pipeline) = setup(Principal::admin("Admin")).await;
            transport.fail_sends(fail);
            let gate = transport.gate_sends();
            let other = vec![message("msg_7", "conv_2", SenderRole::User, "different thread", 7)];
            let mut draft = Draft::new("reply for conv_1");

            let (result, ()) = tokio::join!(pipeline.send(&mut draft), async {
                gate.started.notified().await;
                let mut thread = MessageThread::new(conversation("conv_2"));
                thread.apply_poll(other.clone());
                view.lock().await.thread = Some(thread);
                gate.release.notify_one();
            });

            assert_eq!(result.is_err(), fail);
            assert_eq!(view.active_id().await.as_deref(), Some("conv_2"));
            assert_eq!(view.messages().await, other);
            if fail {
                assert_eq!(draft.text, "reply for conv_1");
            } else {
                assert!(draft.text.is_empty());
            }
            assert!(!pipeline.is_sending());
        }
    }

    #[tokio::test]
    async fn abandoned_send_removes_echo() {
        let (transport, view, pipeline) = setup(Principal::user("Lan")).await;
        let gate = transport.gate_sends();
        let mut draft = Draft::new("hello");

        {
            let send = pipeline.send(&mut draft);
            tokio::pin!(send);
            tokio::select! {
                _ = &mut send => panic!("send finished while gated"),
                () = gate.started.notified() => {}
            }
            assert_eq!(view.messages().await.len(), 1);
        }

        for _ in 0..10 {
            if view.messages().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(view.messages().await.is_empty());
        assert!(!pipeline.is_sending());
        assert_eq!(draft.text, "hello");
    }

    #[tokio::test]
    async fn send_without_conversation_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new(conversation("conv_1")));
        let (view, _rx) = ChatView::new();
        let pipeline = SendPipeline::new(transport.clone(), Principal::user("Lan"), view);
        let mut draft = Draft::new("hello");
        assert!(matches!(
            pipeline.send(&mut draft).await,
            Err(ChatError::NoActiveConversation)
        ));
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 0);
    }
}
