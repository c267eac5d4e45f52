//! In-memory backend used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use crate::api::ChatTransport;
use crate::api::models::{
    Conversation, ConversationStatus, Message, MessagePage, MessageType, OutgoingMessage, SenderRole,
};
use crate::error::ChatError;

pub fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(i64::from(minute))
}

pub fn message(id: &str, conversation_id: &str, role: SenderRole, content: &str, minute: u32) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_role: role,
        sender_name: match role {
            SenderRole::User => "Lan".to_string(),
            SenderRole::Admin => "Admin".to_string(),
        },
        content: Some(content.to_string()),
        message_type: MessageType::Text,
        image_url: None,
        created_at: at_minute(minute),
        is_read: false,
        pending: false,
    }
}

pub fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        user_name: format!("customer {id}"),
        user_email: format!("{id}@example.com"),
        admin_id: None,
        status: ConversationStatus::Open,
        last_message: None,
        last_message_at: None,
        created_at: Some(at_minute(0)),
        unread_count_user: 0,
        unread_count_admin: 0,
    }
}

/// Two-step rendezvous: the transport signals `started`, then parks until
/// the test signals `release`.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}

pub struct ScriptedTransport {
    own: Conversation,
    conversations: Mutex<Vec<Conversation>>,
    threads: Mutex<HashMap<String, Vec<Message>>>,
    read_gates: Mutex<HashMap<String, Arc<Gate>>>,
    send_gate: Mutex<Option<Arc<Gate>>>,
    list_gate: Mutex<Option<Arc<Gate>>>,
    status_gate: Mutex<Option<Arc<Gate>>>,
    fail_reads: AtomicBool,
    fail_sends: AtomicBool,
    next_id: AtomicUsize,
    pub message_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub last_status_filter: Mutex<Option<ConversationStatus>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl ScriptedTransport {
    pub fn new(own: Conversation) -> Self {
        Self {
            conversations: Mutex::new(vec![own.clone()]),
            own,
            threads: Mutex::new(HashMap::new()),
            read_gates: Mutex::new(HashMap::new()),
            send_gate: Mutex::new(None),
            list_gate: Mutex::new(None),
            status_gate: Mutex::new(None),
            fail_reads: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
            message_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            last_status_filter: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.conversations.lock().unwrap().push(conversation);
    }

    pub fn set_thread(&self, conversation_id: &str, messages: Vec<Message>) {
        self.threads.lock().unwrap().insert(conversation_id.to_string(), messages);
    }

    pub fn push_message(&self, message: Message) {
        self.threads
            .lock()
            .unwrap()
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn gate_reads(&self, conversation_id: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.read_gates
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), gate.clone());
        gate
    }

    pub fn gate_sends(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn gate_listing(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn gate_status_updates(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.status_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn unavailable() -> ChatError {
        ChatError::Status {
            status: 503,
            detail: Some("backend down".into()),
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn my_conversation(&self) -> Result<Conversation, ChatError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.own.clone())
    }

    async fn messages(&self, _role: SenderRole, conversation_id: &str, page: &MessagePage) -> Result<Vec<Message>, ChatError> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.read_gates.lock().unwrap().get(conversation_id).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let thread = self
            .threads
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        let skip = thread.len().saturating_sub(page.limit as usize);
        Ok(thread.into_iter().skip(skip).collect())
    }

    async fn send_message(&self, role: SenderRole, outgoing: &OutgoingMessage) -> Result<Message, ChatError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(outgoing.clone());
        let fail = self.fail_sends.load(Ordering::SeqCst);
        let confirmed = (!fail).then(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut m = message(&format!("srv-{n}"), &outgoing.conversation_id, role, &outgoing.content, 30);
            m.message_type = outgoing.message_type;
            m.image_url = outgoing
                .image
                .as_ref()
                .map(|i| format!("http://localhost:8000/uploads/chat/{}", i.file_name));
            m
        });
        if let Some(m) = &confirmed {
            self.push_message(m.clone());
        }
        let gate = self.send_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        confirmed.ok_or(ChatError::Status {
            status: 403,
            detail: Some("Access denied".into()),
        })
    }

    async fn conversations(&self, status: Option<&ConversationStatus>) -> Result<Vec<Conversation>, ChatError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_status_filter.lock().unwrap() = status.cloned();
        let gate = self.list_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let all = self.conversations.lock().unwrap().clone();
        Ok(all
            .into_iter()
            .filter(|c| status.is_none_or(|s| &c.status == s))
            .collect())
    }

    async fn update_status(&self, conversation_id: &str, status: &ConversationStatus) -> Result<(), ChatError> {
        let gate = self.status_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let mut all = self.conversations.lock().unwrap();
        let conv = all
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;
        conv.status = status.clone();
        Ok(())
    }
}
