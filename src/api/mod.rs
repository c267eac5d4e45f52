//! REST surface of the storefront chat backend.

pub mod client;
pub mod events;
pub mod models;

use async_trait::async_trait;

use crate::error::ChatError;
use models::{Conversation, ConversationStatus, Message, MessagePage, OutgoingMessage, SenderRole};

/// Request/response calls the chat view depends on. `ApiClient` is the real
/// implementation; tests script their own.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Get-or-create the caller's own conversation.
    async fn my_conversation(&self) -> Result<Conversation, ChatError>;

    /// Ordered (oldest first) page of a conversation, through the endpoint
    /// that matches `role`.
    async fn messages(&self, role: SenderRole, conversation_id: &str, page: &MessagePage) -> Result<Vec<Message>, ChatError>;

    async fn send_message(&self, role: SenderRole, outgoing: &OutgoingMessage) -> Result<Message, ChatError>;

    /// Admin listing, most recently active first.
    async fn conversations(&self, status: Option<&ConversationStatus>) -> Result<Vec<Conversation>, ChatError>;

    async fn update_status(&self, conversation_id: &str, status: &ConversationStatus) -> Result<(), ChatError>;
}
