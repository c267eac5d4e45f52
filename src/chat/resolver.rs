use std::sync::Arc;

use log::info;

use crate::api::ChatTransport;
use crate::api::models::{Conversation, ConversationStatus, SenderRole};
use crate::error::ChatError;

/// Who is driving the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User { name: String },
    Admin { name: String },
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self::User { name: name.into() }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self::Admin { name: name.into() }
    }

    pub const fn role(&self) -> SenderRole {
        match self {
            Self::User { .. } => SenderRole::User,
            Self::Admin { .. } => SenderRole::Admin,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::User { name } | Self::Admin { name } => name,
        }
    }
}

pub struct ConversationResolver {
    transport: Arc<dyn ChatTransport>,
}

impl ConversationResolver {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// A user always gets their own conversation (created server-side on
    /// first access). An admin gets the conversation named by `selection`
    /// out of the full listing.
    pub async fn resolve(&self, principal: &Principal, selection: Option<&str>) -> Result<Conversation, ChatError> {
        match principal {
            Principal::User { .. } => {
                let conversation = self.transport.my_conversation().await?;
                info!("resolved own conversation {}", conversation.id);
                Ok(conversation)
            }
            Principal::Admin { .. } => {
                let wanted = selection.ok_or(ChatError::NoActiveConversation)?;
                let listing = self.list(None).await?;
                listing
                    .into_iter()
                    .find(|c| c.id == wanted)
                    .ok_or_else(|| ChatError::UnknownConversation(wanted.to_string()))
            }
        }
    }

    pub async fn list(&self, status: Option<&ConversationStatus>) -> Result<Vec<Conversation>, ChatError> {
        self.transport.conversations(status).await
    }
}

/// Case-insensitive match on the customer's name or email.
pub fn filter_conversations<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    let needle = query.trim().to_lowercase();
    conversations
        .iter()
        .filter(|c| {
            needle.is_empty()
                || c.user_name.to_lowercase().contains(&needle)
                || c.user_email.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn unread_total(conversations: &[Conversation]) -> u32 {
    conversations.iter().map(|c| c.unread_count_admin).sum()
}
