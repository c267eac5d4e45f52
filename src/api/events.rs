use crate::api::models::{Conversation, Message};

/// Notifications from the chat view to whatever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A conversation became the active one; its thread starts empty.
    ConversationOpened(Conversation),
    /// A poll delivered a longer thread and replaced the rendered one.
    MessagesReplaced { messages: Vec<Message>, scroll_to_latest: bool },
    /// Optimistic echo of a message being sent.
    PendingAppended(Message),
    /// The server confirmed the pending message `pending_id`.
    MessageConfirmed { pending_id: String, message: Message },
    /// The send failed and the pending message was removed.
    SendFailed { pending_id: String, error: String },
    /// A poll tick failed; the view keeps its last known state.
    PollFailed { error: String },
    ConversationsRefreshed(Vec<Conversation>),
    StatusUpdated(Conversation),
}
