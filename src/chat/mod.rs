//! Polling chat view: conversation resolution, message synchronisation and
//! optimistic sends for one principal.

pub mod reconcile;
pub mod resolver;
pub mod send;
pub mod session;
pub mod sync;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use resolver::{ConversationResolver, Principal};
pub use send::{Draft, SendPipeline};
pub use session::{ChatSession, PollSettings};
pub use sync::{ConversationRefresher, MessageSynchronizer, PollHandle, PollOutcome};
pub use view::{ChatView, MessageThread};
