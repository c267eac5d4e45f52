//! Support-chat client for the storefront: keeps a polled, optimistically
//! updated view of a customer's conversation with the shop's admins.

pub mod api;
pub mod app;
pub mod chat;
pub mod error;
pub mod ui;
pub mod utils;

pub use api::ChatTransport;
pub use api::client::ApiClient;
pub use api::events::ChatEvent;
pub use chat::{ChatSession, Draft, Principal};
pub use error::ChatError;
