//! Terminal front end for the chat view.

pub mod chat_view;
pub mod login;
pub mod main_window;
pub mod sidebar;
