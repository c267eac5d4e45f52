//! Error types shared by the transport and the chat view.

use thiserror::Error;

/// Errors surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status}{}", format_detail(.detail))]
    Status { status: u16, detail: Option<String> },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Text is blank and no image is attached.
    #[error("message needs text or an image")]
    EmptyMessage,

    /// Another send from this session has not completed yet.
    #[error("a message is already being sent")]
    SendInFlight,

    #[error("no conversation is selected")]
    NoActiveConversation,

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    /// The operation is reserved for the other side of the chat.
    #[error("operation requires the {0} role")]
    WrongRole(&'static str),
}

fn format_detail(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Coarse classification used by the view to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient; the next poll tick retries on its own.
    Transport,
    /// Rejected locally before anything reached the network.
    Validation,
    /// The server refused the request.
    Rejected,
}

impl ChatError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Io(_) => ErrorCategory::Transport,
            Self::Status { status, .. } if *status >= 500 || *status == 429 => {
                ErrorCategory::Transport
            }
            Self::Status { .. } | Self::Json(_) | Self::UnknownConversation(_) => {
                ErrorCategory::Rejected
            }
            Self::InvalidUrl(_)
            | Self::Config(_)
            | Self::EmptyMessage
            | Self::SendInFlight
            | Self::NoActiveConversation
            | Self::WrongRole(_) => ErrorCategory::Validation,
        }
    }

    /// Whether waiting for the next tick can fix this.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transport)
    }
}
