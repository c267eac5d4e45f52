use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::api::models::{Message, SenderRole};

pub fn format_time<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

/// One line per message; our own side is marked with `>`.
pub fn render_message<Tz: TimeZone>(message: &Message, me: SenderRole, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let side = if message.sender_role == me { '>' } else { ' ' };
    let mut line = format!("{side} [{}] {}:", format_time(message.created_at, tz), message.sender_name);
    if let Some(image) = &message.image_url {
        line.push_str(&format!(" [image {image}]"));
    }
    if let Some(text) = message.text() {
        line.push(' ');
        line.push_str(text);
    }
    if message.pending {
        line.push_str(" (sending...)");
    }
    line
}

pub fn render_thread<Tz: TimeZone>(messages: &[Message], me: SenderRole, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    if messages.is_empty() {
        return "No messages yet. Say hello to start the conversation.".to_string();
    }
    messages
        .iter()
        .map(|m| render_message(m, me, tz))
        .collect::<Vec<_>>()
        .join("\n")
}
