use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::api::models::Conversation;
use crate::chat::resolver::{filter_conversations, unread_total};

pub fn relative_time<Tz: TimeZone>(at: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let elapsed = now.signed_duration_since(at);
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        format!("{} min ago", elapsed.num_minutes())
    } else if elapsed.num_hours() < 24 {
        at.with_timezone(tz).format("%H:%M").to_string()
    } else {
        at.with_timezone(tz).format("%d/%m/%Y").to_string()
    }
}

pub struct Sidebar {
    query: String,
}

impl Sidebar {
    pub fn new() -> Self {
        Self { query: String::new() }
    }

    pub fn set_query(&mut self, query: Option<String>) {
        self.query = query.unwrap_or_default();
    }

    pub fn render<Tz: TimeZone>(
        &self,
        items: &[Conversation],
        active: Option<&str>,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> String
    where
        Tz::Offset: Display,
    {
        let shown = filter_conversations(items, &self.query);
        let mut out = format!("Conversations: {} total, {} unread", items.len(), unread_total(items));
        if shown.is_empty() {
            out.push_str("\n  (no conversations)");
            return out;
        }
        for conv in shown {
            let marker = if active == Some(conv.id.as_str()) { '*' } else { ' ' };
            out.push_str(&format!(
                "\n{marker} {}  {} <{}>  [{}]",
                conv.id,
                conv.user_name,
                conv.user_email,
                conv.status.as_str()
            ));
            if conv.unread_count_admin > 0 {
                out.push_str(&format!("  ({} unread)", conv.unread_count_admin));
            }
            if let Some(last) = &conv.last_message {
                out.push_str(&format!("  \"{last}\""));
            }
            if let Some(at) = conv.last_message_at {
                out.push_str(&format!("  {}", relative_time(at, now, tz)));
            }
        }
        out
    }
}

impl Default for Sidebar {
    fn default() -> Self {
        Self::new()
    }
}
