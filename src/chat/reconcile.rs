//! Pure merge rules between the rendered thread and what the server says.
//!
//! Nothing here touches the network or the view lock, so every rule can be
//! checked on plain vectors.

use std::collections::HashSet;

use crate::api::models::Message;

/// Merge a freshly polled page into the rendered list.
///
/// Returns `None` when the rendered list should stay as it is: the server
/// page is not longer than what is on screen. Otherwise returns the server
/// page in timestamp order followed by the local messages still waiting for
/// confirmation. An echo whose confirmed copy is already in the page is
/// dropped, so the page alone stands for it.
///
/// Length is the only change signal. The feed is append-only, so an edit or
/// deletion on the server is not detected. The server only returns the newest
/// `limit` messages, so the caller must ask for more than it renders or a
/// full thread never grows (see `MessageSynchronizer::tick`).
pub fn merge_poll(local: &[Message], remote: Vec<Message>) -> Option<Vec<Message>> {
    if remote.len() <= local.len() {
        return None;
    }
    let mut merged = remote;
    merged.sort_by_key(|m| m.created_at);

    let known: HashSet<&str> = local.iter().filter(|m| !m.pending).map(|m| m.id.as_str()).collect();
    let mut arrived: Vec<&Message> = merged.iter().filter(|m| !known.contains(m.id.as_str())).collect();
    let mut waiting = Vec::new();
    for echo in local.iter().filter(|m| m.pending) {
        match arrived.iter().position(|m| covers(m, echo)) {
            Some(i) => {
                arrived.remove(i);
            }
            None => waiting.push(echo.clone()),
        }
    }
    merged.extend(waiting);
    Some(merged)
}

/// Whether the server message `remote` is the confirmed copy of `echo`.
fn covers(remote: &Message, echo: &Message) -> bool {
    remote.sender_role == echo.sender_role
        && remote.message_type == echo.message_type
        && remote.text() == echo.text()
        && remote.image_url.is_some() == echo.image_url.is_some()
}

/// Swap the pending message `pending_id` for its confirmed counterpart,
/// keeping its position.
///
/// If a poll already delivered the confirmed message, the pending entry is
/// dropped instead so the message is never shown twice.
pub fn reconcile(local: &[Message], confirmed: Message, pending_id: &str) -> Vec<Message> {
    let mut confirmed = confirmed;
    confirmed.pending = false;

    let already_present = local.iter().any(|m| !m.pending && m.id == confirmed.id);
    let mut replacement = if already_present { None } else { Some(confirmed) };

    let mut merged = Vec::with_capacity(local.len() + 1);
    for message in local {
        if message.id == pending_id {
            if let Some(confirmed) = replacement.take() {
                merged.push(confirmed);
            }
        } else {
            merged.push(message.clone());
        }
    }
    // pending entry vanished (e.g. thread reloaded); still show the message
    if let Some(confirmed) = replacement {
        merged.push(confirmed);
    }
    merged
}

/// Drop the pending message `pending_id`, leaving everything else in place.
pub fn rollback(local: &[Message], pending_id: &str) -> Vec<Message> {
    local
        .iter()
        .filter(|m| !(m.pending && m.id == pending_id))
        .cloned()
        .collect()
}
