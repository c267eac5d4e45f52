use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

pub const PENDING_ID_PREFIX: &str = "temp_";

static PENDING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Synthetic id for a locally echoed message. Server ids look like `msg_<n>`,
/// so the prefix keeps the two spaces apart; the sequence keeps ids unique
/// within the same millisecond.
pub fn pending_id() -> String {
    let seq = PENDING_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}{}_{}", PENDING_ID_PREFIX, Utc::now().timestamp_millis(), seq)
}

pub fn is_pending_id(id: &str) -> bool {
    id.starts_with(PENDING_ID_PREFIX)
}

pub fn guess_image_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
