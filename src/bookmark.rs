use serde::{Deserialize, Serialize};

/// Title used when a source gives none.
pub const PLACEHOLDER_TITLE: &str = "(No title)";

/// A flat, portable bookmark. Identity is the exact `url` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub title: String,
    pub url: String,
    /// Epoch milliseconds.
    #[serde(rename = "addedAt", alias = "dateAdded")]
    pub added_at: i64,
}

impl BookmarkRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>, added_at: i64) -> Self {
        Self {
            title: normalize_title(title.into()),
            url: url.into(),
            added_at,
        }
    }
}

/// Trim a title and fall back to the placeholder when nothing is left.
///
/// Line breaks are stored as `\n`; markup parsers rewrite `\r` and `\r\n`
/// that way, so records would otherwise change shape across an HTML export.
pub fn normalize_title(title: String) -> String {
    let title = if title.contains('\r') {
        title.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        title
    };
    let trimmed = title.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else if trimmed.len() == title.len() {
        title
    } else {
        trimmed.to_string()
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
