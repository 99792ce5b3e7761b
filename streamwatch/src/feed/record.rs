//! Live records and the parse step that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StreamerId;

const DEFAULT_TITLE: &str = "Stream";
const DEFAULT_CATEGORY: &str = "Unknown";

/// A streamer observed live in the current poll. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveRecord {
    pub id: StreamerId,
    pub display_name: String,
    pub title: String,
    pub category: String,
    pub viewer_count: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl LiveRecord {
    /// Minimal record with default title and category.
    pub fn new(id: StreamerId) -> Self {
        Self {
            display_name: id.to_string(),
            id,
            title: DEFAULT_TITLE.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            viewer_count: None,
            started_at: None,
        }
    }
}

/// A login as the platform knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalIdentity {
    pub id: StreamerId,
    /// Platform user id.
    pub user_id: String,
    pub display_name: String,
}

/// Helix has reported viewer counts both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ViewerCount {
    Number(u64),
    Text(String),
    Other(serde_json::Value),
}

impl ViewerCount {
    fn value(self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Other(_) => None,
        }
    }
}

/// Loosely-typed stream object as returned by `GET /helix/streams`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStream {
    user_login: Option<String>,
    user_name: Option<String>,
    title: Option<String>,
    game_name: Option<String>,
    viewer_count: Option<ViewerCount>,
    started_at: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize one raw stream object into a [`LiveRecord`].
///
/// Fails only when no login can be recovered; every other field has a
/// fallback.
pub fn parse_stream(value: serde_json::Value) -> Result<LiveRecord, String> {
    let raw: RawStream = serde_json::from_value(value).map_err(|e| e.to_string())?;

    let user_name = non_blank(raw.user_name);
    let login = non_blank(raw.user_login)
        .or_else(|| user_name.clone())
        .ok_or_else(|| "stream has neither user_login nor user_name".to_string())?;
    let id = StreamerId::normalized(&login);

    Ok(LiveRecord {
        display_name: user_name.unwrap_or_else(|| login.clone()),
        id,
        title: non_blank(raw.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        category: non_blank(raw.game_name).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        viewer_count: raw.viewer_count.and_then(ViewerCount::value),
        started_at: raw
            .started_at
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    })
}
