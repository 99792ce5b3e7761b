//! Request and response bodies.

use serde::{Deserialize, Serialize};

use crate::scheduler::CycleReport;

#[derive(Debug, Clone, Deserialize)]
pub struct AddStreamerRequest {
    /// Login or channel URL.
    pub login: String,
}

/// A watched streamer and its current presence.
#[derive(Debug, Clone, Serialize)]
pub struct StreamerEntry {
    pub login: String,
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamerListResponse {
    pub streamers: Vec<StreamerEntry>,
    /// Reply text as the chat command would show it.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddStreamerResponse {
    pub login: String,
    pub user_id: String,
    pub display_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveStreamerResponse {
    pub login: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilterBody {
    pub filter: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the platform handshake or the last
    /// cycle failed.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub watched: usize,
    pub live: usize,
    pub cycles_run: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}
