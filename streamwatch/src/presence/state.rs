use serde::Serialize;

use crate::domain::StreamerId;
use crate::feed::LiveRecord;
use crate::notification::MessageHandle;

/// What the watcher believes about one streamer as of the last committed cycle.
///
/// `notification` is set only while `is_live` and the message has not been
/// found deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceState {
    pub id: StreamerId,
    pub is_live: bool,
    pub notification: Option<MessageHandle>,
    /// The record last rendered into `notification`.
    pub rendered: Option<LiveRecord>,
    /// A live message whose deletion failed when the stream ended.
    pub pending_delete: Option<MessageHandle>,
    /// The "ended" announcement failed and is resent while offline.
    pub pending_announce: bool,
}

impl PresenceState {
    /// Offline with no message.
    pub fn new(id: StreamerId) -> Self {
        Self {
            id,
            is_live: false,
            notification: None,
            rendered: None,
            pending_delete: None,
            pending_announce: false,
        }
    }

    pub fn live(id: StreamerId, handle: MessageHandle, record: LiveRecord) -> Self {
        Self {
            id,
            is_live: true,
            notification: Some(handle),
            rendered: Some(record),
            pending_delete: None,
            pending_announce: false,
        }
    }
}
