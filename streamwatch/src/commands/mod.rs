//! User-facing watch list commands.
//!
//! Thin wrappers over [`WatchListStore`] that normalize input the same way
//! the poller does and keep the presence tracker consistent with the list.

use std::sync::Arc;

use tracing::info;

use crate::domain::StreamerId;
use crate::feed::{CanonicalIdentity, LiveFeedClient};
use crate::presence::PresenceTracker;
use crate::watchlist::{AddOutcome, RemoveOutcome, WatchListStore};
use crate::{Error, Result};

/// Result of `watch_add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddReply {
    Added(CanonicalIdentity),
    AlreadyPresent(StreamerId),
}

impl AddReply {
    /// Reply text for the invoking user.
    pub fn message(&self) -> String {
        match self {
            Self::Added(identity) => format!("✅ `{}` added to monitoring.", identity.id),
            Self::AlreadyPresent(id) => format!("⚠️ `{id}` is already in the list."),
        }
    }
}

/// Result of `watch_remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReply {
    pub id: StreamerId,
    pub outcome: RemoveOutcome,
}

impl RemoveReply {
    pub fn message(&self) -> String {
        match self.outcome {
            RemoveOutcome::Removed => format!("🗑️ `{}` removed.", self.id),
            RemoveOutcome::NotFound => format!("⚠️ `{}` is not in the list.", self.id),
        }
    }
}

/// Reply text for an error raised by a command.
pub fn error_message(err: &Error) -> String {
    match err {
        Error::NotFound { id, .. } => format!("❌ Streamer `{id}` not found."),
        Error::FeedUnavailable(reason) => format!("Error while checking Twitch: {reason}"),
        Error::Validation(reason) => format!("❌ {reason}"),
        other => format!("Error: {other}"),
    }
}

/// Reply text for `watch_list`.
pub fn list_message(ids: &[StreamerId]) -> String {
    if ids.is_empty() {
        return "📭 The list is empty.".to_string();
    }
    let lines: Vec<String> = ids.iter().map(|id| format!("• {id}")).collect();
    format!("📜 **Watched streamers:**\n{}", lines.join("\n"))
}

pub struct WatchCommands {
    store: Arc<WatchListStore>,
    feed: Arc<dyn LiveFeedClient>,
    tracker: Arc<PresenceTracker>,
}

impl WatchCommands {
    pub fn new(
        store: Arc<WatchListStore>,
        feed: Arc<dyn LiveFeedClient>,
        tracker: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            store,
            feed,
            tracker,
        }
    }

    /// Add a streamer by login or channel URL.
    ///
    /// The login is checked against the platform first; unknown logins fail
    /// with [`Error::NotFound`].
    pub async fn watch_add(&self, input: &str) -> Result<AddReply> {
        let id = StreamerId::parse(input)?;
        if self.store.contains(&id) {
            return Ok(AddReply::AlreadyPresent(id));
        }

        let identity = self
            .feed
            .resolve(&id)
            .await?
            .ok_or_else(|| Error::not_found("streamer", id.as_str()))?;

        // Forget before the id becomes visible: a cycle that sees it must
        // start after the tombstone and keep its outcome.
        if !self.store.contains(&identity.id) {
            self.tracker.forget(&identity.id);
        }

        match self.store.add(&identity.id).await? {
            AddOutcome::Added => {
                info!(streamer = %identity.id, user_id = %identity.user_id, "Streamer watched");
                Ok(AddReply::Added(identity))
            }
            AddOutcome::AlreadyPresent => Ok(AddReply::AlreadyPresent(identity.id)),
        }
    }

    /// Stop watching a streamer. Its live message, if any, is left in place.
    pub async fn watch_remove(&self, input: &str) -> Result<RemoveReply> {
        // Entries loaded from an older file may not pass validation; they
        // must still be removable.
        let id = match StreamerId::parse(input) {
            Ok(id) => id,
            Err(_) if !input.trim().is_empty() => StreamerId::normalized(input),
            Err(e) => return Err(e),
        };

        let outcome = self.store.remove(&id).await?;
        if outcome == RemoveOutcome::Removed {
            self.tracker.forget(&id);
            info!(streamer = %id, "Streamer unwatched");
        }
        Ok(RemoveReply { id, outcome })
    }

    pub fn watch_list(&self) -> Vec<StreamerId> {
        self.store.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_message() {
        assert_eq!(list_message(&[]), "📭 The list is empty.");
        let ids = vec![StreamerId::normalized("alice"), StreamerId::normalized("bob")];
        assert_eq!(
            list_message(&ids),
            "📜 **Watched streamers:**\n• alice\n• bob"
        );
    }

    #[test]
    fn test_reply_messages() {
        let reply = RemoveReply {
            id: StreamerId::normalized("alice"),
            outcome: RemoveOutcome::NotFound,
        };
        assert_eq!(reply.message(), "⚠️ `alice` is not in the list.");

        let err = Error::not_found("streamer", "ghost");
        assert_eq!(error_message(&err), "❌ Streamer `ghost` not found.");
    }
}
