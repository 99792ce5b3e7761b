//! Access to the streaming platform.

mod helix;
mod rate_limiter;
mod record;

pub use helix::HelixFeed;
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use record::{CanonicalIdentity, LiveRecord, parse_stream};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;
use crate::domain::StreamerId;

/// What the watcher needs from a streaming platform.
///
/// Transport failures (timeouts, rate limits, rejected credentials) surface
/// as [`crate::Error::FeedUnavailable`]. An unknown login is not an error.
#[async_trait]
pub trait LiveFeedClient: Send + Sync {
    /// Establish credentials with the platform.
    async fn handshake(&self) -> Result<()>;

    /// Look up a login, returning `None` when the platform does not know it.
    async fn resolve(&self, id: &StreamerId) -> Result<Option<CanonicalIdentity>>;

    /// Lazily fetch the live records for `ids`, one page per item.
    ///
    /// The stream is finite. After yielding an error it ends; pages yielded
    /// before the error remain valid.
    fn live_records_for<'a>(&'a self, ids: &'a [StreamerId])
    -> BoxStream<'a, Result<Vec<LiveRecord>>>;
}
