//! [`LiveFeedClient`] backed by the Twitch Helix API.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::{debug, warn};
use twitch_helix::{HelixClient, MAX_LOGINS_PER_REQUEST};

use super::rate_limiter::RateLimiter;
use super::record::{CanonicalIdentity, LiveRecord, parse_stream};
use super::LiveFeedClient;
use crate::domain::StreamerId;
use crate::{Error, Result};

pub struct HelixFeed {
    client: HelixClient,
    limiter: RateLimiter,
    call_timeout: Duration,
}

/// Pagination state for one `live_records_for` stream.
struct PageCursor {
    chunks: std::vec::IntoIter<Vec<String>>,
    current: Option<Vec<String>>,
    after: Option<String>,
    finished: bool,
}

impl HelixFeed {
    pub fn new(client: HelixClient, limiter: RateLimiter, call_timeout: Duration) -> Self {
        Self {
            client,
            limiter,
            call_timeout,
        }
    }

    pub fn client(&self) -> &HelixClient {
        &self.client
    }

    /// Rate-limit and time-bound a single Helix call.
    async fn call<T, F>(&self, what: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, twitch_helix::HelixError>>,
    {
        self.limiter.acquire().await;
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::feed(format!(
                "{what} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Fetch one page and normalize it, dropping malformed records.
    async fn fetch_page(
        &self,
        logins: &[String],
        after: Option<&str>,
    ) -> Result<(Vec<LiveRecord>, Option<String>)> {
        let page = self
            .call("streams request", self.client.get_streams_page(logins, after))
            .await?;
        let next = page.next_cursor().map(str::to_string);

        let mut records = Vec::with_capacity(page.data.len());
        for raw in page.data {
            match parse_stream(raw) {
                Ok(record) => records.push(record),
                Err(reason) => warn!(reason = %reason, "Dropping malformed stream record"),
            }
        }
        Ok((records, next))
    }
}

#[async_trait]
impl LiveFeedClient for HelixFeed {
    async fn handshake(&self) -> Result<()> {
        self.call("authentication", self.client.authenticate()).await
    }

    async fn resolve(&self, id: &StreamerId) -> Result<Option<CanonicalIdentity>> {
        let logins = [id.to_string()];
        let users = self.call("users request", self.client.get_users(&logins)).await?;

        Ok(users
            .into_iter()
            .find(|user| user.login.eq_ignore_ascii_case(id.as_str()))
            .map(|user| CanonicalIdentity {
                id: StreamerId::normalized(&user.login),
                user_id: user.id,
                display_name: user.display_name,
            }))
    }

    fn live_records_for<'a>(
        &'a self,
        ids: &'a [StreamerId],
    ) -> BoxStream<'a, Result<Vec<LiveRecord>>> {
        let chunks: Vec<Vec<String>> = ids
            .chunks(MAX_LOGINS_PER_REQUEST)
            .map(|chunk| chunk.iter().map(|id| id.to_string()).collect())
            .collect();

        let cursor = PageCursor {
            chunks: chunks.into_iter(),
            current: None,
            after: None,
            finished: false,
        };

        stream::unfold(cursor, move |mut cursor| async move {
            if cursor.finished {
                return None;
            }
            if cursor.current.is_none() {
                cursor.current = Some(cursor.chunks.next()?);
                cursor.after = None;
            }

            let logins = cursor.current.as_deref()?;
            let result = self.fetch_page(logins, cursor.after.as_deref()).await;

            match result {
                Ok((records, next)) => {
                    match next {
                        // A cursor that does not advance would loop forever.
                        Some(next) if cursor.after.as_deref() != Some(next.as_str()) => {
                            debug!(cursor = %next, "Following Helix pagination cursor");
                            cursor.after = Some(next);
                        }
                        _ => cursor.current = None,
                    }
                    Some((Ok(records), cursor))
                }
                Err(e) => {
                    cursor.finished = true;
                    Some((Err(e), cursor))
                }
            }
        })
        .boxed()
    }
}
