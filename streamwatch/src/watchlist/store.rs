//! File-backed set of watched streamers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{RetryPolicy, StreamerId};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// The watch set: the single source of truth for what gets polled.
///
/// Every mutation is written through to disk before it becomes visible. If
/// the write keeps failing the in-memory set is left untouched and the error
/// is returned to the caller.
pub struct WatchListStore {
    path: PathBuf,
    entries: RwLock<Vec<StreamerId>>,
    /// Serializes mutations so concurrent commands cannot interleave writes.
    write_lock: Mutex<()>,
    retry: RetryPolicy,
}

impl WatchListStore {
    /// Load the watch set from `path`.
    ///
    /// A missing file is an empty set. An unreadable or corrupt file is also
    /// treated as empty, and logged loudly; it is overwritten by the next
    /// successful mutation.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(raw) => dedupe(raw),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Watch list file is corrupt, starting with an empty list");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No watch list file yet");
                Vec::new()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read watch list file, starting with an empty list");
                Vec::new()
            }
        };

        info!(path = %path.display(), count = entries.len(), "Loaded watch list");

        Self {
            path,
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
            retry: RetryPolicy::persistence(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Watched ids in insertion order.
    pub fn list(&self) -> Vec<StreamerId> {
        self.entries.read().clone()
    }

    pub fn contains(&self, id: &StreamerId) -> bool {
        self.entries.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub async fn add(&self, id: &StreamerId) -> Result<AddOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.list();
        if next.contains(id) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        next.push(id.clone());

        self.persist(&next).await?;
        *self.entries.write() = next;
        info!(streamer = %id, "Added streamer to watch list");
        Ok(AddOutcome::Added)
    }

    pub async fn remove(&self, id: &StreamerId) -> Result<RemoveOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.list();
        let Some(pos) = next.iter().position(|entry| entry == id) else {
            return Ok(RemoveOutcome::NotFound);
        };
        next.remove(pos);

        self.persist(&next).await?;
        *self.entries.write() = next;
        info!(streamer = %id, "Removed streamer from watch list");
        Ok(RemoveOutcome::Removed)
    }

    async fn persist(&self, entries: &[StreamerId]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;

        let mut attempt = 0;
        loop {
            match write_atomic(&self.path, &json).await {
                Ok(()) => return Ok(()),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        attempt = attempt + 1,
                        retry_in = ?delay,
                        "Failed to write watch list, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Failed to write watch list");
                    return Err(e);
                }
            }
        }
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::persistence("creating directory", dir, e))?;
    }

    let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::persistence("writing", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::persistence("renaming", &tmp, e))
}

/// Normalize raw entries, dropping blanks and later duplicates.
fn dedupe(raw: Vec<String>) -> Vec<StreamerId> {
    let mut entries: Vec<StreamerId> = Vec::with_capacity(raw.len());
    for login in raw {
        let id = StreamerId::normalized(&login);
        if id.as_str().is_empty() || entries.contains(&id) {
            continue;
        }
        entries.push(id);
    }
    entries
}
