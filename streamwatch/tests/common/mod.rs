//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;

use streamwatch::commands::WatchCommands;
use streamwatch::domain::{RetryPolicy, StreamerId};
use streamwatch::feed::{CanonicalIdentity, LiveFeedClient, LiveRecord};
use streamwatch::notification::{MemoryChannel, ReconcilerConfig};
use streamwatch::presence::PresenceTracker;
use streamwatch::scheduler::{PollScheduler, SchedulerConfig};
use streamwatch::services::ServiceContainer;
use streamwatch::watchlist::WatchListStore;
use streamwatch::{Error, Result};

/// One page the scripted feed yields.
#[derive(Debug, Clone)]
pub enum Page {
    Records(Vec<LiveRecord>),
    Fail(&'static str),
}

/// Feed that plays back one script per cycle, then reports the default live
/// set (nobody, unless configured).
#[derive(Default)]
pub struct ScriptedFeed {
    cycles: Mutex<VecDeque<Vec<Page>>>,
    /// Reported once the scripts run out.
    fallback: Mutex<Vec<LiveRecord>>,
    known: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled when a cycle starts reading the feed.
    pub entered: Notify,
    pub fail_handshake: AtomicBool,
    /// Panic on the next feed read.
    pub panic_next: AtomicBool,
    handshakes: AtomicUsize,
    fetches: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_cycle(&self, pages: Vec<Page>) {
        self.cycles.lock().push_back(pages);
    }

    /// Script a cycle with a single page of live records.
    pub fn push_live(&self, records: Vec<LiveRecord>) {
        self.push_cycle(vec![Page::Records(records)]);
    }

    /// Live records to report when no script is queued.
    pub fn live_by_default(&self, records: Vec<LiveRecord>) {
        *self.fallback.lock() = records;
    }

    pub fn know(&self, login: &str) {
        self.known.lock().insert(login.to_string());
    }

    /// Hold the next cycle inside the feed until `gate` is notified.
    pub fn hold_next(&self, gate: Arc<Notify>) {
        *self.gate.lock() = Some(gate);
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveFeedClient for ScriptedFeed {
    async fn handshake(&self) -> Result<()> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if self.fail_handshake.load(Ordering::SeqCst) {
            return Err(Error::feed("invalid client credentials"));
        }
        Ok(())
    }

    async fn resolve(&self, id: &StreamerId) -> Result<Option<CanonicalIdentity>> {
        Ok(self.known.lock().contains(id.as_str()).then(|| CanonicalIdentity {
            id: id.clone(),
            user_id: format!("uid-{id}"),
            display_name: id.to_string(),
        }))
    }

    fn live_records_for<'a>(
        &'a self,
        _ids: &'a [StreamerId],
    ) -> BoxStream<'a, Result<Vec<LiveRecord>>> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("feed exploded");
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let pages = self.cycles.lock().pop_front().unwrap_or_else(|| {
            let fallback = self.fallback.lock().clone();
            if fallback.is_empty() {
                Vec::new()
            } else {
                vec![Page::Records(fallback)]
            }
        });
        let gate = self.gate.lock().take();
        let entered = &self.entered;

        stream::once(async move {
            entered.notify_one();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        })
        .flat_map(move |()| {
            stream::iter(pages.clone().into_iter().map(|page| match page {
                Page::Records(records) => Ok(records),
                Page::Fail(reason) => Err(Error::feed(reason)),
            }))
        })
        .boxed()
    }
}

pub fn id(login: &str) -> StreamerId {
    StreamerId::normalized(login)
}

pub fn live(login: &str, category: &str, viewers: u64) -> LiveRecord {
    LiveRecord {
        category: category.to_string(),
        viewer_count: Some(viewers),
        ..LiveRecord::new(id(login))
    }
}

/// A scheduler wired to a scripted feed and an in-memory channel.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<WatchListStore>,
    pub feed: Arc<ScriptedFeed>,
    pub channel: Arc<MemoryChannel>,
    pub tracker: Arc<PresenceTracker>,
    pub scheduler: Arc<PollScheduler>,
    pub commands: Arc<WatchCommands>,
}

impl Harness {
    pub async fn new(watch: &[&str]) -> Self {
        let config = SchedulerConfig {
            handshake_retry: RetryPolicy::no_retry(),
            ..Default::default()
        };
        Self::with_config(watch, config).await
    }

    pub async fn with_config(watch: &[&str], config: SchedulerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = WatchListStore::load(dir.path().join("streamers.json")).await;
        for login in watch {
            store.add(&id(login)).await.unwrap();
        }
        let store = Arc::new(store);
        let feed = Arc::new(ScriptedFeed::new());
        let channel = Arc::new(MemoryChannel::new());

        let container = ServiceContainer::with_components(
            store.clone(),
            feed.clone(),
            channel.clone(),
            config,
            ReconcilerConfig::default(),
        );

        Self {
            dir,
            store,
            feed,
            channel,
            tracker: container.tracker.clone(),
            scheduler: container.scheduler.clone(),
            commands: container.commands.clone(),
        }
    }
}
