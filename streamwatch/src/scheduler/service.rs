//! Fixed-interval poll loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{RetryPolicy, StreamerId};
use crate::feed::{LiveFeedClient, LiveRecord};
use crate::notification::{Effects, Reconciler};
use crate::presence::{PresenceTracker, diff};
use crate::watchlist::WatchListStore;
use crate::Error;

/// Default poll interval (30 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Retries for the start-up handshake with the platform.
    pub handshake_retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            handshake_retry: RetryPolicy::handshake(),
        }
    }
}

/// Counts for a cycle that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub watched: usize,
    pub live: usize,
    pub became_live: usize,
    pub still_live: usize,
    pub became_offline: usize,
    pub effects: Effects,
    /// Channel calls that failed; each is retried next cycle.
    pub failures: usize,
    /// The feed failed part-way; offline transitions were deferred.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was already running.
    Skipped,
    /// Nothing is watched.
    Idle,
    /// The feed failed before returning anything; no state was changed.
    Aborted { reason: String },
    Completed(CycleSummary),
}

/// The outcome of a cycle and when it ran.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: CycleOutcome,
}

/// Everything the feed produced for one cycle.
struct FeedDrain {
    records: HashMap<StreamerId, LiveRecord>,
    pages: usize,
    error: Option<Error>,
}

/// Runs poll cycles: watch list, feed, diff, reconcile, commit.
///
/// At most one cycle runs at a time; a cycle requested while another is in
/// flight is skipped rather than queued.
pub struct PollScheduler {
    watchlist: Arc<WatchListStore>,
    feed: Arc<dyn LiveFeedClient>,
    tracker: Arc<PresenceTracker>,
    reconciler: Arc<Reconciler>,
    config: SchedulerConfig,
    cycle_lock: Mutex<()>,
    last_cycle: RwLock<Option<CycleReport>>,
    cycles: AtomicU64,
    handshake_ok: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        watchlist: Arc<WatchListStore>,
        feed: Arc<dyn LiveFeedClient>,
        tracker: Arc<PresenceTracker>,
        reconciler: Arc<Reconciler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            watchlist,
            feed,
            tracker,
            reconciler,
            config,
            cycle_lock: Mutex::new(()),
            last_cycle: RwLock::new(None),
            cycles: AtomicU64::new(0),
            handshake_ok: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.read().clone()
    }

    /// Number of cycles that actually ran (skipped ticks excluded).
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    pub fn handshake_succeeded(&self) -> bool {
        self.handshake_ok.load(Ordering::Relaxed)
    }

    /// Authenticate with the platform, retrying per the handshake policy.
    ///
    /// Returns `false` if every attempt failed or `cancel` fired. Polling
    /// should start either way; cycles then report the feed as unavailable
    /// until the platform recovers.
    pub async fn handshake(&self, cancel: &CancellationToken) -> bool {
        let policy = &self.config.handshake_retry;
        let mut attempt = 0;

        loop {
            match self.feed.handshake().await {
                Ok(()) => {
                    info!("Platform handshake succeeded");
                    self.handshake_ok.store(true, Ordering::Relaxed);
                    return true;
                }
                Err(e) if policy.should_retry(attempt) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        retry_in = ?delay,
                        "Platform handshake failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, "Platform handshake failed, polling in degraded mode");
                    return false;
                }
            }
        }
    }

    /// Handshake, then poll every interval until `cancel` fires.
    ///
    /// Cancellation is observed between cycles; a running cycle always
    /// finishes. A cycle that panics is logged and the loop continues.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.handshake(&cancel).await;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.config.poll_interval, "Poll scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Poll scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let this = self.clone();
            if let Err(e) = tokio::spawn(async move { this.tick().await }).await {
                error!(error = %e, "Poll cycle panicked");
            }
        }
        debug!("Poll scheduler stopped");
    }

    /// Run one cycle now unless one is already running.
    pub async fn tick(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("Poll cycle already running, skipping tick");
            return CycleOutcome::Skipped;
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = self.run_cycle().await;
        self.cycles.fetch_add(1, Ordering::Relaxed);

        match &outcome {
            CycleOutcome::Completed(summary) => info!(
                watched = summary.watched,
                live = summary.live,
                became_live = summary.became_live,
                became_offline = summary.became_offline,
                failures = summary.failures,
                partial = summary.partial,
                "Poll cycle completed"
            ),
            CycleOutcome::Aborted { reason } => warn!(reason = %reason, "Poll cycle aborted"),
            CycleOutcome::Idle => debug!("Watch list is empty, nothing to poll"),
            CycleOutcome::Skipped => {}
        }

        *self.last_cycle.write() = Some(CycleReport {
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let watch = self.watchlist.list();
        let (ticket, previous) = self.tracker.begin_cycle(&watch);
        if watch.is_empty() {
            return CycleOutcome::Idle;
        }

        let drain = self.drain_feed(&watch).await;
        let partial = match drain.error {
            Some(e) if drain.pages == 0 => {
                return CycleOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
            Some(e) => {
                warn!(
                    error = %e,
                    pages = drain.pages,
                    "Feed failed part-way, deferring offline transitions"
                );
                true
            }
            None => false,
        };

        let mut changes = diff(&previous, ticket.watch(), &drain.records);
        if partial {
            changes.defer_offline();
        }

        let report = self
            .reconciler
            .reconcile(&changes, &previous, &drain.records)
            .await;

        let summary = CycleSummary {
            watched: watch.len(),
            live: drain.records.len(),
            became_live: changes.became_live.len(),
            still_live: changes.still_live.len(),
            became_offline: changes.became_offline.len(),
            effects: report.effects,
            failures: report.failures.len(),
            partial,
        };

        // Streamers removed while the cycle ran are dropped, not resurrected.
        let states = report
            .states
            .into_iter()
            .filter(|state| self.watchlist.contains(&state.id))
            .collect();
        self.tracker.commit(ticket, states);

        CycleOutcome::Completed(summary)
    }

    /// Pull every page for `watch`, keeping what arrived before any error.
    async fn drain_feed(&self, watch: &[StreamerId]) -> FeedDrain {
        let mut drain = FeedDrain {
            records: HashMap::new(),
            pages: 0,
            error: None,
        };

        let mut pages = self.feed.live_records_for(watch);
        while let Some(page) = pages.next().await {
            match page {
                Ok(records) => {
                    drain.pages += 1;
                    for record in records {
                        if watch.contains(&record.id) {
                            drain.records.insert(record.id.clone(), record);
                        }
                    }
                }
                Err(e) => {
                    drain.error = Some(e);
                    break;
                }
            }
        }
        drain
    }
}
