//! Drives notification messages to match a presence diff.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::channels::{DeliveryChannel, DeliveryError, DeliveryResult};
use super::message::{MessageContent, render_ended, render_live};
use crate::domain::StreamerId;
use crate::feed::LiveRecord;
use crate::presence::{Diff, PresenceState};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Bound for every single channel call.
    pub call_timeout: Duration,
    /// Streamers reconciled at the same time.
    pub max_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_concurrency: 4,
        }
    }
}

/// The channel call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Send,
    Edit,
    Verify,
    Delete,
    Announce,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Send => "send",
            Self::Edit => "edit",
            Self::Verify => "verify",
            Self::Delete => "delete",
            Self::Announce => "announce",
        };
        f.write_str(s)
    }
}

/// A failed channel call, isolated to one streamer.
#[derive(Debug, Clone)]
pub struct ReconcileFailure {
    pub id: StreamerId,
    pub action: Action,
    pub error: DeliveryError,
}

/// Successful channel calls made during a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Effects {
    pub sent: usize,
    pub edited: usize,
    pub verified: usize,
    pub deleted: usize,
    pub announced: usize,
}

impl Effects {
    fn merge(&mut self, other: Effects) {
        self.sent += other.sent;
        self.edited += other.edited;
        self.verified += other.verified;
        self.deleted += other.deleted;
        self.announced += other.announced;
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// New state for every streamer that needed side effects.
    pub states: Vec<PresenceState>,
    pub failures: Vec<ReconcileFailure>,
    pub effects: Effects,
}

/// Work for one streamer.
enum Task {
    GoLive(PresenceState, LiveRecord),
    StayLive(PresenceState, LiveRecord),
    GoOffline(PresenceState),
    /// Resend an "ended" announcement that failed in an earlier cycle.
    Announce(PresenceState),
}

/// Result of one streamer's task.
struct Outcome {
    state: PresenceState,
    failures: Vec<ReconcileFailure>,
    effects: Effects,
}

impl Outcome {
    fn new(state: PresenceState) -> Self {
        Self {
            state,
            failures: Vec::new(),
            effects: Effects::default(),
        }
    }

    fn fail(&mut self, action: Action, error: DeliveryError) {
        warn!(streamer = %self.state.id, %action, error = %error, "Notification call failed");
        self.failures.push(ReconcileFailure {
            id: self.state.id.clone(),
            action,
            error,
        });
    }
}

/// Creates, edits and retires notification messages on a delivery channel.
///
/// Each streamer is handled independently; a failure for one never stops
/// the others. Failed calls leave the state so that the next cycle retries.
pub struct Reconciler {
    channel: Arc<dyn DeliveryChannel>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(channel: Arc<dyn DeliveryChannel>, config: ReconcilerConfig) -> Self {
        Self { channel, config }
    }

    pub fn channel(&self) -> &Arc<dyn DeliveryChannel> {
        &self.channel
    }

    /// Apply `diff` to the channel.
    ///
    /// `previous` must hold a state for every id in the diff's actionable
    /// sets and `live_now` a record for every live one; ids missing from
    /// either are treated as offline with no message. Unchanged offline
    /// streamers with a failed "ended" announcement get it resent.
    pub async fn reconcile(
        &self,
        diff: &Diff,
        previous: &HashMap<StreamerId, PresenceState>,
        live_now: &HashMap<StreamerId, LiveRecord>,
    ) -> ReconcileReport {
        let prev = |id: &StreamerId| {
            previous
                .get(id)
                .cloned()
                .unwrap_or_else(|| PresenceState::new(id.clone()))
        };

        let mut tasks = Vec::with_capacity(diff.actionable());
        for id in &diff.became_live {
            if let Some(record) = live_now.get(id) {
                tasks.push(Task::GoLive(prev(id), record.clone()));
            }
        }
        for id in &diff.still_live {
            if let Some(record) = live_now.get(id) {
                tasks.push(Task::StayLive(prev(id), record.clone()));
            }
        }
        for id in &diff.became_offline {
            tasks.push(Task::GoOffline(prev(id)));
        }
        for id in &diff.unchanged {
            if let Some(state) = previous.get(id)
                && state.pending_announce
                && !state.is_live
            {
                tasks.push(Task::Announce(state.clone()));
            }
        }

        let outcomes: Vec<Outcome> = stream::iter(tasks)
            .map(|task| self.run(task))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = ReconcileReport::default();
        for outcome in outcomes {
            report.states.push(outcome.state);
            report.failures.extend(outcome.failures);
            report.effects.merge(outcome.effects);
        }
        report
    }

    async fn run(&self, task: Task) -> Outcome {
        match task {
            Task::GoLive(prev, record) => self.go_live(prev, record).await,
            Task::StayLive(prev, record) => self.stay_live(prev, record).await,
            Task::GoOffline(prev) => self.go_offline(prev).await,
            Task::Announce(prev) => {
                let mut out = Outcome::new(prev);
                self.announce_ended(&mut out).await;
                out
            }
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = DeliveryResult<T>>) -> DeliveryResult<T> {
        tokio::time::timeout(self.config.call_timeout, fut)
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.config.call_timeout)))
    }

    /// Send a fresh live message. On failure the streamer stays as in `out`.
    ///
    /// An undeleted older message is kept in `pending_delete`.
    async fn send_live(&self, out: &mut Outcome, record: LiveRecord, content: &MessageContent) {
        match self.call(self.channel.send(content)).await {
            Ok(handle) => {
                info!(streamer = %record.id, message = %handle, "Live notification sent");
                out.effects.sent += 1;
                let stale = out.state.pending_delete.take();
                out.state = PresenceState::live(record.id.clone(), handle, record);
                out.state.pending_delete = stale;
            }
            Err(e) => out.fail(Action::Send, e),
        }
    }

    async fn go_live(&self, prev: PresenceState, record: LiveRecord) -> Outcome {
        let content = render_live(&record);
        let stale = prev.pending_delete.clone();
        let mut out = Outcome::new(PresenceState {
            is_live: false,
            notification: None,
            rendered: None,
            pending_announce: false,
            ..prev
        });

        // A message that failed to be deleted is brought back instead of
        // posting a second one.
        if let Some(handle) = stale {
            match self.call(self.channel.edit(&handle, &content)).await {
                Ok(()) => {
                    info!(streamer = %record.id, message = %handle, "Revived stale notification");
                    out.effects.edited += 1;
                    out.state = PresenceState::live(record.id.clone(), handle, record);
                    return out;
                }
                Err(DeliveryError::NotFound) => {
                    debug!(streamer = %record.id, "Stale notification is gone, sending a new one");
                    out.state.pending_delete = None;
                }
                Err(e) => out.fail(Action::Edit, e),
            }
        }

        self.send_live(&mut out, record, &content).await;
        out
    }

    async fn stay_live(&self, prev: PresenceState, record: LiveRecord) -> Outcome {
        let Some(handle) = prev.notification.clone() else {
            let mut out = Outcome::new(prev);
            let content = render_live(&record);
            self.send_live(&mut out, record, &content).await;
            return out;
        };

        let unchanged = prev.rendered.as_ref() == Some(&record);
        let mut out = Outcome::new(prev);

        let result = if unchanged {
            self.call(self.channel.fetch(&handle)).await.map(|_| ())
        } else {
            self.call(self.channel.edit(&handle, &render_live(&record)))
                .await
        };

        match result {
            Ok(()) if unchanged => out.effects.verified += 1,
            Ok(()) => {
                debug!(streamer = %record.id, message = %handle, "Live notification updated");
                out.effects.edited += 1;
                out.state.rendered = Some(record);
            }
            Err(DeliveryError::NotFound) => {
                info!(streamer = %record.id, message = %handle, "Live notification was deleted, replacing it");
                out.state.notification = None;
                out.state.rendered = None;
                let content = render_live(&record);
                self.send_live(&mut out, record, &content).await;
                // Still live even if the replacement failed; the next cycle resends.
                out.state.is_live = true;
            }
            Err(e) => {
                let action = if unchanged { Action::Verify } else { Action::Edit };
                out.fail(action, e);
            }
        }
        out
    }

    async fn go_offline(&self, prev: PresenceState) -> Outcome {
        let id = prev.id.clone();
        let handle = prev.notification.clone();
        let mut out = Outcome::new(PresenceState::new(id.clone()));
        out.state.pending_delete = prev.pending_delete;

        if let Some(handle) = handle {
            match self.call(self.channel.delete(&handle)).await {
                Ok(()) => out.effects.deleted += 1,
                Err(DeliveryError::NotFound) => {
                    debug!(streamer = %id, message = %handle, "Live notification already gone");
                }
                Err(e) => {
                    out.fail(Action::Delete, e);
                    if let Some(stale) = out.state.pending_delete.replace(handle) {
                        warn!(streamer = %id, message = %stale, "Abandoning older undeleted notification");
                    }
                }
            }
        }

        self.announce_ended(&mut out).await;
        out
    }

    /// Send the "ended" announcement, leaving `pending_announce` set on failure.
    async fn announce_ended(&self, out: &mut Outcome) {
        let id = out.state.id.clone();
        match self.call(self.channel.send(&render_ended(&id))).await {
            Ok(_) => {
                info!(streamer = %id, "Stream ended announcement sent");
                out.effects.announced += 1;
                out.state.pending_announce = false;
            }
            Err(e) => {
                out.fail(Action::Announce, e);
                out.state.pending_announce = true;
            }
        }
    }
}
