use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::StreamerId;

use super::state::PresenceState;

/// Issued by [`PresenceTracker::begin_cycle`]; required to commit that cycle.
#[derive(Debug)]
pub struct CycleTicket {
    generation: u64,
    watch: Vec<StreamerId>,
}

impl CycleTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn watch(&self) -> &[StreamerId] {
        &self.watch
    }
}

#[derive(Default)]
struct Inner {
    states: HashMap<StreamerId, PresenceState>,
    /// Generation of the most recently started cycle.
    generation: u64,
    /// Ids forgotten while some cycle up to the recorded generation may be
    /// in flight. Outcomes from those cycles must not bring them back.
    tombstones: HashMap<StreamerId, u64>,
}

/// Owner of every [`PresenceState`].
///
/// A poll cycle reads a snapshot with [`begin_cycle`](Self::begin_cycle),
/// works on it without holding any lock, and writes the results back in one
/// step with [`commit`](Self::commit). Commands may [`forget`](Self::forget)
/// a streamer at any time in between.
#[derive(Default)]
pub struct PresenceTracker {
    inner: Mutex<Inner>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard states for ids that are no longer watched.
    pub fn retain(&self, watch: &[StreamerId]) {
        let mut inner = self.inner.lock();
        let before = inner.states.len();
        inner.states.retain(|id, _| watch.contains(id));
        let dropped = before - inner.states.len();
        if dropped > 0 {
            debug!(dropped, "Discarded presence for unwatched streamers");
        }
    }

    /// Start a cycle over `watch`.
    ///
    /// Drops states for unwatched ids and returns the previous state of every
    /// watched id, with a fresh offline state for ids seen for the first time.
    pub fn begin_cycle(
        &self,
        watch: &[StreamerId],
    ) -> (CycleTicket, HashMap<StreamerId, PresenceState>) {
        self.retain(watch);

        let mut inner = self.inner.lock();
        inner.generation += 1;

        let snapshot = watch
            .iter()
            .map(|id| {
                let state = inner
                    .states
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| PresenceState::new(id.clone()));
                (id.clone(), state)
            })
            .collect();

        let ticket = CycleTicket {
            generation: inner.generation,
            watch: watch.to_vec(),
        };
        (ticket, snapshot)
    }

    /// Store the outcome of a cycle.
    ///
    /// Watched ids without an outcome keep their state, or get a default one
    /// if they had none. Ids forgotten since the cycle began are skipped.
    pub fn commit(&self, ticket: CycleTicket, outcomes: Vec<PresenceState>) {
        let mut inner = self.inner.lock();
        let Inner {
            states, tombstones, ..
        } = &mut *inner;

        let forgotten = |id: &StreamerId| tombstones.get(id).is_some_and(|g| *g >= ticket.generation);

        for state in outcomes {
            if forgotten(&state.id) {
                debug!(streamer = %state.id, "Dropping outcome for streamer forgotten mid-cycle");
                continue;
            }
            states.insert(state.id.clone(), state);
        }

        for id in &ticket.watch {
            if !forgotten(id) && !states.contains_key(id) {
                states.insert(id.clone(), PresenceState::new(id.clone()));
            }
        }

        // Cycles never overlap, so no cycle at or before this one is left.
        tombstones.retain(|_, g| *g > ticket.generation);
    }

    /// Drop all state for `id`, including in cycles already running.
    pub fn forget(&self, id: &StreamerId) {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        inner.states.remove(id);
        inner.tombstones.insert(id.clone(), generation);
    }

    pub fn get(&self, id: &StreamerId) -> Option<PresenceState> {
        self.inner.lock().states.get(id).cloned()
    }

    /// Owned copy of every state.
    pub fn snapshot(&self) -> HashMap<StreamerId, PresenceState> {
        self.inner.lock().states.clone()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().states.values().filter(|s| s.is_live).count()
    }
}
