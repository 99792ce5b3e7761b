use std::collections::{BTreeSet, HashMap};

use crate::domain::StreamerId;
use crate::feed::LiveRecord;

use super::state::PresenceState;

/// How each watched streamer changed between two polls.
///
/// The four sets are disjoint and together cover the watch set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub became_live: BTreeSet<StreamerId>,
    pub still_live: BTreeSet<StreamerId>,
    pub became_offline: BTreeSet<StreamerId>,
    pub unchanged: BTreeSet<StreamerId>,
}

impl Diff {
    /// Treat streamers not seen this cycle as unchanged rather than offline.
    ///
    /// Used when the feed failed part-way and absence proves nothing.
    pub fn defer_offline(&mut self) {
        let deferred = std::mem::take(&mut self.became_offline);
        self.unchanged.extend(deferred);
    }

    /// Number of streamers that need channel side effects.
    pub fn actionable(&self) -> usize {
        self.became_live.len() + self.still_live.len() + self.became_offline.len()
    }

    pub fn len(&self) -> usize {
        self.actionable() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify every id in `watch` against the previous states and the live set.
///
/// Ids missing from `previous` count as offline. Previous states for ids
/// outside `watch` are ignored.
pub fn diff(
    previous: &HashMap<StreamerId, PresenceState>,
    watch: &[StreamerId],
    live_now: &HashMap<StreamerId, LiveRecord>,
) -> Diff {
    let mut out = Diff::default();

    for id in watch {
        let was_live = previous.get(id).is_some_and(|state| state.is_live);
        let is_live = live_now.contains_key(id);

        let bucket = match (was_live, is_live) {
            (false, true) => &mut out.became_live,
            (true, true) => &mut out.still_live,
            (true, false) => &mut out.became_offline,
            (false, false) => &mut out.unchanged,
        };
        bucket.insert(id.clone());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIVERSE: [&str; 4] = ["a", "b", "c", "d"];

    fn subset(mask: u32) -> Vec<StreamerId> {
        UNIVERSE
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, login)| StreamerId::normalized(login))
            .collect()
    }

    fn states(live: &[StreamerId]) -> HashMap<StreamerId, PresenceState> {
        live.iter()
            .map(|id| {
                let mut state = PresenceState::new(id.clone());
                state.is_live = true;
                (id.clone(), state)
            })
            .collect()
    }

    fn records(live: &[StreamerId]) -> HashMap<StreamerId, LiveRecord> {
        live.iter()
            .map(|id| (id.clone(), LiveRecord::new(id.clone())))
            .collect()
    }

    #[test]
    fn test_partitions_watch_set_for_all_small_inputs() {
        for watch_mask in 0..16 {
            for prev_mask in 0..16 {
                for live_mask in 0..16 {
                    let watch = subset(watch_mask);
                    let prev_live = subset(prev_mask);
                    let live = subset(live_mask);
                    let d = diff(&states(&prev_live), &watch, &records(&live));

                    let watch_set: BTreeSet<_> = watch.iter().cloned().collect();
                    let prev_set: BTreeSet<_> = prev_live.iter().cloned().collect();
                    let live_set: BTreeSet<_> = live.iter().cloned().collect();

                    // Disjoint and covering.
                    assert_eq!(d.len(), watch_set.len());
                    let union: BTreeSet<_> = d
                        .became_live
                        .iter()
                        .chain(&d.still_live)
                        .chain(&d.became_offline)
                        .chain(&d.unchanged)
                        .cloned()
                        .collect();
                    assert_eq!(union, watch_set);

                    let expected_live: BTreeSet<_> = live_set
                        .intersection(&watch_set)
                        .filter(|id| !prev_set.contains(*id))
                        .cloned()
                        .collect();
                    assert_eq!(d.became_live, expected_live);

                    let expected_still: BTreeSet<_> = prev_set
                        .intersection(&live_set)
                        .filter(|id| watch_set.contains(*id))
                        .cloned()
                        .collect();
                    assert_eq!(d.still_live, expected_still);

                    let expected_offline: BTreeSet<_> = prev_set
                        .difference(&live_set)
                        .filter(|id| watch_set.contains(*id))
                        .cloned()
                        .collect();
                    assert_eq!(d.became_offline, expected_offline);
                }
            }
        }
    }

    #[test]
    fn test_defer_offline() {
        let watch = subset(0b0011);
        let mut d = diff(&states(&watch), &watch, &records(&subset(0b0001)));
        assert_eq!(d.became_offline.len(), 1);

        d.defer_offline();
        assert!(d.became_offline.is_empty());
        assert_eq!(d.still_live.len(), 1);
        assert_eq!(d.unchanged.len(), 1);
        assert_eq!(d.actionable(), 1);
    }

    #[test]
    fn test_unwatched_live_streamer_is_ignored() {
        let d = diff(&HashMap::new(), &subset(0b0001), &records(&subset(0b0011)));
        assert_eq!(d.became_live.len(), 1);
        assert_eq!(d.len(), 1);
    }
}
