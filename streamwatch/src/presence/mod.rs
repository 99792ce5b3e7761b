//! Per-streamer live state carried between poll cycles.

mod diff;
mod state;
mod tracker;

pub use diff::{Diff, diff};
pub use state::PresenceState;
pub use tracker::{CycleTicket, PresenceTracker};
