//! Poll scheduling.

mod service;

pub use service::{
    CycleOutcome, CycleReport, CycleSummary, DEFAULT_POLL_INTERVAL, PollScheduler,
    SchedulerConfig,
};
