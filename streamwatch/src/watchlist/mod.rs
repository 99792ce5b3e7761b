//! Persistent watch list.

mod store;

pub use store::{AddOutcome, RemoveOutcome, WatchListStore};
