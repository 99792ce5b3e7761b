//! Domain value objects shared across the watcher.

pub mod retry_policy;
pub mod streamer_id;

pub use retry_policy::RetryPolicy;
pub use streamer_id::StreamerId;
