//! Admin HTTP API.
//!
//! Exposes the watch list commands, on-demand polling, runtime log filter
//! changes and health reporting.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
