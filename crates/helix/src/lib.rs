//! Minimal async client for the Twitch Helix API.
//!
//! Covers what a channel watcher needs: app access tokens via the
//! client-credentials grant, user lookup, and paginated live stream queries.

pub mod client;
pub mod error;
pub mod models;

pub use client::{HelixClient, MAX_LOGINS_PER_REQUEST};
pub use error::HelixError;
pub use models::{Page, Pagination, User};
