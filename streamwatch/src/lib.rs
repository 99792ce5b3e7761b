//! streamwatch library crate.
//!
//! Polls Twitch for the live status of a watched set of streamers and keeps
//! one notification message per live streamer in a Discord channel.

pub mod api;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notification;
pub mod presence;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod watchlist;

pub use error::{Error, Result};
