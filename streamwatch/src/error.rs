//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;
use twitch_helix::HelixError;

use crate::notification::DeliveryError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The streaming platform could not be reached or refused the request.
    /// A poll cycle that hits this degrades to a no-op.
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Delivery failure: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Persistence failure while {op} {}: {source}", path.display())]
    Persistence {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn feed(msg: impl Into<String>) -> Self {
        Self::FeedUnavailable(msg.into())
    }

    pub fn persistence(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<HelixError> for Error {
    fn from(err: HelixError) -> Self {
        Self::FeedUnavailable(err.to_string())
    }
}
