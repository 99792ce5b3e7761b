//! Streamer identifier value object.

use std::borrow::Borrow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

/// A Twitch login: 1-25 characters of lowercase ASCII letters, digits and `_`.
static LOGIN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,25}$").unwrap());

/// Channel URLs such as `https://www.twitch.tv/Alice` or `twitch.tv/alice/videos`.
static CHANNEL_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.|m\.)?twitch\.tv/([a-z0-9_]+)(?:[/?#].*)?$").unwrap()
});

/// Normalized (trimmed, lower-cased) streamer login.
///
/// Equality, ordering and hashing all operate on the normalized form, so
/// `"Foo"` and `" foo "` identify the same streamer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamerId(String);

impl StreamerId {
    /// Normalize without validating.
    ///
    /// Used for logins reported by the platform itself, which are trusted.
    pub fn normalized(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Parse user input: a bare login or a channel URL.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let login = match CHANNEL_URL_REGEX.captures(trimmed) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => trimmed,
        };

        let id = Self::normalized(login);
        if !LOGIN_REGEX.is_match(&id.0) {
            return Err(Error::validation(format!(
                "'{}' is not a valid Twitch login",
                input.trim()
            )));
        }
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public channel page for this streamer.
    pub fn channel_url(&self) -> String {
        format!("https://twitch.tv/{}", self.0)
    }
}

impl fmt::Display for StreamerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
