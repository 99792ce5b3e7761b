//! Process configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_STREAMERS_FILE: &str = "data/streamers.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HELIX_RATE_LIMIT: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_token: String,
    /// Discord channel that receives live notifications.
    pub channel_id: String,
    pub twitch_client_id: String,
    pub twitch_client_secret: String,
    pub poll_interval: Duration,
    pub streamers_file: PathBuf,
    /// Bound for every platform and delivery-channel call.
    pub request_timeout: Duration,
    /// Client-side Helix requests per second.
    pub helix_rate_limit: f64,
    /// Admin API, enabled only when `API_PORT` or `API_BIND_ADDRESS` is set.
    pub api: Option<ApiServerConfig>,
    pub log_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required =
            |key: &str| get(key).ok_or_else(|| Error::config(format!("{key} must be set")));

        let channel_id = get("NOTIFY_CHANNEL_ID")
            .or_else(|| get("WELCOME_CHANNEL_ID"))
            .ok_or_else(|| Error::config("NOTIFY_CHANNEL_ID must be set"))?;
        if !channel_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::config(format!(
                "NOTIFY_CHANNEL_ID must be a numeric Discord id, got '{channel_id}'"
            )));
        }

        let poll_secs: u64 = parse_or(
            get("TWITCH_POLL_INTERVAL"),
            "TWITCH_POLL_INTERVAL",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        if poll_secs == 0 {
            return Err(Error::config("TWITCH_POLL_INTERVAL must be at least 1 second"));
        }
        let timeout_secs: u64 = parse_or(
            get("REQUEST_TIMEOUT_SECS"),
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let helix_rate_limit: f64 =
            parse_or(get("HELIX_RATE_LIMIT"), "HELIX_RATE_LIMIT", DEFAULT_HELIX_RATE_LIMIT)?;
        if !helix_rate_limit.is_finite() || helix_rate_limit <= 0.0 {
            return Err(Error::config("HELIX_RATE_LIMIT must be a positive number"));
        }

        let bind_address = get("API_BIND_ADDRESS");
        let port = get("API_PORT");
        let api = if bind_address.is_some() || port.is_some() {
            let mut api = ApiServerConfig::default();
            if let Some(bind_address) = bind_address {
                api.bind_address = bind_address;
            }
            api.port = parse_or(port, "API_PORT", api.port)?;
            Some(api)
        } else {
            None
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            channel_id,
            twitch_client_id: required("TWITCH_CLIENT_ID")?,
            twitch_client_secret: required("TWITCH_CLIENT_SECRET")?,
            poll_interval: Duration::from_secs(poll_secs),
            streamers_file: get("STREAMERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STREAMERS_FILE)),
            request_timeout: Duration::from_secs(timeout_secs),
            helix_rate_limit,
            api,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            log_filter: get("LOG_FILTER"),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} has an invalid value '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DISCORD_TOKEN", "token"),
            ("NOTIFY_CHANNEL_ID", "123456"),
            ("TWITCH_CLIENT_ID", "cid"),
            ("TWITCH_CLIENT_SECRET", "secret"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<AppConfig> {
        AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.streamers_file, PathBuf::from("data/streamers.json"));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.helix_rate_limit, 10.0);
        assert!(config.api.is_none());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_welcome_channel_fallback() {
        let mut env = base_env();
        env.remove("NOTIFY_CHANNEL_ID");
        env.insert("WELCOME_CHANNEL_ID", "42");
        assert_eq!(load(&env).unwrap().channel_id, "42");
    }

    #[test]
    fn test_missing_required() {
        let mut env = base_env();
        env.insert("DISCORD_TOKEN", "  ");
        assert!(matches!(load(&env), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_numbers() {
        let mut env = base_env();
        env.insert("TWITCH_POLL_INTERVAL", "soon");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert("TWITCH_POLL_INTERVAL", "0");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert("HELIX_RATE_LIMIT", "-1");
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_api_enabled_by_port() {
        let mut env = base_env();
        env.insert("API_PORT", "8080");
        let api = load(&env).unwrap().api.unwrap();
        assert_eq!(api.port, 8080);
        assert_eq!(api.bind_address, "127.0.0.1");
    }
}
