use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::HelixError;
use crate::models::{Page, TokenResponse, User};

/// Helix accepts at most 100 `login`/`user_login` parameters per request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Tokens are refreshed this long before Twitch says they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// App tokens last about 60 days; longer grants are capped.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(90 * 24 * 60 * 60);

pub type Result<T> = std::result::Result<T, HelixError>;

#[derive(Debug, Clone)]
struct AppAccessToken {
    value: String,
    expires_at: Instant,
}

impl AppAccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_SKEW < self.expires_at
    }
}

/// Client for the parts of the Twitch Helix API needed to watch channels.
///
/// Authenticates with the OAuth client-credentials grant and caches the app
/// access token until shortly before it expires. A request rejected with 401
/// invalidates the cached token and is retried once with a fresh one.
pub struct HelixClient {
    http: Client,
    client_id: String,
    client_secret: String,
    api_base: Url,
    auth_base: Url,
    token: RwLock<Option<AppAccessToken>>,
    /// Serializes token fetches so concurrent callers share one grant.
    auth_lock: tokio::sync::Mutex<()>,
}

impl HelixClient {
    pub const DEFAULT_API_BASE: &'static str = "https://api.twitch.tv/helix/";
    pub const DEFAULT_AUTH_BASE: &'static str = "https://id.twitch.tv/oauth2/";

    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: Url::parse(Self::DEFAULT_API_BASE)?,
            auth_base: Url::parse(Self::DEFAULT_AUTH_BASE)?,
            token: RwLock::new(None),
            auth_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Override the Helix base URL (used by tests against a mock server).
    pub fn with_api_base(mut self, base: &str) -> Result<Self> {
        self.api_base = parse_base(base)?;
        Ok(self)
    }

    /// Override the OAuth base URL.
    pub fn with_auth_base(mut self, base: &str) -> Result<Self> {
        self.auth_base = parse_base(base)?;
        Ok(self)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether a non-expired app access token is cached.
    pub fn is_authenticated(&self) -> bool {
        self.token.read().as_ref().is_some_and(AppAccessToken::is_fresh)
    }

    /// Fetch a new app access token, replacing any cached one.
    pub async fn authenticate(&self) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        self.fetch_token().await.map(|_| ())
    }

    /// Drop the cached token so the next request re-authenticates.
    pub fn invalidate_token(&self) {
        self.token.write().take();
    }

    /// Look up users by login.
    ///
    /// Unknown logins are simply absent from the result; Helix does not
    /// report them as errors.
    pub async fn get_users(&self, logins: &[String]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(logins.len());
        for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|l| ("login", l.as_str())).collect();
            let page: Page<User> = self.get_json("users", &query).await?;
            users.extend(page.data);
        }
        Ok(users)
    }

    /// Fetch one page of live streams for up to [`MAX_LOGINS_PER_REQUEST`] logins.
    ///
    /// Stream objects are returned undecoded so the caller can validate each
    /// one on its own and drop malformed entries without losing the page.
    pub async fn get_streams_page(
        &self,
        logins: &[String],
        after: Option<&str>,
    ) -> Result<Page<serde_json::Value>> {
        let mut query: Vec<(&str, &str)> = logins
            .iter()
            .take(MAX_LOGINS_PER_REQUEST)
            .map(|l| ("user_login", l.as_str()))
            .collect();
        query.push(("first", "100"));
        if let Some(cursor) = after {
            query.push(("after", cursor));
        }
        self.get_json("streams", &query).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.api_base.join(path)?;
        let mut reauthenticated = false;

        loop {
            let token = self.access_token().await?;
            let response = self
                .http
                .get(url.clone())
                .query(query)
                .header("Client-Id", &self.client_id)
                .bearer_auth(&token)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                return Ok(serde_json::from_str(&body)?);
            }

            match status {
                StatusCode::UNAUTHORIZED if !reauthenticated => {
                    debug!(path, "Helix rejected app token, re-authenticating");
                    self.invalidate_token();
                    reauthenticated = true;
                }
                StatusCode::UNAUTHORIZED => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(HelixError::Unauthorized(body));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = rate_limit_reset(&response);
                    warn!(path, ?retry_after, "Helix rate limit hit");
                    return Err(HelixError::RateLimited { retry_after });
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(HelixError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let _guard = self.auth_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    fn cached_token(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|token| token.is_fresh())
            .map(|token| token.value.clone())
    }

    /// Must be called with `auth_lock` held.
    async fn fetch_token(&self) -> Result<String> {
        let url = self.auth_base.join("token")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    HelixError::Unauthorized(body)
                }
                _ => HelixError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let body = response.text().await?;
        let grant: TokenResponse = serde_json::from_str(&body)?;
        let expires_at = token_expiry(Instant::now(), grant.expires_in);
        info!(expires_in = grant.expires_in, "Obtained Twitch app access token");

        *self.token.write() = Some(AppAccessToken {
            value: grant.access_token.clone(),
            expires_at,
        });
        Ok(grant.access_token)
    }
}

fn token_expiry(now: Instant, expires_in: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in).min(MAX_TOKEN_LIFETIME);
    now.checked_add(lifetime).unwrap_or(now)
}

/// Base URLs must end with a slash for `Url::join` to append rather than replace.
fn parse_base(base: &str) -> Result<Url> {
    if base.ends_with('/') {
        Ok(Url::parse(base)?)
    } else {
        Ok(Url::parse(&format!("{base}/"))?)
    }
}

/// Helix reports the bucket reset as a unix timestamp in `Ratelimit-Reset`.
fn rate_limit_reset(response: &Response) -> Option<Duration> {
    let reset = response
        .headers()
        .get("Ratelimit-Reset")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}
