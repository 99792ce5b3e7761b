//! Discord delivery channel over the Bot REST API.
//!
//! Follows Discord's rate limit guidance: no hardcoded limits, and 429
//! responses are retried after the `Retry-After` the server asks for.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DeliveryChannel, DeliveryError, DeliveryResult, MessageHandle};
use crate::notification::message::MessageContent;

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Target text channel id.
    pub channel_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_id: channel_id.into(),
            api_base: default_api_base(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Posts notifications into one Discord text channel as the bot user.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.channel_id
        )
    }

    fn message_url(&self, handle: &MessageHandle) -> String {
        format!("{}/{}", self.messages_url(), handle)
    }

    /// Send a request, retrying 429 responses up to [`MAX_RATE_LIMIT_RETRIES`] times.
    ///
    /// 404 maps to [`DeliveryError::NotFound`]; any other non-success status
    /// is returned without retrying.
    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&MessageContent>,
    ) -> DeliveryResult<Response> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bot {}", self.config.bot_token));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                DeliveryError::Request(format!("Discord request failed: {e}"))
            })?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::NOT_FOUND {
                return Err(DeliveryError::NotFound);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(DeliveryError::RateLimited { retry_after });
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!(%method, status = status.as_u16(), body = %body, "Discord request rejected");
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }
}

/// Parse the wait from a 429 response.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl DeliveryChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, content: &MessageContent) -> DeliveryResult<MessageHandle> {
        let response = self
            .request_with_retry(Method::POST, &self.messages_url(), Some(content))
            .await?;
        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| DeliveryError::Request(format!("Invalid Discord response: {e}")))?;

        debug!(message_id = %created.id, "Discord message sent");
        Ok(MessageHandle::new(created.id))
    }

    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> DeliveryResult<()> {
        self.request_with_retry(Method::PATCH, &self.message_url(handle), Some(content))
            .await?;
        debug!(message_id = %handle, "Discord message edited");
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> DeliveryResult<()> {
        self.request_with_retry(Method::DELETE, &self.message_url(handle), None)
            .await?;
        debug!(message_id = %handle, "Discord message deleted");
        Ok(())
    }

    async fn fetch(&self, handle: &MessageHandle) -> DeliveryResult<MessageContent> {
        let response = self
            .request_with_retry(Method::GET, &self.message_url(handle), None)
            .await?;
        response
            .json()
            .await
            .map_err(|e| DeliveryError::Request(format!("Invalid Discord response: {e}")))
    }
}
