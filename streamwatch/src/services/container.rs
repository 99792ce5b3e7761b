//! Service container for dependency injection.
//!
//! The ServiceContainer builds every component from [`AppConfig`] and owns
//! their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use twitch_helix::HelixClient;

use crate::api::{ApiServer, AppState};
use crate::commands::WatchCommands;
use crate::config::AppConfig;
use crate::feed::{HelixFeed, LiveFeedClient, RateLimiter, RateLimiterConfig};
use crate::logging::LoggingConfig;
use crate::notification::{
    DeliveryChannel, DiscordChannel, DiscordConfig, Reconciler, ReconcilerConfig,
};
use crate::presence::PresenceTracker;
use crate::scheduler::{PollScheduler, SchedulerConfig};
use crate::utils::http_client;
use crate::watchlist::WatchListStore;
use crate::Result;

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    pub watchlist: Arc<WatchListStore>,
    pub feed: Arc<dyn LiveFeedClient>,
    pub tracker: Arc<PresenceTracker>,
    pub scheduler: Arc<PollScheduler>,
    pub commands: Arc<WatchCommands>,
    api: Option<ApiServer>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build the production graph: Helix feed, Discord channel, file-backed
    /// watch list.
    pub async fn new(config: &AppConfig, logging: Option<Arc<LoggingConfig>>) -> Result<Self> {
        let http = http_client::build_client(config.request_timeout)?;

        let helix = HelixClient::new(
            http.clone(),
            &config.twitch_client_id,
            &config.twitch_client_secret,
        )?;
        let limiter = RateLimiter::new(RateLimiterConfig::with_rps(config.helix_rate_limit)?);
        let feed: Arc<dyn LiveFeedClient> =
            Arc::new(HelixFeed::new(helix, limiter, config.request_timeout));

        let channel: Arc<dyn DeliveryChannel> = Arc::new(DiscordChannel::new(
            DiscordConfig::new(&config.discord_token, &config.channel_id),
            http,
        ));

        let watchlist = Arc::new(WatchListStore::load(&config.streamers_file).await);
        info!(
            path = %config.streamers_file.display(),
            watched = watchlist.len(),
            "Watch list loaded"
        );

        let scheduler_config = SchedulerConfig {
            poll_interval: config.poll_interval,
            ..Default::default()
        };
        let reconciler_config = ReconcilerConfig {
            call_timeout: config.request_timeout,
            ..Default::default()
        };

        let mut container = Self::with_components(
            watchlist,
            feed,
            channel,
            scheduler_config,
            reconciler_config,
        );

        if let Some(api_config) = config.api.clone() {
            let mut state = AppState::new(
                container.commands.clone(),
                container.scheduler.clone(),
                container.tracker.clone(),
            );
            if let Some(logging) = logging {
                state = state.with_logging_config(logging);
            }
            container.api = Some(ApiServer::new(
                api_config,
                state,
                container.cancellation_token.child_token(),
            ));
        }

        Ok(container)
    }

    /// Wire the core around already-built boundaries. No admin API.
    pub fn with_components(
        watchlist: Arc<WatchListStore>,
        feed: Arc<dyn LiveFeedClient>,
        channel: Arc<dyn DeliveryChannel>,
        scheduler_config: SchedulerConfig,
        reconciler_config: ReconcilerConfig,
    ) -> Self {
        let tracker = Arc::new(PresenceTracker::new());
        let reconciler = Arc::new(Reconciler::new(channel, reconciler_config));
        let scheduler = Arc::new(PollScheduler::new(
            watchlist.clone(),
            feed.clone(),
            tracker.clone(),
            reconciler,
            scheduler_config,
        ));
        let commands = Arc::new(WatchCommands::new(
            watchlist.clone(),
            feed.clone(),
            tracker.clone(),
        ));

        Self {
            watchlist,
            feed,
            tracker,
            scheduler,
            commands,
            api: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Run the poll loop, and the admin API when configured, until
    /// [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        let scheduler_task: JoinHandle<()> = tokio::spawn(
            self.scheduler
                .clone()
                .run(self.cancellation_token.child_token()),
        );

        let api_result = match &self.api {
            Some(api) => api.run().await,
            None => {
                self.cancellation_token.cancelled().await;
                Ok(())
            }
        };
        if api_result.is_err() {
            self.cancellation_token.cancel();
        }

        if let Err(e) = scheduler_task.await {
            warn!(error = %e, "Poll scheduler task failed");
        }
        api_result
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown all services gracefully with a custom timeout.
    ///
    /// Waits for an in-flight poll cycle to finish, up to `timeout`.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let drained = tokio::time::timeout(timeout, async {
            while self.scheduler.is_cycle_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        info!("Services shut down");
        Ok(())
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
