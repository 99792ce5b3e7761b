use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use streamwatch::config::AppConfig;
use streamwatch::logging::init_logging;
use streamwatch::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    let (logging_config, _log_guard) =
        init_logging(config.log_dir.as_deref(), config.log_filter.as_deref())?;

    let retention_token = CancellationToken::new();
    if logging_config.log_dir().is_some() {
        logging_config.start_retention_cleanup(retention_token.clone());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        interval = ?config.poll_interval,
        "streamwatch starting"
    );

    let container = Arc::new(ServiceContainer::new(&config, Some(logging_config)).await?);

    let runner = {
        let container = container.clone();
        tokio::spawn(async move { container.run().await })
    };

    let shutdown_token = container.cancellation_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = shutdown_token.cancelled() => {}
    }

    container.shutdown().await?;
    retention_token.cancel();

    match runner.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "Service task failed"),
    }

    info!("streamwatch stopped");
    Ok(())
}
