use anyhow::Context;
use tracing::{error, info};

use streamwatch::config::AppConfig;
use streamwatch::logging;
use streamwatch::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive for the whole process
    let (logging_config, _guard) = logging::init_logging(&config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_url,
        "Starting streamwatch"
    );

    let services = ServiceContainer::new(config)
        .await
        .context("failed to open database")?;
    services.initialize().await?;
    logging_config.start_retention_cleanup(services.cancellation_token());

    let handles = services
        .start()
        .await
        .context("failed to start services")?;

    let cancel = services.cancellation_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }

    let report = services.shutdown(handles, "shutdown signal").await?;
    if !report.all_graceful() {
        error!(
            forced = report.forced_terminations,
            "Some monitors did not stop in time"
        );
    }

    info!("streamwatch stopped");
    Ok(())
}
