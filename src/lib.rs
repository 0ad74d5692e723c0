pub mod api;
pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

use crate::api::{start_server, AppState, ServerError};
use crate::config::AppConfig;

/// Initialise logging, read configuration and serve until Ctrl-C.
pub async fn run() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        threshold = config.confidence_threshold,
        model = %config.fallback.model,
        fallback_configured = config.fallback.has_credential(),
        daily_budget_usd = config.cost_limits.daily_budget_usd,
        per_client_daily_calls = config.cost_limits.per_client_daily_calls,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let mut server = start_server(state, config.bind_addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    server.wait().await
}
