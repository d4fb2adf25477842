//! backoffice-service binary: operational HTTP endpoints over PostgreSQL.

use backoffice_service::config::BackofficeConfig;
use backoffice_service::startup::{shutdown_signal, Application};
use service_core::observability::init_tracing;
use std::io;

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = BackofficeConfig::load()
        .map_err(|e| io::Error::other(format!("Configuration error: {}", e)))?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        http_port = config.common.port,
        db_pool = %format!(
            "{}..{}",
            config.database.min_connections, config.database.max_connections
        ),
        default_discount_rate = %config.invoicing.default_discount_rate,
        low_stock_threshold = config.invoicing.low_stock_threshold,
        otlp_enabled = config.otlp_endpoint.is_some(),
        "Starting {}",
        config.service_name
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        io::Error::other(format!("Application build error: {}", e))
    })?;

    app.run_until_stopped(shutdown_signal()).await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
