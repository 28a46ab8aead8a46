use anyhow::Context;

use call_broker::config::BrokerConfig;
use call_broker::server::{AppState, broker_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BrokerConfig::from_env().context("Failed to load configuration")?;

    tracing::info!(
        service_number = %config.service_number,
        dc = %config.dc,
        "Call broker v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(clients = ?config.roster.names(), "Allowable clients");
    tracing::debug!(prompt = %config.roster.prompt(), "IVR prompt");

    let state = AppState::from_config(&config).with_context(|| {
        format!(
            "Failed to start with private key {}",
            config.private_key_path.display()
        )
    })?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Application listening");

    axum::serve(listener, broker_routes(state)).await?;

    Ok(())
}
