//! `midwire serve` — run the gateway until a termination signal.

use tracing::info;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        midwire_config::AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        tracing::warn!(
            "No API key configured (MIDWIRE_API_KEY) — model requests will be rejected upstream"
        );
    }

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        model = %config.provider.model,
        "Starting Midwire gateway"
    );

    midwire_gateway::start(config).await
}
