//! `midwire status` — show resolved configuration and backend health.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config =
        midwire_config::AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Midwire {} — status", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Gateway:       {}:{}", config.gateway.host, config.gateway.port);
    println!("Model:         {} ({})", config.provider.model, config.provider.base_url);
    println!("API key:       {}", if config.has_api_key() { "configured" } else { "missing" });
    println!(
        "Rate limits:   {}/minute, {}/hour ({} tracked identities max)",
        config.limits.per_minute, config.limits.per_hour, config.limits.identity_capacity
    );
    println!("Tool rounds:   {} max per turn", config.orchestrator.max_rounds);
    println!("Memory:        {}", config.memory.backend);
    println!("Chat store:    {} ({})", config.store.backend, config.store.path);
    println!(
        "Tools enabled: {}",
        if config.tools.enabled.is_empty() {
            "all built-ins".to_string()
        } else {
            config.tools.enabled.join(", ")
        }
    );

    // Reachability probe against the configured model backend.
    let provider = midwire_providers::build_from_config(&config.provider);
    match midwire_core::Provider::health_check(provider.as_ref()).await {
        Ok(true) => println!("Backend:       reachable"),
        Ok(false) => println!("Backend:       unreachable (non-success status)"),
        Err(e) => println!("Backend:       unreachable ({e})"),
    }

    Ok(())
}
