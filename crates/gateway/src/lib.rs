//! HTTP/WebSocket gateway for Midwire.
//!
//! Owns the Connection Manager (session table), the Rate Limiter, the
//! Streaming Relay, and the Shutdown Coordinator, and exposes:
//! - `GET /ws` — the bidirectional chat event protocol
//! - `GET /health` — collaborator and process health
//!
//! Built on Axum for high performance async HTTP.

pub mod health;
pub mod protocol;
pub mod rate_limit;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tracing::{info, warn};

use midwire_agent::{ContextAugmenter, OrchestratorSettings, RecallClassifier, ToolOrchestrator};
use midwire_core::event::EventBus;
use midwire_core::memory::SemanticMemory;
use midwire_core::store::ChatStore;

use rate_limit::RateLimiter;
use session::SessionManager;
use shutdown::ShutdownCoordinator;

/// Shared application state for the gateway.
pub struct AppState {
    pub sessions: SessionManager,
    pub limiter: RateLimiter,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub augmenter: ContextAugmenter,
    pub orchestrator: ToolOrchestrator,
    pub store: Arc<dyn ChatStore>,
    pub memory: Arc<dyn SemanticMemory>,
    pub event_bus: Arc<EventBus>,
    pub trusted_proxy: bool,
    pub memory_limit_mb: u64,
    pub auto_save: bool,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Build everything from configuration and start the gateway.
///
/// Blocks until a termination signal arrives, then drains in-flight turns
/// for the configured grace period and closes collaborator resources.
pub async fn start(config: midwire_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::default());

    // === Collaborators ===
    let memory = midwire_memory::build_from_config(&config.memory.backend);
    let store: Arc<dyn ChatStore> = match config.store.backend.as_str() {
        "in_memory" => Arc::new(midwire_store::InMemoryStore::new()),
        _ => {
            let path = expand_home(&config.store.path);
            if let Some(parent) = std::path::Path::new(&path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(midwire_store::SqliteStore::new(&path).await?)
        }
    };
    let provider = midwire_providers::build_from_config(&config.provider);
    let tools = Arc::new(midwire_tools::default_registry(
        &config.tools.enabled,
        memory.clone(),
    ));

    // === Pipeline ===
    let mut augmenter = ContextAugmenter::new(
        memory.clone(),
        RecallClassifier::default(),
        event_bus.clone(),
    )
    .with_recall_limit(config.augmenter.recall_limit)
    .with_search_timeout(Duration::from_secs(config.augmenter.search_timeout_secs));
    if let Some(prompt) = &config.orchestrator.system_prompt_override {
        augmenter = augmenter.with_system_prompt(prompt);
    }

    let orchestrator = ToolOrchestrator::new(
        provider,
        tools,
        OrchestratorSettings {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: Some(config.provider.max_tokens),
            max_rounds: config.orchestrator.max_rounds,
            tool_timeout: Duration::from_secs(config.orchestrator.tool_timeout_secs),
        },
        event_bus.clone(),
    );

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let state: SharedState = Arc::new(AppState {
        sessions: SessionManager::new(),
        limiter: RateLimiter::new(&config.limits),
        shutdown: shutdown.clone(),
        augmenter,
        orchestrator,
        store: store.clone(),
        memory: memory.clone(),
        event_bus,
        trusted_proxy: config.gateway.trusted_proxy,
        memory_limit_mb: config.gateway.memory_limit_mb,
        auto_save: config.memory.auto_save,
    });

    let app = build_router(state);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(termination_signal(shutdown.clone()))
    .await?;

    // === Drain and close ===
    let grace = Duration::from_secs(config.shutdown.grace_secs);
    if !shutdown.drain(grace).await {
        warn!(
            grace_secs = config.shutdown.grace_secs,
            "In-flight turns did not finish within the grace period"
        );
    }
    if let Err(e) = store.close().await {
        warn!(error = %e, "Chat store close failed");
    }
    shutdown.mark_closed();
    info!("Gateway stopped");

    Ok(())
}

/// Resolve SIGINT/SIGTERM into the draining transition.
async fn termination_signal(shutdown: Arc<ShutdownCoordinator>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Termination signal received");
    shutdown.begin_drain();
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return format!("{home}/{rest}");
    }
    path.to_string()
}
