//! Health endpoint.
//!
//! Reports collaborator reachability and process memory pressure.
//! A storage outage degrades the report but never blocks liveness; only
//! memory near its limit reports unhealthy.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tracing::warn;

use midwire_core::memory::SemanticMemory;
use midwire_core::store::ChatStore;

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: String,
    pub vectordb: String,
    pub memory: String,
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let database = match state.store.health_check().await {
        Ok(true) => "ok".to_string(),
        Ok(false) => "unreachable".to_string(),
        Err(e) => {
            warn!(error = %e, "Chat store health check failed");
            "unreachable".to_string()
        }
    };

    let vectordb = match state.memory.health_check().await {
        Ok(true) => "ok".to_string(),
        Ok(false) => "unreachable".to_string(),
        Err(e) => {
            warn!(error = %e, "Semantic memory health check failed");
            "unreachable".to_string()
        }
    };

    let limit_mb = state.memory_limit_mb;
    let (memory, memory_ok) = match process_memory_mb() {
        Some(used_mb) if used_mb >= limit_mb => {
            (format!("near limit ({used_mb} MiB / {limit_mb} MiB)"), false)
        }
        Some(used_mb) => (format!("ok ({used_mb} MiB)"), true),
        None => ("unknown".to_string(), true),
    };

    // Storage trouble degrades; only memory exhaustion is unhealthy.
    let status = if !memory_ok {
        "unhealthy"
    } else if database != "ok" || vectordb != "ok" {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        checks: HealthChecks {
            database,
            vectordb,
            memory,
        },
    })
}

/// Resident memory of this process in MiB, if the platform reports it.
fn process_memory_mb() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory() / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_memory_is_reported() {
        // Any running process uses more than zero memory.
        let mb = process_memory_mb();
        assert!(mb.is_some());
    }
}
