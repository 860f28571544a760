//! Semantic memory backends for Midwire.
//!
//! The pipeline only depends on the `SemanticMemory` trait from
//! `midwire-core`; embedding generation and index maintenance are the
//! collaborator's internals. This crate ships:
//! - `InMemoryBackend` — keyword-scored retrieval, per-identity scoping
//! - `NoopBackend` — a no-op for deployments without memory

pub mod in_memory;
pub mod noop;

pub use in_memory::InMemoryBackend;
pub use noop::NoopBackend;

use std::sync::Arc;

use midwire_core::SemanticMemory;

/// Build the configured semantic memory backend.
pub fn build_from_config(backend: &str) -> Arc<dyn SemanticMemory> {
    match backend {
        "none" => Arc::new(NoopBackend),
        _ => Arc::new(InMemoryBackend::new()),
    }
}
