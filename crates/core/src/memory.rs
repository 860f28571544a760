//! SemanticMemory trait — the contract with the cross-session memory
//! collaborator.
//!
//! The collaborator stores conversation content keyed by identity and
//! serves relevance-ranked retrieval over it. Embedding generation and
//! index maintenance are its internals; this trait is only the read/write
//! contract the pipeline needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A single retrieval hit from semantic memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    /// The stored content
    pub content: String,

    /// Which chat this content came from
    pub source_chat_id: String,

    /// When the content was stored
    pub timestamp: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

/// The semantic-memory collaborator contract.
///
/// Each `search` call is independent (not a continuation); results are
/// finite and ranked by relevance. All operations are scoped to an
/// identity — one user's memory is never visible to another.
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Search stored content for an identity, ranked by relevance.
    async fn search(
        &self,
        identity: &str,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryHit>, MemoryError>;

    /// Store a piece of conversation content for later retrieval.
    async fn store(
        &self,
        identity: &str,
        chat_id: &str,
        content: &str,
    ) -> std::result::Result<(), MemoryError>;

    /// Delete every indexed entry belonging to a chat. Returns the number
    /// of entries removed.
    async fn delete_chat(
        &self,
        identity: &str,
        chat_id: &str,
    ) -> std::result::Result<usize, MemoryError>;

    /// Health check — is the collaborator reachable?
    async fn health_check(&self) -> std::result::Result<bool, MemoryError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_hit_serialization() {
        let hit = MemoryHit {
            content: "I like dogs".into(),
            source_chat_id: "chat_7".into(),
            timestamp: Utc::now(),
            score: 0.92,
        };
        let json = serde_json::to_string(&hit).unwrap();
        assert!(json.contains("I like dogs"));
        assert!(json.contains("chat_7"));
    }
}
