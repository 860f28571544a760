//! No-op backend — for deployments that run without semantic memory.

use async_trait::async_trait;

use midwire_core::error::MemoryError;
use midwire_core::memory::{MemoryHit, SemanticMemory};

/// A backend that stores nothing and finds nothing.
pub struct NoopBackend;

#[async_trait]
impl SemanticMemory for NoopBackend {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(
        &self,
        _identity: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(vec![])
    }

    async fn store(
        &self,
        _identity: &str,
        _chat_id: &str,
        _content: &str,
    ) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn delete_chat(&self, _identity: &str, _chat_id: &str) -> Result<usize, MemoryError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_finds_nothing() {
        let mem = NoopBackend;
        mem.store("u", "c", "content").await.unwrap();
        let hits = mem.search("u", "content", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(mem.delete_chat("u", "c").await.unwrap(), 0);
    }
}
