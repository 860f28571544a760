//! In-memory backend — useful for testing and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use midwire_core::error::MemoryError;
use midwire_core::memory::{MemoryHit, SemanticMemory};

/// A stored entry, scoped to one identity.
#[derive(Debug, Clone)]
struct Entry {
    chat_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

/// An in-memory backend that stores entries per identity.
///
/// Relevance is keyword overlap — enough to exercise the augmentation
/// pipeline end-to-end without a vector index.
pub struct InMemoryBackend {
    entries: Arc<RwLock<HashMap<String, Vec<Entry>>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Keyword-overlap relevance score between a query and content.
    fn score(query: &str, content: &str) -> f32 {
        let content_lower = content.to_lowercase();
        let terms: Vec<&str> = query
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        let hits = terms
            .iter()
            .filter(|t| content_lower.contains(&t.to_lowercase()))
            .count();
        hits as f32 / terms.len() as f32
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticMemory for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        identity: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let entries = self.entries.read().await;
        let Some(owned) = entries.get(identity) else {
            return Ok(vec![]);
        };

        let mut results: Vec<MemoryHit> = owned
            .iter()
            .filter_map(|e| {
                let score = Self::score(query, &e.content);
                (score > 0.0).then(|| MemoryHit {
                    content: e.content.clone(),
                    source_chat_id: e.chat_id.clone(),
                    timestamp: e.created_at,
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn store(
        &self,
        identity: &str,
        chat_id: &str,
        content: &str,
    ) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        entries.entry(identity.to_string()).or_default().push(Entry {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn delete_chat(&self, identity: &str, chat_id: &str) -> Result<usize, MemoryError> {
        let mut entries = self.entries.write().await;
        let Some(owned) = entries.get_mut(identity) else {
            return Ok(0);
        };
        let before = owned.len();
        owned.retain(|e| e.chat_id != chat_id);
        Ok(before - owned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_search() {
        let mem = InMemoryBackend::new();
        mem.store("user-1", "chat-1", "My favorite animal is a dog")
            .await
            .unwrap();
        mem.store("user-1", "chat-2", "The weather in Tokyo was sunny")
            .await
            .unwrap();

        let hits = mem.search("user-1", "favorite animal", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("dog"));
        assert_eq!(hits[0].source_chat_id, "chat-1");
    }

    #[tokio::test]
    async fn search_is_scoped_to_identity() {
        let mem = InMemoryBackend::new();
        mem.store("user-1", "chat-1", "My favorite animal is a dog")
            .await
            .unwrap();

        let hits = mem.search("user-2", "favorite animal", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_respects_limit_and_ranking() {
        let mem = InMemoryBackend::new();
        mem.store("u", "c1", "rust is great").await.unwrap();
        mem.store("u", "c2", "rust programming in rust is great rust")
            .await
            .unwrap();
        mem.store("u", "c3", "unrelated entry about cooking")
            .await
            .unwrap();

        let hits = mem.search("u", "rust programming", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_chat_id, "c2");
    }

    #[tokio::test]
    async fn delete_chat_removes_only_that_chat() {
        let mem = InMemoryBackend::new();
        mem.store("u", "c1", "entry one").await.unwrap();
        mem.store("u", "c1", "entry two").await.unwrap();
        mem.store("u", "c2", "entry three").await.unwrap();

        let removed = mem.delete_chat("u", "c1").await.unwrap();
        assert_eq!(removed, 2);

        let hits = mem.search("u", "entry three", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_chat_is_noop() {
        let mem = InMemoryBackend::new();
        let removed = mem.delete_chat("u", "missing").await.unwrap();
        assert_eq!(removed, 0);
    }
}
