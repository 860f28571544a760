//! In-memory chat store — useful for testing and ephemeral deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use midwire_core::error::StoreError;
use midwire_core::message::Message;
use midwire_core::store::ChatStore;

type ChatKey = (String, String); // (identity, chat_id)

/// A chat store backed by a HashMap.
pub struct InMemoryStore {
    chats: Arc<RwLock<HashMap<ChatKey, Vec<Message>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chats: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        identity: &str,
        chat_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let mut chats = self.chats.write().await;
        chats
            .entry((identity.to_string(), chat_id.to_string()))
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn history(
        &self,
        identity: &str,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let chats = self.chats.read().await;
        let Some(messages) = chats.get(&(identity.to_string(), chat_id.to_string())) else {
            return Ok(vec![]);
        };
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn delete_chat(&self, identity: &str, chat_id: &str) -> Result<bool, StoreError> {
        let mut chats = self.chats.write().await;
        Ok(chats
            .remove(&(identity.to_string(), chat_id.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_history() {
        let store = InMemoryStore::new();
        store.append("u", "c", &Message::user("one")).await.unwrap();
        store
            .append("u", "c", &Message::assistant("two"))
            .await
            .unwrap();

        let history = store.history("u", "c", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "one");
    }

    #[tokio::test]
    async fn history_limit_keeps_newest() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            store
                .append("u", "c", &Message::user(format!("m{i}")))
                .await
                .unwrap();
        }
        let history = store.history("u", "c", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m2");
    }

    #[tokio::test]
    async fn delete_chat() {
        let store = InMemoryStore::new();
        store.append("u", "c", &Message::user("x")).await.unwrap();
        assert!(store.delete_chat("u", "c").await.unwrap());
        assert!(!store.delete_chat("u", "c").await.unwrap());
    }
}
