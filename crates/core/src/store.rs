//! ChatStore trait — the read/write contract with the persistent chat
//! store.
//!
//! The relational schema and storage engine are the store's internals;
//! the pipeline only needs to append messages, load history, and delete
//! chats.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;

/// The persistent chat store contract.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append a message to a chat's history.
    async fn append(
        &self,
        identity: &str,
        chat_id: &str,
        message: &Message,
    ) -> std::result::Result<(), StoreError>;

    /// Load a chat's history, oldest first, up to `limit` messages.
    async fn history(
        &self,
        identity: &str,
        chat_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Delete a chat and its messages. Returns whether anything was
    /// removed.
    async fn delete_chat(
        &self,
        identity: &str,
        chat_id: &str,
    ) -> std::result::Result<bool, StoreError>;

    /// Health check — is the store reachable?
    async fn health_check(&self) -> std::result::Result<bool, StoreError> {
        Ok(true)
    }

    /// Close the store gracefully (flush, release file handles).
    async fn close(&self) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}
