//! Persistent chat store backends for Midwire.
//!
//! The pipeline depends only on the `ChatStore` trait from `midwire-core`:
//! append messages, load history, delete chats. This crate ships the
//! SQLite implementation used in production and an in-memory one for
//! tests and ephemeral deployments.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;
