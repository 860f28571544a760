//! Turn and session identity types.
//!
//! A `Turn` is one user message plus the model's full response cycle,
//! including any tool-call rounds. Turns are immutable once dispatched to
//! the orchestrator; cancellation supersedes a turn with a new one rather
//! than mutating it in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Attachment, Message};

/// Unique identifier for a client session (one WebSocket connection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One inbound user turn, snapshotted at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The session this turn belongs to
    pub session_id: SessionId,

    /// The chat this turn belongs to (one session may hold several chats)
    pub chat_id: String,

    /// The identity used for rate limiting and memory scoping
    pub identity: String,

    /// The user's message text
    pub user_text: String,

    /// Prior conversation context, insertion-ordered, never mutated
    pub prior_messages: Vec<Message>,

    /// Attachments on the inbound message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// When this turn was accepted
    pub started_at: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn for a session.
    pub fn new(
        session_id: SessionId,
        chat_id: impl Into<String>,
        identity: impl Into<String>,
        user_text: impl Into<String>,
        prior_messages: Vec<Message>,
    ) -> Self {
        Self {
            session_id,
            chat_id: chat_id.into(),
            identity: identity.into(),
            user_text: user_text.into(),
            prior_messages,
            attachments: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Attach files to this turn (builder style).
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}
