//! Session table — the Connection Manager's state.
//!
//! One `SessionHandle` per live WebSocket connection: identity, the
//! outbound event sender, the in-flight-turn flag, and the cancellation
//! flag. Sessions are created on connect and destroyed on disconnect;
//! delivery to a closed or absent session is a no-op, not an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use midwire_core::error::SessionError;
use midwire_core::turn::SessionId;

use crate::protocol::ServerEvent;

/// Outbound buffer per session. Delivery suspends on backpressure, which
/// keeps per-session chunk order intact.
const OUTBOUND_BUFFER: usize = 64;

/// Live state for one connection.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub identity: String,
    outbound: mpsc::Sender<ServerEvent>,
    in_flight: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Claim the one-in-flight-turn slot.
    ///
    /// Fails without mutating anything when a turn is already running.
    pub fn begin_turn(&self) -> Result<(), SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::TurnInFlight);
        }
        Ok(())
    }

    /// Release the in-flight slot after a turn finishes.
    pub fn end_turn(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Whether a turn is currently in flight.
    pub fn turn_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The cancellation flag shared with this session's pipeline tasks.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Deliver an event to this session's connection.
    ///
    /// Returns false when the connection is gone; callers treat that as a
    /// no-op, not an error.
    pub async fn send(&self, event: ServerEvent) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.outbound.send(event).await.is_ok()
    }
}

/// Owns the mapping from session identity to active session state.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session for a new connection.
    ///
    /// Returns the handle and the receiver half of its outbound channel
    /// (drained by the connection's writer task).
    pub async fn register(&self, identity: impl Into<String>) -> (SessionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let handle = SessionHandle {
            id: SessionId::new(),
            identity: identity.into(),
            outbound: tx,
            in_flight: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        self.sessions
            .write()
            .await
            .insert(handle.id.clone(), handle.clone());

        info!(session_id = %handle.id, "Session registered");
        (handle, rx)
    }

    /// Destroy a session on disconnect.
    ///
    /// Sets the cancellation flag first so an in-flight pipeline discards
    /// any output it produces from here on.
    pub async fn unregister(&self, id: &SessionId) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(handle) = removed {
            handle.cancelled.store(true, Ordering::SeqCst);
            debug!(session_id = %id, "Session unregistered");
        }
    }

    /// Look up a live session.
    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Deliver an event to a session; absent sessions are a no-op.
    pub async fn send_to(&self, id: &SessionId, event: ServerEvent) {
        if let Some(handle) = self.get(id).await {
            handle.send(event).await;
        }
    }

    /// Number of live sessions.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
