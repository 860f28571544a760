//! Streaming relay — ordered chunk delivery for one turn.
//!
//! Consumes the orchestrator's event stream and produces `StreamChunk`s in
//! generation order, marking the terminal chunk with `is_final = true`.
//! After the session is cancelled, remaining events are discarded rather
//! than delivered. Tool-call progress events are observability-only and
//! are not forwarded to clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use midwire_agent::TurnEvent;
use midwire_core::turn::SessionId;

/// One increment of model output bound for a client.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub session_id: SessionId,
    pub text: String,
    pub is_final: bool,
}

/// What a finished relay knows about its turn.
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// The assembled response (present on normal completion).
    pub full_response: Option<String>,
    /// Terminal error text (present when the turn aborted).
    pub error: Option<String>,
    /// Chunks actually handed to the session, final marker included.
    pub delivered: usize,
}

/// Relay one turn's events into ordered chunks.
///
/// Exactly one chunk with `is_final = true` is emitted per completed
/// turn, and it is the last one. An aborted turn (model error) emits no
/// final marker — the caller surfaces the error instead.
pub async fn relay_turn(
    session_id: SessionId,
    mut events: mpsc::Receiver<TurnEvent>,
    cancelled: Arc<AtomicBool>,
    sink: mpsc::Sender<StreamChunk>,
) -> RelayOutcome {
    let mut outcome = RelayOutcome::default();

    while let Some(event) = events.recv().await {
        if cancelled.load(Ordering::SeqCst) {
            // Dropping the receiver stops the producer at its next send;
            // everything already queued is discarded, not delivered.
            debug!(session_id = %session_id, "Session cancelled, discarding turn output");
            return outcome;
        }

        match event {
            TurnEvent::Chunk { content } => {
                let chunk = StreamChunk {
                    session_id: session_id.clone(),
                    text: content,
                    is_final: false,
                };
                if sink.send(chunk).await.is_err() {
                    return outcome;
                }
                outcome.delivered += 1;
            }
            TurnEvent::ToolCall { name, .. } => {
                debug!(session_id = %session_id, tool = %name, "Tool call in progress");
            }
            TurnEvent::ToolResult { name, success, .. } => {
                debug!(session_id = %session_id, tool = %name, success, "Tool call finished");
            }
            TurnEvent::Done { full_text, .. } => {
                let chunk = StreamChunk {
                    session_id: session_id.clone(),
                    text: String::new(),
                    is_final: true,
                };
                if sink.send(chunk).await.is_ok() {
                    outcome.delivered += 1;
                }
                outcome.full_response = Some(full_text);
                return outcome;
            }
            TurnEvent::Error { message } => {
                outcome.error = Some(message);
                return outcome;
            }
        }
    }

    outcome
}
