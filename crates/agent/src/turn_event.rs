//! Turn-level streaming events.
//!
//! `TurnEvent` wraps provider-level stream chunks into higher-level events
//! that the gateway relays to clients over the WebSocket:
//! - `chunk`       — partial text token from the model
//! - `tool_call`   — the model is invoking a tool
//! - `tool_result` — tool execution completed
//! - `done`        — the turn is complete
//! - `error`       — a terminal error occurred

use serde::{Deserialize, Serialize};

use midwire_core::provider::Usage;

/// Events emitted by the orchestrator during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    /// The model is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The turn is complete — final metadata.
    Done {
        full_text: String,
        usage: Option<Usage>,
        rounds: u32,
        tool_calls_made: usize,
    },

    /// A terminal error occurred mid-turn.
    Error { message: String },
}

impl TurnEvent {
    /// Wire event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = TurnEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = TurnEvent::Done {
            full_text: "answer".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            rounds: 2,
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""rounds":2"#));
    }

    #[test]
    fn terminal_events() {
        assert!(
            TurnEvent::Done {
                full_text: String::new(),
                usage: None,
                rounds: 1,
                tool_calls_made: 0
            }
            .is_terminal()
        );
        assert!(
            TurnEvent::Error {
                message: "boom".into()
            }
            .is_terminal()
        );
        assert!(
            !TurnEvent::Chunk {
                content: "x".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: TurnEvent = serde_json::from_str(json).unwrap();
        match event {
            TurnEvent::Chunk { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
