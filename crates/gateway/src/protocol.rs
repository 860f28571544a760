//! The WebSocket event contract.
//!
//! Bidirectional JSON events, tagged by `type` in kebab-case:
//! - Client → Server: `send-message`, `delete-chat`
//! - Server → Client: `message-response`, `typing`, `rate-limit-info`,
//!   `error`

use serde::{Deserialize, Serialize};

use midwire_core::message::{Attachment, Message};

/// Events the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
    DeleteChat(DeleteChatPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub chat_id: String,

    /// The user's message text.
    pub message: String,

    /// Prior conversation context, oldest first.
    #[serde(default)]
    pub chat_history: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// The caller's identity; empty means "use the connection identity".
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChatPayload {
    pub chat_id: String,

    #[serde(default)]
    pub user_id: String,
}

/// Events the server sends to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    MessageResponse(MessageResponsePayload),
    Typing(TypingPayload),
    RateLimitInfo(RateLimitInfoPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponsePayload {
    pub chat_id: String,

    /// One chunk of response text (empty on the completion marker).
    pub message: String,

    /// True exactly once per turn, on the last chunk.
    pub is_complete: bool,

    /// The assembled response, present only when `is_complete` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub is_typing: bool,
}

/// Per-window counters, minute and hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowValues {
    pub minute: u64,
    pub hour: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfoPayload {
    pub remaining: WindowValues,
    pub limit: WindowValues,
    /// Epoch milliseconds at which each window resets.
    pub reset_at: WindowValues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Seconds until retry is worthwhile (rate-limit rejections only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_deserializes_from_wire_format() {
        let json = r#"{
            "type": "send-message",
            "chatId": "chat-1",
            "message": "hello",
            "chatHistory": [
                {"role": "user", "content": "earlier"},
                {"role": "assistant", "content": "reply"}
            ],
            "userId": "user-1"
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage(payload) => {
                assert_eq!(payload.chat_id, "chat-1");
                assert_eq!(payload.message, "hello");
                assert_eq!(payload.chat_history.len(), 2);
                assert_eq!(payload.user_id, "user-1");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn delete_chat_deserializes() {
        let json = r#"{"type":"delete-chat","chatId":"c1","userId":"u1"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ClientEvent::DeleteChat(p) if p.chat_id == "c1"));
    }

    #[test]
    fn message_response_serializes_with_tag() {
        let event = ServerEvent::MessageResponse(MessageResponsePayload {
            chat_id: "c1".into(),
            message: "chunk".into(),
            is_complete: false,
            full_response: None,
            attachments: vec![],
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"message-response""#));
        assert!(json.contains(r#""chatId":"c1""#));
        assert!(json.contains(r#""isComplete":false"#));
        assert!(!json.contains("fullResponse")); // absent until completion
    }

    #[test]
    fn completion_marker_carries_full_response() {
        let event = ServerEvent::MessageResponse(MessageResponsePayload {
            chat_id: "c1".into(),
            message: String::new(),
            is_complete: true,
            full_response: Some("the whole answer".into()),
            attachments: vec![],
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""isComplete":true"#));
        assert!(json.contains("the whole answer"));
    }

    #[test]
    fn rate_limit_info_serializes() {
        let event = ServerEvent::RateLimitInfo(RateLimitInfoPayload {
            remaining: WindowValues { minute: 59, hour: 599 },
            limit: WindowValues { minute: 60, hour: 600 },
            reset_at: WindowValues {
                minute: 1_700_000_060_000,
                hour: 1_700_003_600_000,
            },
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"rate-limit-info""#));
        assert!(json.contains(r#""resetAt""#));
    }

    #[test]
    fn typing_event_round_trips() {
        let event = ServerEvent::Typing(TypingPayload {
            chat_id: "c1".into(),
            is_typing: true,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"typing""#));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerEvent::Typing(p) if p.is_typing));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let json = r#"{"type":"mystery-event","chatId":"c1"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }
}
