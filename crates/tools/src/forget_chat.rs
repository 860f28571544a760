//! Forget-chat tool — lets the model act on memory-deletion requests.
//!
//! Bridges the tools system with the semantic-memory collaborator: when a
//! user asks the assistant to forget a conversation, the model calls this
//! tool and the chat's indexed entries are removed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use midwire_core::error::ToolError;
use midwire_core::memory::SemanticMemory;
use midwire_core::tool::{Tool, ToolResult};

/// A tool that deletes a chat's entries from semantic memory.
pub struct ForgetChatTool {
    memory: Arc<dyn SemanticMemory>,
}

impl ForgetChatTool {
    pub fn new(memory: Arc<dyn SemanticMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ForgetChatTool {
    fn name(&self) -> &str {
        "forget_chat"
    }

    fn description(&self) -> &str {
        "Delete everything remembered from a specific past conversation. Use only when the user explicitly asks to forget or delete a conversation's stored content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "The identity whose memory to modify"
                },
                "chat_id": {
                    "type": "string",
                    "description": "The conversation whose stored content to delete"
                }
            },
            "required": ["user_id", "chat_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let user_id = arguments["user_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'user_id' argument".into()))?;
        let chat_id = arguments["chat_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'chat_id' argument".into()))?;

        match self.memory.delete_chat(user_id, chat_id).await {
            Ok(removed) => {
                info!(chat_id = %chat_id, removed, "Deleted chat entries from semantic memory");
                Ok(ToolResult {
                    call_id: String::new(),
                    success: true,
                    output: format!("Removed {removed} remembered entries from that conversation."),
                    data: None,
                })
            }
            Err(e) => Ok(ToolResult::error(
                String::new(),
                format!("Could not delete remembered content: {e}"),
            )),
        }
    }
}
