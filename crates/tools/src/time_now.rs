//! Current time tool.

use async_trait::async_trait;
use chrono::Utc;

use midwire_core::error::ToolError;
use midwire_core::tool::{Tool, ToolResult};

pub struct TimeNowTool;

#[async_trait]
impl Tool for TimeNowTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC, optionally shifted by a fixed offset in hours."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Hours to shift from UTC, e.g. -5 for New York in winter (default 0)",
                    "default": 0
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let offset = arguments["utc_offset_hours"].as_i64().unwrap_or(0);
        if !(-12..=14).contains(&offset) {
            return Ok(ToolResult::error(
                String::new(),
                format!("UTC offset {offset} is out of range (-12..=14)"),
            ));
        }

        let now = Utc::now() + chrono::Duration::hours(offset);
        let output = serde_json::json!({
            "iso8601": now.to_rfc3339(),
            "utc_offset_hours": offset,
        });

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: output.to_string(),
            data: Some(output),
        })
    }
}
