//! Built-in tool implementations for Midwire.
//!
//! Tools are what the model reaches for mid-turn: web search, weather and
//! stock lookups, the current time, and semantic-memory deletion. External
//! lookups are deterministic stubs so the orchestration loop can be
//! exercised end-to-end without network access; production deployments
//! swap in live handlers behind the same declarations.

pub mod forget_chat;
pub mod stock_quote;
pub mod time_now;
pub mod weather_lookup;
pub mod web_search;

use std::sync::Arc;

use midwire_core::SemanticMemory;
use midwire_core::tool::ToolRegistry;

/// Create the default tool registry.
///
/// `enabled` filters the built-ins by name; an empty list enables all of
/// them. The `forget_chat` tool is wired to the semantic-memory
/// collaborator so the model can act on deletion requests.
pub fn default_registry(enabled: &[String], memory: Arc<dyn SemanticMemory>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let all: Vec<Box<dyn midwire_core::Tool>> = vec![
        Box::new(web_search::WebSearchTool),
        Box::new(weather_lookup::WeatherLookupTool),
        Box::new(stock_quote::StockQuoteTool),
        Box::new(time_now::TimeNowTool),
        Box::new(forget_chat::ForgetChatTool::new(memory)),
    ];

    for tool in all {
        if enabled.is_empty() || enabled.iter().any(|n| n == tool.name()) {
            registry.register(tool);
        }
    }

    registry
}
