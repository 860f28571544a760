//! LLM backend clients for Midwire.
//!
//! The orchestrator talks to the model through the `Provider` trait from
//! `midwire-core`; this crate supplies the concrete OpenAI-compatible
//! client (chat completions with SSE streaming and tool calling).

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;

use midwire_config::ProviderConfig;
use midwire_core::Provider;

/// Build the configured provider.
pub fn build_from_config(config: &ProviderConfig) -> Arc<dyn Provider> {
    Arc::new(OpenAiCompatProvider::from_config(config))
}
