//! The turn pipeline — the heart of Midwire.
//!
//! Each accepted turn flows through two stages:
//!
//! 1. **Context Augmenter** — decides whether the turn needs cross-session
//!    memory, queries the semantic-memory collaborator when it does, and
//!    builds the effective context (system instructions + injected blocks
//!    + prior messages + the user message).
//! 2. **Tool Orchestrator** — drives the model over that context: streams
//!    text as it arrives, intercepts tool-call responses, validates and
//!    executes the tools, feeds results back, and repeats up to a bounded
//!    number of rounds.
//!
//! The loop continues until the model responds with text only (no tool
//! calls), the round ceiling is reached, or the turn is cancelled.

pub mod augment;
pub mod classifier;
pub mod orchestrator;
pub mod turn_event;

pub use augment::{ContextAugmenter, EffectiveContext};
pub use classifier::{AugmentationDecision, ClassifierPolicy, RecallClassifier};
pub use orchestrator::{OrchestratorSettings, ToolOrchestrator};
pub use turn_event::TurnEvent;
