//! The tool-calling orchestration loop.
//!
//! Each turn is a bounded state machine: send context + tool catalog to
//! the model, stream the response, and either forward text to the client
//! (terminal) or execute the requested tools and go again. The round
//! ceiling keeps a model that keeps asking for tools from looping forever.
//!
//! Cancellation is cooperative: the flag is checked at every
//! suspension-point resumption. A model or tool call already in flight
//! runs to completion, but its output is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use midwire_core::event::{DomainEvent, EventBus};
use midwire_core::message::Message;
use midwire_core::provider::{Provider, ProviderRequest, Usage};
use midwire_core::tool::{ToolCall, ToolRegistry, ToolResult};

use crate::augment::EffectiveContext;
use crate::turn_event::TurnEvent;

/// Text returned when the round ceiling is hit.
const ROUND_LIMIT_MESSAGE: &str = "I wasn't able to finish within the allowed number of \
tool-use steps. Here's what I have so far — please narrow the request and try again.";

/// Immutable per-process orchestrator settings, constructed once from
/// configuration and passed in explicitly.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Model name sent to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Max tokens per model response.
    pub max_tokens: Option<u32>,
    /// Maximum model rounds per turn (tool rounds + the final one).
    pub max_rounds: u32,
    /// Per-tool execution timeout.
    pub tool_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
            max_rounds: 5,
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives the model-invocation loop for one turn at a time.
pub struct ToolOrchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: OrchestratorSettings,
    event_bus: Arc<EventBus>,
}

impl ToolOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        settings: OrchestratorSettings,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
            event_bus,
        }
    }

    /// Run the loop for one turn.
    ///
    /// Returns a receiver of `TurnEvent`s, populated by a background task.
    /// The sequence is finite and not restartable — a new turn must be
    /// created to retry. After `cancelled` is set, no further events are
    /// emitted.
    pub fn run(
        &self,
        context: EffectiveContext,
        cancelled: Arc<AtomicBool>,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel::<TurnEvent>(128);

        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let settings = self.settings.clone();
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            run_loop(provider, tools, settings, event_bus, context, cancelled, tx).await;
        });

        rx
    }
}

async fn run_loop(
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: OrchestratorSettings,
    event_bus: Arc<EventBus>,
    context: EffectiveContext,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::Sender<TurnEvent>,
) {
    let tool_definitions = tools.definitions();
    let mut messages = context.messages;
    let mut full_text = String::new();
    let mut total_tool_calls = 0usize;
    let mut last_usage: Option<Usage> = None;
    let mut round = 0u32;

    info!(
        chat_id = %context.chat_id,
        model = %settings.model,
        max_rounds = settings.max_rounds,
        "Turn started"
    );

    loop {
        round += 1;
        if round > settings.max_rounds {
            warn!(
                chat_id = %context.chat_id,
                rounds = round - 1,
                "Round ceiling reached, forcing text response"
            );
            // Terminal text response, not an error: the user gets an
            // explanation, the session stays usable.
            full_text.push_str(ROUND_LIMIT_MESSAGE);
            let _ = tx
                .send(TurnEvent::Chunk {
                    content: ROUND_LIMIT_MESSAGE.to_string(),
                })
                .await;
            send_done(
                &tx,
                &event_bus,
                &context.chat_id,
                &settings.model,
                full_text,
                last_usage,
                round - 1,
                total_tool_calls,
            )
            .await;
            return;
        }

        if cancelled.load(Ordering::SeqCst) {
            debug!(chat_id = %context.chat_id, "Turn cancelled before round {round}");
            return;
        }

        debug!(chat_id = %context.chat_id, round, "Model round");

        let request = ProviderRequest {
            model: settings.model.clone(),
            messages: messages.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            tools: tool_definitions.clone(),
            stream: true,
        };

        // ── Stream the model response ──
        let mut stream = match provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(chat_id = %context.chat_id, error = %e, "Model request failed");
                event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "model_request".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                if !cancelled.load(Ordering::SeqCst) {
                    let _ = tx
                        .send(TurnEvent::Error {
                            message: format!("The model request failed: {e}"),
                        })
                        .await;
                }
                return;
            }
        };

        let mut round_text = String::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.recv().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    warn!(chat_id = %context.chat_id, error = %e, "Model stream interrupted");
                    if !cancelled.load(Ordering::SeqCst) {
                        let _ = tx
                            .send(TurnEvent::Error {
                                message: format!("The model stream was interrupted: {e}"),
                            })
                            .await;
                    }
                    return;
                }
            };

            if let Some(content) = &chunk.content
                && !content.is_empty()
            {
                round_text.push_str(content);
                full_text.push_str(content);
                if !cancelled.load(Ordering::SeqCst)
                    && tx
                        .send(TurnEvent::Chunk {
                            content: content.clone(),
                        })
                        .await
                        .is_err()
                {
                    return; // receiver dropped — session is gone
                }
            }

            if chunk.done {
                tool_calls = chunk.tool_calls;
                if chunk.usage.is_some() {
                    last_usage = chunk.usage;
                }
                break;
            }
        }

        if cancelled.load(Ordering::SeqCst) {
            debug!(chat_id = %context.chat_id, "Turn cancelled mid-round, discarding output");
            return;
        }

        // ── Terminal case: no tool calls ──
        if tool_calls.is_empty() {
            send_done(
                &tx,
                &event_bus,
                &context.chat_id,
                &settings.model,
                full_text,
                last_usage,
                round,
                total_tool_calls,
            )
            .await;
            return;
        }

        // ── Tool-call case: validate, execute, feed results back ──
        debug!(
            chat_id = %context.chat_id,
            tool_count = tool_calls.len(),
            "Executing tool calls"
        );

        let mut assistant = Message::assistant(&round_text);
        assistant.tool_calls = tool_calls.clone();
        messages.push(assistant);

        for tc in &tool_calls {
            total_tool_calls += 1;

            let arguments: serde_json::Value = match serde_json::from_str(&tc.arguments) {
                Ok(v) => v,
                Err(e) => serde_json::json!({ "_unparseable": e.to_string() }),
            };

            if !cancelled.load(Ordering::SeqCst) {
                let _ = tx
                    .send(TurnEvent::ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: arguments.clone(),
                    })
                    .await;
            }

            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };

            let start = std::time::Instant::now();
            let result = execute_tool(&tools, &call, settings.tool_timeout).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: tc.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });

            if !cancelled.load(Ordering::SeqCst) {
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        output: result.output.clone(),
                        success: result.success,
                    })
                    .await;
            }

            messages.push(Message::tool_result(&tc.id, &result.output));
        }

        // Loop back — the model sees the tool results and decides what to
        // do next.
    }
}

/// Execute one tool call, converting every failure mode into a structured
/// error result the model can explain. Nothing here aborts the turn.
async fn execute_tool(
    tools: &ToolRegistry,
    call: &ToolCall,
    tool_timeout: Duration,
) -> ToolResult {
    match tokio::time::timeout(tool_timeout, tools.execute(call)).await {
        Ok(Ok(mut result)) => {
            result.call_id = call.id.clone();
            result
        }
        Ok(Err(e)) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            ToolResult::error(&call.id, format!("Error: {e}"))
        }
        Err(_) => {
            warn!(
                tool = %call.name,
                timeout_secs = tool_timeout.as_secs(),
                "Tool execution timed out"
            );
            ToolResult::error(
                &call.id,
                format!(
                    "Error: tool '{}' timed out after {}s",
                    call.name,
                    tool_timeout.as_secs()
                ),
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn send_done(
    tx: &mpsc::Sender<TurnEvent>,
    event_bus: &EventBus,
    chat_id: &str,
    model: &str,
    full_text: String,
    usage: Option<Usage>,
    rounds: u32,
    tool_calls_made: usize,
) {
    event_bus.publish(DomainEvent::ResponseGenerated {
        chat_id: chat_id.to_string(),
        model: model.to_string(),
        tokens_used: usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
        rounds,
        timestamp: Utc::now(),
    });

    info!(chat_id = %chat_id, rounds, tool_calls_made, "Turn completed");

    let _ = tx
        .send(TurnEvent::Done {
            full_text,
            usage,
            rounds,
            tool_calls_made,
        })
        .await;
}
