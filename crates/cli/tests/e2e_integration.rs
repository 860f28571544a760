//! End-to-end integration tests for the Midwire pipeline.
//!
//! These exercise the full turn flow — classification, memory
//! augmentation, the tool-calling loop, and ordered streaming — against
//! scripted providers, plus the admission-control properties at the
//! gateway edge.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use midwire_agent::{
    ContextAugmenter, OrchestratorSettings, RecallClassifier, ToolOrchestrator, TurnEvent,
};
use midwire_core::error::ProviderError;
use midwire_core::event::EventBus;
use midwire_core::memory::SemanticMemory;
use midwire_core::message::{Message, MessageToolCall, Role};
use midwire_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use midwire_core::turn::{SessionId, Turn};
use midwire_gateway::rate_limit::{Decision, RateLimiter};
use midwire_memory::InMemoryBackend;
use midwire_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence and
/// records every request it receives.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            requests: std::sync::Mutex::new(Vec::new()),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![text_response(response)])
    }

    fn tool_then_text(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![tool_response(tool_calls), text_response(answer)])
    }

    fn first_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap()[0].clone()
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let resp = responses[*count].clone();
        *count += 1;
        Ok(resp)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "e2e-model".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: None,
        model: "e2e-model".into(),
    }
}

// ── Pipeline helpers ─────────────────────────────────────────────────────

fn augmenter(memory: Arc<dyn SemanticMemory>) -> ContextAugmenter {
    ContextAugmenter::new(
        memory,
        RecallClassifier::default(),
        Arc::new(EventBus::default()),
    )
}

fn orchestrator(provider: Arc<dyn Provider>, memory: Arc<dyn SemanticMemory>) -> ToolOrchestrator {
    ToolOrchestrator::new(
        provider,
        Arc::new(default_registry(&[], memory)),
        OrchestratorSettings {
            model: "e2e-model".into(),
            max_rounds: 4,
            tool_timeout: Duration::from_secs(1),
            ..OrchestratorSettings::default()
        },
        Arc::new(EventBus::default()),
    )
}

fn turn(text: &str) -> Turn {
    Turn::new(SessionId::new(), "chat-1", "user-1", text, vec![])
}

async fn run_turn(
    provider: Arc<ScriptedProvider>,
    memory: Arc<InMemoryBackend>,
    text: &str,
) -> Vec<TurnEvent> {
    let context = augmenter(memory.clone()).augment(&turn(text)).await;
    let mut rx = orchestrator(provider, memory)
        .run(context, Arc::new(AtomicBool::new(false)));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn final_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Done { full_text, .. } => Some(full_text.clone()),
            _ => None,
        })
        .expect("turn did not complete")
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn general_knowledge_question_skips_memory_entirely() {
    let provider = Arc::new(ScriptedProvider::text(
        "Elon Musk is a technology entrepreneur.",
    ));
    let memory = Arc::new(InMemoryBackend::new());

    // Seed memory that must NOT be consulted or injected.
    memory
        .store("user-1", "old", "User said: I like dogs")
        .await
        .unwrap();

    let events = run_turn(provider.clone(), memory, "who is elon musk").await;

    assert!(final_text(&events).contains("Elon Musk"));

    // The model received no cross-session blocks and no fallback notice.
    let request = provider.first_request();
    let system = &request.messages[0].content;
    assert_eq!(request.messages[0].role, Role::System);
    assert!(!system.contains("other conversation sessions"));
    assert!(!system.contains("general knowledge and the current conversation"));
    assert!(!system.contains("I like dogs"));
}

#[tokio::test]
async fn personal_question_gets_memory_injected_verbatim() {
    let provider = Arc::new(ScriptedProvider::text("Your favorite animal is a dog."));
    let memory = Arc::new(InMemoryBackend::new());
    memory
        .store("user-1", "old-chat", "I like dogs")
        .await
        .unwrap();

    let events = run_turn(provider.clone(), memory, "what is my favorite animal").await;

    assert!(final_text(&events).contains("dog"));

    let request = provider.first_request();
    let system = &request.messages[0].content;
    assert!(system.contains("Information found in other conversation sessions"));
    assert!(system.contains("I like dogs"));
}

#[tokio::test]
async fn personal_question_with_empty_memory_gets_fallback_notice() {
    let provider = Arc::new(ScriptedProvider::text(
        "I don't have that stored, but generally people love dogs!",
    ));
    let memory = Arc::new(InMemoryBackend::new());

    let events = run_turn(provider.clone(), memory, "what is my favorite animal").await;
    assert!(matches!(events.last().unwrap(), TurnEvent::Done { .. }));

    let request = provider.first_request();
    let system = &request.messages[0].content;
    assert!(system.contains("found nothing relevant"));
    assert!(system.contains("general knowledge"));
    // The recall-priority instruction never appears without content.
    assert!(!system.contains("Prioritize this previous-conversation"));
}

#[tokio::test]
async fn failed_weather_lookup_ends_conversationally() {
    // get_weather("Atlantis") fails inside the tool; the model explains.
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![MessageToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: r#"{"location":"Atlantis"}"#.into(),
        }],
        "I couldn't find weather data for Atlantis — it may not be a real place.",
    ));
    let memory = Arc::new(InMemoryBackend::new());

    let events = run_turn(provider.clone(), memory, "weather in atlantis please").await;

    // The tool ran, failed, and fed an error result back to the model.
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::ToolResult { name, success, .. } if name == "get_weather" && !success
    )));

    // The turn still completed as a conversational answer.
    assert!(final_text(&events).contains("Atlantis"));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn tool_loop_feeds_results_back_to_the_model() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![MessageToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: r#"{"location":"Tokyo"}"#.into(),
        }],
        "It's mild in Tokyo right now.",
    ));
    let memory = Arc::new(InMemoryBackend::new());

    let events = run_turn(provider.clone(), memory, "weather in tokyo").await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::ToolResult { success, .. } if *success
    )));

    // The second model request contains the tool result message.
    let second = provider.requests.lock().unwrap()[1].clone();
    assert!(second.messages.iter().any(|m| m.role == Role::Tool));
}

#[tokio::test]
async fn every_turn_delivers_exactly_one_terminal_event() {
    for (provider, text) in [
        (Arc::new(ScriptedProvider::text("plain answer")), "hi there"),
        (
            Arc::new(ScriptedProvider::tool_then_text(
                vec![MessageToolCall {
                    id: "c".into(),
                    name: "get_current_time".into(),
                    arguments: "{}".into(),
                }],
                "it is late",
            )),
            "what time is it",
        ),
    ] {
        let events = run_turn(provider, Arc::new(InMemoryBackend::new()), text).await;
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "turn '{text}'");
        assert!(events.last().unwrap().is_terminal());
    }
}

// ── Admission control ────────────────────────────────────────────────────

#[test]
fn sixty_first_request_in_a_minute_is_rejected() {
    let limiter = RateLimiter::with_windows(
        60,
        600,
        64,
        Duration::from_secs(60),
        Duration::from_secs(3600),
    );

    for _ in 0..60 {
        assert!(limiter.admit("client-1").is_allowed());
    }

    match limiter.admit("client-1") {
        Decision::Rejected {
            retry_after_secs, ..
        } => {
            assert!((1..=60).contains(&retry_after_secs));
        }
        Decision::Allowed(_) => panic!("61st request should be rejected"),
    }
}
