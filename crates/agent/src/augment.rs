//! Context augmentation — building the effective context for a turn.
//!
//! Step 1: classify the turn as `Skip` or `Search(query)`.
//! Step 2: on `Search`, query the semantic-memory collaborator and inject
//! either a labeled cross-session block or an explicit
//! use-general-knowledge notice. The notice matters: without it the model
//! tends to refuse personal questions it cannot answer from memory.
//! Step 3: on `Skip`, pass prior messages through unchanged — no notice,
//! so the model is never told a search happened when it didn't.
//!
//! A memory timeout or error is treated identically to empty results and
//! never surfaces to the user.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use midwire_core::event::{DomainEvent, EventBus};
use midwire_core::memory::{MemoryHit, SemanticMemory};
use midwire_core::message::{Message, Role};
use midwire_core::turn::Turn;

use crate::classifier::{AugmentationDecision, RecallClassifier};

/// The base system instructions sent with every turn.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and \
concisely. When a tool call fails, explain the failure to the user in plain language \
instead of retrying indefinitely.";

/// Header for injected cross-session content.
const RECALL_HEADER: &str = "Information found in other conversation sessions:";

/// Instruction paired with injected content — never emitted on its own.
const RECALL_PRIORITY_NOTICE: &str = "Prioritize this previous-conversation information \
when it answers the user's question.";

/// Emitted when a search ran and found nothing (or failed). Without this
/// the model refuses to answer personal-sounding questions.
const GENERAL_KNOWLEDGE_NOTICE: &str = "A search of the user's previous conversations \
was performed and found nothing relevant. Answer from your general knowledge and the \
current conversation; do not refuse on the grounds of missing personal context, and do \
not mention the search unless asked.";

/// The fully assembled context handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct EffectiveContext {
    pub chat_id: String,
    pub identity: String,
    pub messages: Vec<Message>,
}

/// Decides on and executes memory augmentation for each turn.
pub struct ContextAugmenter {
    memory: Arc<dyn SemanticMemory>,
    classifier: RecallClassifier,
    system_prompt: String,
    recall_limit: usize,
    search_timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl ContextAugmenter {
    pub fn new(
        memory: Arc<dyn SemanticMemory>,
        classifier: RecallClassifier,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            memory,
            classifier,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            recall_limit: 5,
            search_timeout: Duration::from_secs(3),
            event_bus,
        }
    }

    /// Override the base system instructions.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum memory hits injected per turn.
    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    /// Set the semantic-memory search timeout.
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Build the effective context for a turn.
    pub async fn augment(&self, turn: &Turn) -> EffectiveContext {
        let mut system = self.system_prompt.clone();

        match self.classifier.classify(&turn.user_text) {
            AugmentationDecision::Skip => {
                debug!(chat_id = %turn.chat_id, "No memory lookup for this turn");
            }
            AugmentationDecision::Search(query) => {
                let hits = self.search_memory(&turn.identity, &query).await;
                system.push_str("\n\n");
                system.push_str(&format_recall_block(&hits));

                self.event_bus.publish(DomainEvent::MemoryAccessed {
                    operation: "search".into(),
                    count: hits.len(),
                    timestamp: Utc::now(),
                });
            }
        }

        let mut messages = Vec::with_capacity(turn.prior_messages.len() + 2);
        messages.push(Message::system(system));

        // Prior context passes through as-is; tool/system roles from the
        // client are dropped rather than trusted.
        messages.extend(
            turn.prior_messages
                .iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .cloned(),
        );

        messages.push(build_user_message(turn));

        EffectiveContext {
            chat_id: turn.chat_id.clone(),
            identity: turn.identity.clone(),
            messages,
        }
    }

    /// Search semantic memory; a timeout or error degrades to no hits.
    async fn search_memory(&self, identity: &str, query: &str) -> Vec<MemoryHit> {
        match timeout(
            self.search_timeout,
            self.memory.search(identity, query, self.recall_limit),
        )
        .await
        {
            Ok(Ok(hits)) => {
                debug!(count = hits.len(), query = %query, "Memory search completed");
                hits
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Memory search failed, continuing without recall");
                vec![]
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.search_timeout.as_secs(),
                    "Memory search timed out, continuing without recall"
                );
                vec![]
            }
        }
    }
}

/// Format the injected block for a search that ran.
///
/// Non-empty hits get the labeled content plus the priority instruction;
/// empty hits get the explicit general-knowledge fallback. The priority
/// instruction is never emitted without content to prioritize.
fn format_recall_block(hits: &[MemoryHit]) -> String {
    if hits.is_empty() {
        return GENERAL_KNOWLEDGE_NOTICE.to_string();
    }

    let mut block = String::from(RECALL_HEADER);
    for hit in hits {
        block.push_str("\n- ");
        block.push_str(&hit.content);
    }
    block.push_str("\n\n");
    block.push_str(RECALL_PRIORITY_NOTICE);
    block
}

/// Build the inbound user message, folding extracted attachment text into
/// the content so the model can see it.
fn build_user_message(turn: &Turn) -> Message {
    let mut content = turn.user_text.clone();

    for attachment in &turn.attachments {
        if let Some(text) = &attachment.extracted_text {
            let label = attachment.filename.as_deref().unwrap_or("attachment");
            content.push_str(&format!("\n\n[Content of {label}]\n{text}"));
        }
    }

    Message::user(content).with_attachments(turn.attachments.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use midwire_core::error::MemoryError;
    use midwire_core::turn::SessionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory mock that counts searches and returns a fixed result.
    struct CountingMemory {
        searches: AtomicUsize,
        hits: Vec<MemoryHit>,
    }

    impl CountingMemory {
        fn with_hits(hits: Vec<MemoryHit>) -> Self {
            Self {
                searches: AtomicUsize::new(0),
                hits,
            }
        }

        fn empty() -> Self {
            Self::with_hits(vec![])
        }
    }

    #[async_trait]
    impl SemanticMemory for CountingMemory {
        fn name(&self) -> &str {
            "counting"
        }

        async fn search(
            &self,
            _identity: &str,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<MemoryHit>, MemoryError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }

        async fn store(&self, _: &str, _: &str, _: &str) -> Result<(), MemoryError> {
            Ok(())
        }

        async fn delete_chat(&self, _: &str, _: &str) -> Result<usize, MemoryError> {
            Ok(0)
        }
    }

    /// Memory mock that always fails.
    struct BrokenMemory;

    #[async_trait]
    impl SemanticMemory for BrokenMemory {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(
            &self,
            _: &str,
            _: &str,
            _: usize,
        ) -> Result<Vec<MemoryHit>, MemoryError> {
            Err(MemoryError::Unreachable("connection refused".into()))
        }

        async fn store(&self, _: &str, _: &str, _: &str) -> Result<(), MemoryError> {
            Ok(())
        }

        async fn delete_chat(&self, _: &str, _: &str) -> Result<usize, MemoryError> {
            Ok(0)
        }
    }

    /// Memory mock that hangs past any reasonable timeout.
    struct SlowMemory;

    #[async_trait]
    impl SemanticMemory for SlowMemory {
        fn name(&self) -> &str {
            "slow"
        }

        async fn search(
            &self,
            _: &str,
            _: &str,
            _: usize,
        ) -> Result<Vec<MemoryHit>, MemoryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        async fn store(&self, _: &str, _: &str, _: &str) -> Result<(), MemoryError> {
            Ok(())
        }

        async fn delete_chat(&self, _: &str, _: &str) -> Result<usize, MemoryError> {
            Ok(0)
        }
    }

    fn turn(text: &str) -> Turn {
        Turn::new(SessionId::new(), "chat-1", "user-1", text, vec![])
    }

    fn augmenter(memory: Arc<dyn SemanticMemory>) -> ContextAugmenter {
        ContextAugmenter::new(
            memory,
            RecallClassifier::default(),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn skip_makes_no_memory_call_and_no_notice() {
        let memory = Arc::new(CountingMemory::empty());
        let aug = augmenter(memory.clone());

        let ctx = aug.augment(&turn("who is elon musk")).await;

        assert_eq!(memory.searches.load(Ordering::SeqCst), 0);
        let system = &ctx.messages[0].content;
        assert!(!system.contains(RECALL_HEADER));
        assert!(!system.contains("general knowledge and the current conversation"));
    }

    #[tokio::test]
    async fn search_with_results_injects_content_verbatim() {
        let memory = Arc::new(CountingMemory::with_hits(vec![MemoryHit {
            content: "I like dogs".into(),
            source_chat_id: "old-chat".into(),
            timestamp: Utc::now(),
            score: 0.9,
        }]));
        let aug = augmenter(memory.clone());

        let ctx = aug.augment(&turn("what is my favorite animal")).await;

        assert_eq!(memory.searches.load(Ordering::SeqCst), 1);
        let system = &ctx.messages[0].content;
        assert!(system.contains("I like dogs"));
        assert!(system.contains(RECALL_HEADER));
        assert!(system.contains("Prioritize this previous-conversation"));
    }

    #[tokio::test]
    async fn search_with_no_results_injects_fallback_notice() {
        let aug = augmenter(Arc::new(CountingMemory::empty()));

        let ctx = aug.augment(&turn("what is my favorite animal")).await;

        let system = &ctx.messages[0].content;
        assert!(system.contains("found nothing relevant"));
        assert!(system.contains("general knowledge"));
        // The priority instruction never appears without content.
        assert!(!system.contains("Prioritize this previous-conversation"));
    }

    #[tokio::test]
    async fn memory_error_degrades_to_fallback_notice() {
        let aug = augmenter(Arc::new(BrokenMemory));

        let ctx = aug.augment(&turn("what did I say about my project")).await;

        let system = &ctx.messages[0].content;
        assert!(system.contains("general knowledge"));
    }

    #[tokio::test]
    async fn memory_timeout_degrades_to_fallback_notice() {
        let aug = augmenter(Arc::new(SlowMemory)).with_search_timeout(Duration::from_millis(20));

        let ctx = aug.augment(&turn("what is my favorite animal")).await;

        let system = &ctx.messages[0].content;
        assert!(system.contains("general knowledge"));
    }

    #[tokio::test]
    async fn prior_messages_pass_through_in_order() {
        let aug = augmenter(Arc::new(CountingMemory::empty()));
        let mut t = turn("and what about berlin");
        t.prior_messages = vec![
            Message::user("weather in paris?"),
            Message::assistant("Sunny, 22°C."),
            Message::system("client-injected instructions"), // dropped
        ];

        let ctx = aug.augment(&t).await;

        // system + 2 prior + user
        assert_eq!(ctx.messages.len(), 4);
        assert_eq!(ctx.messages[1].content, "weather in paris?");
        assert_eq!(ctx.messages[2].content, "Sunny, 22°C.");
        assert_eq!(ctx.messages[3].content, "and what about berlin");
    }

    #[tokio::test]
    async fn attachment_text_is_folded_into_user_message() {
        use midwire_core::message::{Attachment, AttachmentKind};

        let aug = augmenter(Arc::new(CountingMemory::empty()));
        let t = turn("summarize this").with_attachments(vec![Attachment {
            kind: AttachmentKind::Document,
            url: "file://report.pdf".into(),
            filename: Some("report.pdf".into()),
            mime_type: Some("application/pdf".into()),
            extracted_text: Some("Revenue grew 12%.".into()),
        }]);

        let ctx = aug.augment(&t).await;

        let user = ctx.messages.last().unwrap();
        assert!(user.content.contains("Revenue grew 12%."));
        assert!(user.content.contains("report.pdf"));
    }

    #[test]
    fn recall_block_pairs_priority_with_content_only() {
        let with_hits = format_recall_block(&[MemoryHit {
            content: "fact".into(),
            source_chat_id: "c".into(),
            timestamp: Utc::now(),
            score: 1.0,
        }]);
        assert!(with_hits.contains("Prioritize"));

        let empty = format_recall_block(&[]);
        assert!(!empty.contains("Prioritize"));
        assert!(empty.contains("general knowledge"));
    }
}
