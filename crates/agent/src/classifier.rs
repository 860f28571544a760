//! Recall classification — does this turn need cross-session memory?
//!
//! The classifier is a deterministic rule set over the turn's text. The
//! one failure mode it is built to avoid: matching broad interrogative
//! forms ("who is X", "what is X") that fire on general-knowledge
//! questions. A positive classification requires an explicit
//! personal-reference signal — a possessive pronoun, a reference to
//! uploaded content, or recall framing ("previously", "do you remember")
//! about content absent from the current turn.
//!
//! Policy data (trigger phrases, exclusions, query stop-prefixes) lives in
//! `ClassifierPolicy`, separate from the control flow, so it can be tuned
//! without touching orchestration logic.

use serde::{Deserialize, Serialize};

/// The classifier's verdict for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentationDecision {
    /// No memory lookup; pass context through unchanged.
    Skip,
    /// Search semantic memory with the given query.
    Search(String),
}

/// Trigger phrases and query-extraction data for the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Possessive pronouns that mark a personal question ("my", "our").
    pub possessive_markers: Vec<String>,

    /// Phrases that frame the question around earlier conversations.
    pub recall_markers: Vec<String>,

    /// Phrases that reference previously uploaded content.
    pub upload_markers: Vec<String>,

    /// Interrogative prefixes stripped when building the search query.
    pub stop_prefixes: Vec<String>,

    /// Filler words dropped from the search query.
    pub stop_words: Vec<String>,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            possessive_markers: ["my", "mine", "our"].map(String::from).to_vec(),
            recall_markers: [
                "previously",
                "earlier",
                "last time",
                "before",
                "we discussed",
                "we talked about",
                "i told you",
                "i mentioned",
                "i said",
                "you said",
                "do you remember",
                "do you recall",
                "remind me",
            ]
            .map(String::from)
            .to_vec(),
            upload_markers: [
                "i uploaded",
                "i sent you",
                "i shared",
                "the document i",
                "the file i",
                "the pdf i",
                "that document",
                "that file",
                "that pdf",
            ]
            .map(String::from)
            .to_vec(),
            stop_prefixes: [
                "what is",
                "what's",
                "what are",
                "what was",
                "what did",
                "who is",
                "who was",
                "where is",
                "where did",
                "when did",
                "how did",
                "tell me",
                "do you know",
                "can you tell me",
            ]
            .map(String::from)
            .to_vec(),
            stop_words: ["my", "mine", "our", "the", "a", "an", "is", "was", "please"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Deterministic recall classifier.
pub struct RecallClassifier {
    policy: ClassifierPolicy,
}

impl RecallClassifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    /// Classify a turn's text as `Skip` or `Search(query)`.
    pub fn classify(&self, text: &str) -> AugmentationDecision {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return AugmentationDecision::Skip;
        }

        let has_signal = self.has_possessive(&normalized)
            || contains_phrase(&normalized, &self.policy.recall_markers)
            || contains_phrase(&normalized, &self.policy.upload_markers);

        if !has_signal {
            return AugmentationDecision::Skip;
        }

        AugmentationDecision::Search(self.extract_query(&normalized))
    }

    /// Possessive pronouns match as whole words only — "mystery" is not
    /// a personal reference.
    fn has_possessive(&self, normalized: &str) -> bool {
        normalized
            .split_whitespace()
            .any(|word| self.policy.possessive_markers.iter().any(|m| m == word))
    }

    /// Build the search query: strip one interrogative prefix, then drop
    /// filler words. Falls back to the full text when nothing survives.
    fn extract_query(&self, normalized: &str) -> String {
        let mut rest = normalized;
        for prefix in &self.policy.stop_prefixes {
            if let Some(stripped) = rest.strip_prefix(prefix.as_str()) {
                rest = stripped.trim_start();
                break;
            }
        }

        let query: Vec<&str> = rest
            .split_whitespace()
            .filter(|word| !self.policy.stop_words.iter().any(|s| s == word))
            .collect();

        if query.is_empty() {
            normalized.to_string()
        } else {
            query.join(" ")
        }
    }
}

impl Default for RecallClassifier {
    fn default() -> Self {
        Self::new(ClassifierPolicy::default())
    }
}

/// Lowercase and strip punctuation, collapsing whitespace.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_phrase(normalized: &str, phrases: &[String]) -> bool {
    // Pad so phrase boundaries align with word boundaries.
    let padded = format!(" {normalized} ");
    phrases
        .iter()
        .any(|p| padded.contains(&format!(" {p} ")) || normalized.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> AugmentationDecision {
        RecallClassifier::default().classify(text)
    }

    #[test]
    fn general_knowledge_questions_skip() {
        // Broad interrogatives without a personal signal must not trigger.
        let negatives = [
            "who is elon musk",
            "What is the capital of France?",
            "what is photosynthesis",
            "tell me about the roman empire",
            "how did world war 2 end",
            "who was marie curie",
            "what are black holes",
            "explain quantum computing",
            "there is a mystery here", // "my" inside a word is not a signal
        ];
        for text in negatives {
            assert_eq!(classify(text), AugmentationDecision::Skip, "text: {text}");
        }
    }

    #[test]
    fn personal_questions_search() {
        let positives = [
            "what is my favorite animal",
            "What's my dog's name?",
            "do you remember what we discussed",
            "summarize the document I uploaded",
            "what did I tell you about my job",
            "remind me what I said earlier",
            "what was in that pdf",
        ];
        for text in positives {
            assert!(
                matches!(classify(text), AugmentationDecision::Search(_)),
                "text: {text}"
            );
        }
    }

    #[test]
    fn query_extraction_strips_interrogative_and_possessive() {
        match classify("what is my favorite animal") {
            AugmentationDecision::Search(query) => assert_eq!(query, "favorite animal"),
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn query_extraction_falls_back_to_full_text() {
        // Everything is filler — the query falls back to the whole text.
        match classify("my") {
            AugmentationDecision::Search(query) => assert_eq!(query, "my"),
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn empty_text_skips() {
        assert_eq!(classify(""), AugmentationDecision::Skip);
        assert_eq!(classify("   "), AugmentationDecision::Skip);
    }

    #[test]
    fn policy_is_tunable_without_code_changes() {
        let mut policy = ClassifierPolicy::default();
        policy.recall_markers.push("as we agreed".into());
        let classifier = RecallClassifier::new(policy);

        assert!(matches!(
            classifier.classify("proceed as we agreed on the budget"),
            AugmentationDecision::Search(_)
        ));
    }
}
