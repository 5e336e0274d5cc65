use async_trait::async_trait;

use super::metadata::{detect_technologies, infer_project_type, infer_service_type, token_text};
use super::{Classification, Classifier, ContextResult, ConversationTurn};

/// How many history turns the classifier looks at.
pub(crate) const CLASSIFIER_HISTORY_TURNS: usize = 3;

const INTENTS: &[(&[&str], &str)] = &[
    (&["price", "pricing", "cost", "costs", "budget", "quote", "rate", "rates"], "pricing"),
    (&["timeline", "deadline", "how long", "when", "schedule"], "timeline"),
    (&["hire", "hiring", "contact", "meeting", "call", "book"], "engagement"),
];

/// Classification from keyword tables, no network round trip.
///
/// The current utterance decides first; recent history only fills in a
/// project or service type the utterance does not mention.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, query: &str, history: &[ConversationTurn]) -> Classification {
        let query_tokens = token_text(query);
        let recent: Vec<String> = history
            .iter()
            .rev()
            .take(CLASSIFIER_HISTORY_TURNS)
            .map(|turn| token_text(&turn.text))
            .collect();

        let project_type = infer_project_type(&query_tokens)
            .or_else(|| recent.iter().find_map(|t| infer_project_type(t)))
            .map(str::to_string);
        let service_type = infer_service_type(&query_tokens)
            .or_else(|| recent.iter().find_map(|t| infer_service_type(t)))
            .map(str::to_string);

        let mut topics = detect_technologies(&query_tokens);
        for tokens in &recent {
            for topic in detect_technologies(tokens) {
                if !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }

        let intent = INTENTS
            .iter()
            .find(|(keywords, _)| {
                keywords
                    .iter()
                    .any(|k| query_tokens.contains(&token_text(k)))
            })
            .map(|(_, intent)| (*intent).to_string())
            .unwrap_or_else(|| Classification::default().intent);

        Classification {
            project_type,
            service_type,
            topics,
            intent,
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> ContextResult<Classification> {
        Ok(self.classify_text(query, history))
    }
}
