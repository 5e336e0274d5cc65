//! Session instruction composition.
//!
//! Appends ranked knowledge-base snippets and the classified user context to
//! the session's base instructions, dropping the lowest-ranked snippets until
//! the result fits the instruction budget.

use tracing::debug;

use super::{RetrievedContext, Snippet};

/// Default upper bound for a composed instruction string (100 KiB).
pub const DEFAULT_INSTRUCTION_BUDGET: usize = 100 * 1024;

const CONTEXT_HEADER: &str = "RELEVANT CONTEXT FROM KNOWLEDGE BASE:";

const GUIDANCE: &str = "Use the following relevant information from our knowledge base to provide a \
comprehensive and accurate response. Prioritize information with higher relevance scores. If the \
user is asking about specific services or projects, focus on those areas. Always provide specific \
details and examples when available.";

const CLOSING_DIRECTIVE: &str = "Remember to:
- Reference specific information from the knowledge base when relevant
- Provide detailed examples and case studies when available
- Mention specific services, technologies, or methodologies we offer
- Be conversational and helpful while being informative";

/// Deterministically merges base instructions with retrieved context.
#[derive(Debug, Clone)]
pub struct InstructionComposer {
    budget: usize,
}

impl Default for InstructionComposer {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTION_BUDGET)
    }
}

impl InstructionComposer {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Build the instruction string for the next turn.
    ///
    /// Empty context returns `base` unchanged. Otherwise snippets are kept in
    /// rank order while the result stays within the budget; if none fits the
    /// base is returned unchanged as well.
    pub fn compose(&self, base: &str, retrieved: &RetrievedContext) -> String {
        if retrieved.is_empty() {
            return base.to_string();
        }

        let user_context = serde_json::to_string(&retrieved.classification)
            .unwrap_or_else(|_| "{}".to_string());

        let mut kept = retrieved.snippets.len();
        while kept > 0 {
            let composed = render(base, &retrieved.snippets[..kept], &user_context);
            if composed.len() <= self.budget {
                if kept < retrieved.snippets.len() {
                    debug!(
                        kept,
                        dropped = retrieved.snippets.len() - kept,
                        "Instruction budget reached, dropping lowest-ranked snippets"
                    );
                }
                return composed;
            }
            kept -= 1;
        }

        debug!(budget = self.budget, "No snippet fits the instruction budget");
        base.to_string()
    }
}

fn render(base: &str, snippets: &[Snippet], user_context: &str) -> String {
    let documents = snippets
        .iter()
        .enumerate()
        .map(|(index, snippet)| {
            let mut block = format!(
                "[Document {}] (Relevance: {:.1}%)\n{}",
                index + 1,
                snippet.relevance * 100.0,
                snippet.text.trim()
            );
            for tag in &snippet.tags {
                block.push('\n');
                block.push_str(tag);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{base}\n\n{CONTEXT_HEADER}\n{documents}\n\nUSER CONTEXT: {user_context}\n\n{GUIDANCE}\n\n{CLOSING_DIRECTIVE}"
    )
}
