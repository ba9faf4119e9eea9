//! Grounding prompt assembly for retrieval-augmented answers.
//!
//! The prompt tells the generative model to answer only from the supplied
//! documents, to say so when the answer is not in them, and never to invent facts.
//! Each document contributes an independently truncated excerpt, so the context
//! block stays bounded no matter how long the stored texts are.

use crate::extract::truncate_chars;

/// Default per-document excerpt length, in characters.
pub const DEFAULT_CONTEXT_CHARS: usize = 2_000;

/// Instruction placed at the top of every grounded prompt.
pub const GROUNDING_INSTRUCTION: &str = "You are a careful assistant. Answer the question using only the reference documents below. \
If the documents do not contain the answer, say plainly that the information is not in the documents. \
Do not fabricate facts.";

/// One retrieved document as seen by the prompt builder.
#[derive(Debug, Clone, Copy)]
pub struct ContextPassage<'a> {
    pub source: &'a str,
    pub title: &'a str,
    pub text: &'a str,
}

/// Builds the prompt handed to the generative model.
#[derive(Debug, Clone)]
pub struct GroundingPromptBuilder {
    max_chars_per_document: usize,
}

impl Default for GroundingPromptBuilder {
    fn default() -> Self {
        Self {
            max_chars_per_document: DEFAULT_CONTEXT_CHARS,
        }
    }
}

impl GroundingPromptBuilder {
    pub fn new(max_chars_per_document: usize) -> Self {
        Self {
            max_chars_per_document,
        }
    }

    /// Render the reference-document block, numbering documents from 1. Each header
    /// carries the document title and its source path.
    pub fn context_block(&self, passages: &[ContextPassage<'_>]) -> String {
        let mut block = String::new();
        for (i, passage) in passages.iter().enumerate() {
            block.push_str(&format!(
                "\n--- Document {}: {} (Source: {}) ---\n{}\n",
                i + 1,
                passage.title,
                passage.source,
                truncate_chars(passage.text, self.max_chars_per_document)
            ));
        }
        block
    }

    /// Render the complete prompt for `question`.
    pub fn build(&self, question: &str, passages: &[ContextPassage<'_>]) -> String {
        format!(
            "{GROUNDING_INSTRUCTION}\n\n[Question]\n{}\n\n[Reference documents]\n{}\n[Answer]\n",
            question.trim(),
            self.context_block(passages)
        )
    }
}
