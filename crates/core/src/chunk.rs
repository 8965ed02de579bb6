//! Text chunk types produced by the streaming chunker

use serde::{Deserialize, Serialize};

/// A bounded span of source text treated as one synthesis unit.
///
/// Chunks are emitted in strictly increasing `sequence_index` order and are
/// immutable once produced. The text is trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk within its run, starting at 0
    pub sequence_index: usize,

    /// The text to synthesize
    pub text: String,
}

impl TextChunk {
    /// Create a new chunk
    pub fn new(sequence_index: usize, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            text: text.into(),
        }
    }

    /// Number of whitespace-separated words in this chunk
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
