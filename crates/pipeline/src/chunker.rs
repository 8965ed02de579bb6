//! Streaming text chunker
//!
//! Converts an unbounded byte stream into bounded, speakable chunks so
//! synthesis can start before the whole text has been read. The stream is
//! consumed in fixed-size windows; undecodable trailing bytes of one window
//! are carried into the next so multi-byte UTF-8 characters are never
//! corrupted at a window boundary. A word split across two windows is
//! likewise carried over whole.
//!
//! Boundary rules: the first chunk closes at the first sentence terminator
//! regardless of word count (or at 50 words without one), the second at 100
//! words, and every later chunk at 300 words, always preferring a terminator
//! once the running cap is reached.

use std::io::Read;

use note_reader_core::TextChunk;
use note_reader_config::ChunkerSettings;
use tokio_util::sync::CancellationToken;

/// Chunker configuration
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Read window size in bytes
    pub read_buffer_bytes: usize,
    /// Word caps for the opening chunks, in chunk-index order
    pub opening_word_limits: Vec<usize>,
    /// Word cap for every chunk past the opening schedule
    pub max_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 4096,
            opening_word_limits: vec![50, 100],
            max_words: 300,
        }
    }
}

impl From<&ChunkerSettings> for ChunkerConfig {
    fn from(settings: &ChunkerSettings) -> Self {
        Self {
            read_buffer_bytes: settings.read_buffer_bytes,
            opening_word_limits: settings.opening_word_limits.clone(),
            max_words: settings.max_words,
        }
    }
}

/// Why a parse ended without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// Cancellation was requested mid-parse
    Cancelled,
    /// The byte stream could not be decoded as UTF-8 text
    DecodeError,
}

/// Events emitted by the chunker, ending with exactly one terminal event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkerEvent {
    /// A completed chunk, in strictly increasing sequence order
    Chunk(TextChunk),
    /// The stream ended normally after emitting `total_chunks` chunks
    Finished { total_chunks: usize },
    /// The parse stopped early; `word_count` words had been consumed
    Terminated {
        word_count: usize,
        reason: TerminateReason,
    },
}

/// Chunk-close decision rules. Pure; no I/O.
#[derive(Debug, Clone)]
pub struct BoundaryPolicy {
    opening_word_limits: Vec<usize>,
    max_words: usize,
}

impl BoundaryPolicy {
    pub fn new(opening_word_limits: Vec<usize>, max_words: usize) -> Self {
        Self {
            opening_word_limits,
            max_words,
        }
    }

    /// Running word cap for the chunk at `chunk_index`
    pub fn max_words(&self, chunk_index: usize) -> usize {
        self.opening_word_limits
            .get(chunk_index)
            .copied()
            .unwrap_or(self.max_words)
    }

    /// Whether the current chunk should close after accepting a word.
    ///
    /// The first chunk closes at any sentence terminator; later chunks close
    /// at a terminator only once the running cap is reached, and hard-close
    /// at the cap when no terminator appears.
    pub fn should_close(
        &self,
        chunk_index: usize,
        words_in_chunk: usize,
        has_terminator: bool,
    ) -> bool {
        let cap = self.max_words(chunk_index);
        if has_terminator && (chunk_index == 0 || words_in_chunk >= cap) {
            return true;
        }
        words_in_chunk >= cap
    }
}

impl From<&ChunkerConfig> for BoundaryPolicy {
    fn from(config: &ChunkerConfig) -> Self {
        Self::new(config.opening_word_limits.clone(), config.max_words)
    }
}

/// Whether a token ends a sentence.
///
/// This is a substring check, not a suffix match: `"etc."` and `"no?!"`
/// match, but so does `"3.5kg"`. Tokens with interior punctuation counting
/// as terminators is long-standing behavior that downstream chunk sizes
/// depend on.
pub fn has_sentence_terminator(token: &str) -> bool {
    token.contains(['.', '!', '?'])
}

/// Per-parse mutable state, discarded when the parse ends
#[derive(Debug, Default)]
struct ParseState {
    current_chunk: String,
    words_in_chunk: usize,
    chunk_index: usize,
    total_chunks: usize,
    total_words: usize,
}

/// Streaming text chunker for one parse run
pub struct StreamingChunker {
    config: ChunkerConfig,
    policy: BoundaryPolicy,
    cancel: CancellationToken,
}

impl StreamingChunker {
    /// Create a chunker. Cancelling the token stops the parse at the next
    /// word boundary.
    pub fn new(config: ChunkerConfig, cancel: CancellationToken) -> Self {
        let policy = BoundaryPolicy::from(&config);
        Self {
            config,
            policy,
            cancel,
        }
    }

    /// Consume the reader to completion, emitting chunk events followed by
    /// exactly one terminal event. Blocking; run it on a blocking lane.
    pub fn run<R: Read>(&self, mut reader: R, emit: &mut dyn FnMut(ChunkerEvent)) {
        let mut state = ParseState::default();
        let mut window = vec![0u8; self.config.read_buffer_bytes.max(8)];
        // Bytes not yet decoded (may end mid-codepoint)
        let mut pending: Vec<u8> = Vec::new();
        // A word cut off at the end of the previous window
        let mut partial_word = String::new();

        loop {
            if self.cancel.is_cancelled() {
                emit(ChunkerEvent::Terminated {
                    word_count: state.total_words,
                    reason: TerminateReason::Cancelled,
                });
                return;
            }

            let read = match reader.read(&mut window) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "chunker failed to read source stream");
                    emit(ChunkerEvent::Terminated {
                        word_count: state.total_words,
                        reason: TerminateReason::DecodeError,
                    });
                    return;
                }
            };
            pending.extend_from_slice(&window[..read]);

            let valid = match std::str::from_utf8(&pending) {
                Ok(_) => pending.len(),
                Err(e) => {
                    let valid = e.valid_up_to();
                    // A truncated multi-byte sequence is at most 3 bytes; more
                    // pending bytes with no valid prefix means garbage input.
                    if valid == 0 && pending.len() >= 4 {
                        emit(ChunkerEvent::Terminated {
                            word_count: state.total_words,
                            reason: TerminateReason::DecodeError,
                        });
                        return;
                    }
                    valid
                }
            };
            if valid == 0 {
                continue;
            }

            let decoded = match std::str::from_utf8(&pending[..valid]) {
                Ok(s) => s,
                Err(_) => continue,
            };

            let mut text = String::with_capacity(partial_word.len() + decoded.len());
            text.push_str(&partial_word);
            partial_word.clear();
            text.push_str(decoded);

            let ends_mid_word = !text.ends_with(|c: char| c.is_whitespace());
            let mut tokens: Vec<&str> = text.split_whitespace().collect();
            if ends_mid_word {
                if let Some(last) = tokens.pop() {
                    partial_word = last.to_string();
                }
            }

            for token in tokens {
                if self.cancel.is_cancelled() {
                    emit(ChunkerEvent::Terminated {
                        word_count: state.total_words,
                        reason: TerminateReason::Cancelled,
                    });
                    return;
                }
                self.accept_word(token, &mut state, emit);
            }
            pending.drain(..valid);
        }

        if self.cancel.is_cancelled() {
            emit(ChunkerEvent::Terminated {
                word_count: state.total_words,
                reason: TerminateReason::Cancelled,
            });
            return;
        }
        if !pending.is_empty() {
            // Stream ended inside a multi-byte sequence
            emit(ChunkerEvent::Terminated {
                word_count: state.total_words,
                reason: TerminateReason::DecodeError,
            });
            return;
        }

        if !partial_word.is_empty() {
            let word = std::mem::take(&mut partial_word);
            self.accept_word(&word, &mut state, emit);
        }

        // A final partial chunk is always emitted on a normal end of stream
        let trailing = state.current_chunk.trim();
        if !trailing.is_empty() {
            let chunk = TextChunk::new(state.total_chunks, trailing);
            state.total_chunks += 1;
            emit(ChunkerEvent::Chunk(chunk));
        }

        emit(ChunkerEvent::Finished {
            total_chunks: state.total_chunks,
        });
    }

    fn accept_word(&self, word: &str, state: &mut ParseState, emit: &mut dyn FnMut(ChunkerEvent)) {
        state.current_chunk.push_str(word);
        state.current_chunk.push(' ');
        state.words_in_chunk += 1;
        state.total_words += 1;

        let has_terminator = has_sentence_terminator(word);
        if self
            .policy
            .should_close(state.chunk_index, state.words_in_chunk, has_terminator)
        {
            let text = state.current_chunk.trim().to_string();
            state.current_chunk.clear();
            state.words_in_chunk = 0;
            let chunk = TextChunk::new(state.total_chunks, text);
            state.total_chunks += 1;
            state.chunk_index += 1;
            emit(ChunkerEvent::Chunk(chunk));
        }
    }
}
