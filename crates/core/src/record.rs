//! Library record types and the library sink boundary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

/// A generated audio entry in the library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRecord {
    /// Database id; 0 until saved
    pub id: i64,

    /// Display name, derived from the leading words of the source text
    pub name: String,

    /// Path of the stitched WAV file, relative to the storage root
    pub file_path: String,

    /// When the audio was generated
    pub date_generated: DateTime<Utc>,

    /// Voice model id used for this run
    pub model: String,

    /// Pitch factor (1.0 = unity)
    pub pitch: f64,

    /// Speaking speed (1.0 = normal)
    pub speed: f64,

    /// Linked imported document, if the run came from one
    pub document_id: Option<i64>,

    /// Plain-text snapshot path, relative to the storage root
    pub text_file_path: Option<String>,

    /// Duration of the stitched audio in whole seconds
    pub duration_seconds: i64,

    /// Favorite flag
    pub is_favorite: bool,
}

/// A named voice preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Database id; 0 until saved
    pub id: i64,
    /// Profile name
    pub name: String,
    /// Pitch factor
    pub pitch: f64,
    /// Speaking speed
    pub speed: f64,
    /// Voice model id
    pub model: String,
}

impl VoiceProfile {
    /// The profile created on first use
    pub fn default_profile() -> Self {
        Self {
            id: 0,
            name: "Default".to_string(),
            pitch: 1.0,
            speed: 1.0,
            model: "amy".to_string(),
        }
    }
}

/// An imported source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Database id; 0 until saved
    pub id: i64,
    /// Display name
    pub name: String,
    /// When the document was imported
    pub upload_date: DateTime<Utc>,
    /// Path relative to the storage root
    pub file_path: String,
    /// File kind, e.g. "pdf" or "txt"
    pub file_type: String,
}

/// Where the orchestrator hands the finished library record.
///
/// Called exactly once per successful run, after stitching. Cancelled and
/// failed runs never reach this boundary.
#[async_trait]
pub trait LibrarySink: Send + Sync {
    /// Persist the record, returning its assigned id
    async fn record_artifact(&self, record: AudioRecord) -> Result<i64>;
}

/// Derive a display name from the leading words of the source text.
///
/// Whitespace runs collapse to single spaces. Words are appended while they
/// fit within `max_chars`; the first word that would overflow is truncated on
/// a grapheme boundary and suffixed with "...". Effectively empty text yields
/// "Audio".
pub fn derive_audio_name(text: &str, max_chars: usize) -> String {
    let mut result = String::new();
    let mut result_chars = 0usize;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        let needed = if result.is_empty() {
            word_chars
        } else {
            result_chars + 1 + word_chars
        };

        if needed > max_chars {
            let remaining = max_chars.saturating_sub(result_chars);
            if remaining > 0 {
                let prefix: String = word.graphemes(true).take(remaining).collect();
                if !result.is_empty() {
                    result.push(' ');
                }
                result.push_str(&prefix);
                result.push_str("...");
            }
            break;
        }

        if !result.is_empty() {
            result.push(' ');
            result_chars += 1;
        }
        result.push_str(word);
        result_chars += word_chars;
    }

    if result.is_empty() {
        "Audio".to_string()
    } else {
        result
    }
}
