//! Core traits and types for the note reader
//!
//! This crate provides foundational types used across all other crates:
//! - PCM audio buffers with WAV I/O and resampling
//! - Text chunk types produced by the streaming chunker
//! - Library record types and the library sink trait
//! - Storage layout (on-device directory structure)
//! - Error types

pub mod audio;
pub mod chunk;
pub mod error;
pub mod record;
pub mod storage;

pub use audio::PcmAudio;
pub use chunk::TextChunk;
pub use error::{Error, Result};
pub use record::{derive_audio_name, AudioRecord, DocumentRecord, LibrarySink, VoiceProfile};
pub use storage::StorageLayout;
