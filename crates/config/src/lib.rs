//! Configuration for the note reader
//!
//! Settings are loaded from an optional TOML file plus `NOTE_READER_`-prefixed
//! environment overrides, with serde defaults for every field so an empty
//! configuration is always valid.

pub mod settings;

pub use settings::{
    ChunkFailurePolicy, ChunkerSettings, GenerationSettings, ObservabilitySettings, Settings,
    StorageSettings, VoiceSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
