//! Main settings module

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Storage layout configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Active voice configuration
    #[serde(default)]
    pub voice: VoiceSettings,

    /// Text chunker configuration
    #[serde(default)]
    pub chunker: ChunkerSettings,

    /// Generation run configuration
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("NOTE_READER").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.5..=2.0).contains(&self.voice.speed) {
            return Err(ConfigError::InvalidValue {
                field: "voice.speed".to_string(),
                message: "speed must be between 0.5 and 2.0".to_string(),
            });
        }
        if !(0.5..=1.5).contains(&self.voice.pitch) {
            return Err(ConfigError::InvalidValue {
                field: "voice.pitch".to_string(),
                message: "pitch must be between 0.5 and 1.5".to_string(),
            });
        }
        if self.voice.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "voice.model".to_string(),
                message: "model id must not be empty".to_string(),
            });
        }
        if self.chunker.read_buffer_bytes < 8 {
            return Err(ConfigError::InvalidValue {
                field: "chunker.read_buffer_bytes".to_string(),
                message: "read buffer too small (minimum 8 bytes)".to_string(),
            });
        }
        if self.chunker.opening_word_limits.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chunker.opening_word_limits".to_string(),
                message: "at least one opening word limit is required".to_string(),
            });
        }
        let mut previous = 0usize;
        for (i, &limit) in self.chunker.opening_word_limits.iter().enumerate() {
            if limit <= previous {
                return Err(ConfigError::InvalidValue {
                    field: format!("chunker.opening_word_limits[{i}]"),
                    message: "limits must be strictly increasing and non-zero".to_string(),
                });
            }
            previous = limit;
        }
        if self.chunker.max_words < previous {
            return Err(ConfigError::InvalidValue {
                field: "chunker.max_words".to_string(),
                message: "steady-state cap must be at least the last opening limit".to_string(),
            });
        }
        if self.generation.name_char_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generation.name_char_limit".to_string(),
                message: "name character limit must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Storage layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Application-support root directory
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> String {
    "./data".to_string()
}

/// Active voice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Voice model id
    #[serde(default = "default_model")]
    pub model: String,

    /// Speaker id within the model
    #[serde(default)]
    pub speaker_id: u32,

    /// Speaking rate (1.0 = normal)
    #[serde(default = "default_unity")]
    pub speed: f32,

    /// Pitch factor (1.0 = unity)
    #[serde(default = "default_unity")]
    pub pitch: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            speaker_id: 0,
            speed: default_unity(),
            pitch: default_unity(),
        }
    }
}

fn default_model() -> String {
    "amy".to_string()
}
fn default_unity() -> f32 {
    1.0
}

/// Text chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerSettings {
    /// Read window size in bytes
    #[serde(default = "default_read_buffer")]
    pub read_buffer_bytes: usize,

    /// Word caps for the opening chunks, in chunk-index order
    #[serde(default = "default_opening_limits")]
    pub opening_word_limits: Vec<usize>,

    /// Word cap for every chunk past the opening schedule
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            read_buffer_bytes: default_read_buffer(),
            opening_word_limits: default_opening_limits(),
            max_words: default_max_words(),
        }
    }
}

fn default_read_buffer() -> usize {
    4096
}
fn default_opening_limits() -> Vec<usize> {
    vec![50, 100]
}
fn default_max_words() -> usize {
    300
}

/// What to do when a single chunk fails to synthesize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFailurePolicy {
    /// Cancel the run and surface the error; no artifact is produced
    #[default]
    Abort,
    /// Log, drop that chunk's audio, and continue with the rest of the run
    Continue,
}

/// Generation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Per-chunk failure policy
    #[serde(default)]
    pub on_chunk_failure: ChunkFailurePolicy,

    /// Grace period after a stop request before stragglers are force-cleared
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Character budget for names derived from the source text
    #[serde(default = "default_name_chars")]
    pub name_char_limit: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            on_chunk_failure: ChunkFailurePolicy::default(),
            settle_ms: default_settle_ms(),
            name_char_limit: default_name_chars(),
        }
    }
}

fn default_settle_ms() -> u64 {
    100
}
fn default_name_chars() -> usize {
    25
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Log filter, e.g. "info" or "note_reader_pipeline=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::new();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.voice.model, "amy");
        assert_eq!(settings.chunker.opening_word_limits, vec![50, 100]);
        assert_eq!(settings.chunker.max_words, 300);
        assert_eq!(settings.generation.settle_ms, 100);
    }

    #[test]
    fn test_rejects_out_of_range_pitch() {
        let mut settings = Settings::new();
        settings.voice.pitch = 3.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_non_increasing_limits() {
        let mut settings = Settings::new();
        settings.chunker.opening_word_limits = vec![50, 50];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
[voice]
model = "kristin"
speed = 1.2

[generation]
on_chunk_failure = "continue"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.voice.model, "kristin");
        assert!((settings.voice.speed - 1.2).abs() < 1e-6);
        assert_eq!(
            settings.generation.on_chunk_failure,
            ChunkFailurePolicy::Continue
        );
        // untouched sections keep their defaults
        assert_eq!(settings.chunker.read_buffer_bytes, 4096);
    }
}
