//! Streaming text-to-speech generation pipeline
//!
//! This crate provides the core generation pipeline:
//! - Incremental text chunking with word-count boundary rules
//! - Serial chunk synthesis with a prewarmed synthesizer pool
//! - Optional offline pitch shifting
//! - Per-chunk WAV persistence and ordered playback hand-off
//! - Stitching of chunk files into one durable artifact

pub mod chunker;
pub mod engine;
pub mod orchestrator;
pub mod pitch;
pub mod playback;
pub mod pool;
pub mod stitcher;

// Chunker exports
pub use chunker::{
    has_sentence_terminator, BoundaryPolicy, ChunkerConfig, ChunkerEvent, StreamingChunker,
    TerminateReason,
};

// Engine exports
pub use engine::{Synthesizer, SynthesizerFactory, SynthesisControl, ToneFactory, ToneSynthesizer};
#[cfg(feature = "onnx")]
pub use engine::{VitsFactory, VitsSynthesizer};

// Pool exports
pub use pool::SynthesizerPool;

// Pitch exports
pub use pitch::PitchShifter;

// Stitcher exports
pub use stitcher::{AudioArtifact, AudioStitcher};

// Playback exports
pub use playback::{NullSink, PlaybackQueue, PlaybackSink};

// Orchestrator exports
pub use orchestrator::{
    GenerationEvent, GenerationOptions, GeneratorConfig, GeneratorState, SpeechGenerator,
    VoiceSnapshot,
};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("a generation run is already in progress")]
    Busy,

    #[error("chunker error: {0}")]
    Chunker(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("pitch shift error: {0}")]
    Pitch(String),

    #[error("stitch error: {0}")]
    Stitch(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("library error: {0}")]
    Library(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl From<PipelineError> for note_reader_core::Error {
    fn from(err: PipelineError) -> Self {
        note_reader_core::Error::Pipeline(err.to_string())
    }
}
