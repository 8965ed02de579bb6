//! Synthesizer engine boundary
//!
//! The engine is a black box behind the [`Synthesizer`] trait: text in, PCM
//! audio out, with a per-block callback as the sole mid-synthesis
//! cancellation mechanism. Handles are expensive to construct (model load),
//! which is why the pool prewarms them; a handle is used for one chunk and
//! then dropped.

mod tone;
#[cfg(feature = "onnx")]
mod vits;

pub use tone::{ToneFactory, ToneSynthesizer};
#[cfg(feature = "onnx")]
pub use vits::{VitsFactory, VitsSynthesizer};

use note_reader_core::PcmAudio;

use crate::PipelineError;

/// Decision returned from the per-block synthesis callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisControl {
    /// Keep generating
    Continue,
    /// Stop generating; the engine returns the audio produced so far
    Stop,
}

/// A loaded voice model ready to synthesize.
///
/// Synthesis blocks the calling thread for the duration of one chunk and
/// must never be invoked concurrently; the pool enforces a hand-off.
pub trait Synthesizer: Send {
    /// Voice model id this handle was loaded for
    fn voice(&self) -> &str;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Synthesize one chunk of text.
    ///
    /// `on_block` is invoked repeatedly with each produced sample block;
    /// returning [`SynthesisControl::Stop`] aborts generation within one
    /// block and the audio produced so far is returned.
    fn synthesize(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
        on_block: &mut dyn FnMut(&[f32]) -> SynthesisControl,
    ) -> Result<PcmAudio, PipelineError>;
}

/// Constructs synthesizer handles for a voice model id.
///
/// Loading is slow (reads model weights); the pool calls this off the serial
/// lane to prewarm the next handle.
pub trait SynthesizerFactory: Send + Sync {
    fn load(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError>;
}
