//! Deterministic tone engine for tests and model-free operation
//!
//! Produces a fixed-frequency tone whose duration scales with the text
//! length, emitted block by block so cancellation behaves exactly like a
//! real engine.

use note_reader_core::PcmAudio;

use super::{SynthesisControl, Synthesizer, SynthesizerFactory};
use crate::PipelineError;

/// Samples handed to the callback per block
const BLOCK_SAMPLES: usize = 1024;

/// Seconds of audio per character at unit speed
const SECONDS_PER_CHAR: f32 = 0.04;

/// Tone-generating synthesizer stand-in
pub struct ToneSynthesizer {
    voice: String,
    sample_rate: u32,
}

impl ToneSynthesizer {
    pub fn new(voice: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            voice: voice.into(),
            sample_rate,
        }
    }
}

impl Synthesizer for ToneSynthesizer {
    fn voice(&self) -> &str {
        &self.voice
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
        on_block: &mut dyn FnMut(&[f32]) -> SynthesisControl,
    ) -> Result<PcmAudio, PipelineError> {
        if speed <= 0.0 {
            return Err(PipelineError::Synthesis(format!(
                "invalid speed {speed}"
            )));
        }

        let chars = text.chars().count().max(1);
        let total = ((chars as f32 * SECONDS_PER_CHAR / speed) * self.sample_rate as f32) as usize;
        let frequency = 220.0 + speaker_id as f32 * 20.0;

        let mut samples = Vec::with_capacity(total);
        let mut produced = 0usize;
        while produced < total {
            let n = BLOCK_SAMPLES.min(total - produced);
            let block: Vec<f32> = (0..n)
                .map(|i| {
                    let t = (produced + i) as f32 / self.sample_rate as f32;
                    (t * frequency * std::f32::consts::TAU).sin() * 0.2
                })
                .collect();
            samples.extend_from_slice(&block);
            produced += n;
            if on_block(&block) == SynthesisControl::Stop {
                break;
            }
        }

        Ok(PcmAudio::new(samples, self.sample_rate))
    }
}

/// Factory producing [`ToneSynthesizer`] handles
pub struct ToneFactory {
    sample_rate: u32,
}

impl ToneFactory {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for ToneFactory {
    fn default() -> Self {
        Self::new(22050)
    }
}

impl SynthesizerFactory for ToneFactory {
    fn load(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError> {
        if voice.trim().is_empty() {
            return Err(PipelineError::Model("empty voice model id".to_string()));
        }
        Ok(Box::new(ToneSynthesizer::new(voice, self.sample_rate)))
    }
}
