//! Offline pitch shifting
//!
//! Sample-rate-preserving pitch transposition for a whole PCM buffer:
//! the signal is transposed by resampling and relabeling at the original
//! rate, then a granular overlap-add time stretch restores the original
//! duration. Offline rendering only; runs inside the serial chunk job.

use note_reader_core::PcmAudio;

use crate::PipelineError;

/// Inputs shorter than this skip the overlap-add and use a nearest-sample
/// stretch instead
const MIN_OLA_INPUT: usize = 256;

/// Offline pitch shifter
#[derive(Debug, Clone)]
pub struct PitchShifter {
    frame_len: usize,
}

impl PitchShifter {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len: frame_len.max(64),
        }
    }

    /// Whether a pitch setting is close enough to unity to skip shifting
    pub fn is_unity(pitch: f32) -> bool {
        (pitch - 1.0).abs() < 1e-3
    }

    /// Transpose `audio` by `factor` (1.0 = unchanged, 2.0 = up an octave),
    /// preserving duration and sample rate.
    pub fn shift(&self, audio: &PcmAudio, factor: f32) -> Result<PcmAudio, PipelineError> {
        if !(0.25..=4.0).contains(&factor) {
            return Err(PipelineError::Pitch(format!(
                "pitch factor {factor} out of range"
            )));
        }
        if Self::is_unity(factor) || audio.is_empty() {
            return Ok(audio.clone());
        }

        // Transpose: fewer/more samples played back at the original rate
        // raise/lower the pitch and shorten/lengthen the clip by `factor`
        let virtual_rate = (audio.sample_rate as f64 / factor as f64).round() as u32;
        let transposed = audio
            .resample(virtual_rate)
            .map_err(|e| PipelineError::Pitch(e.to_string()))?;
        let transposed = PcmAudio::new(transposed.samples, audio.sample_rate);

        // Stretch time back by `factor` to restore the original duration
        let stretched = self.stretch(&transposed.samples, factor as f64);
        Ok(PcmAudio::new(stretched, audio.sample_rate))
    }

    /// Granular overlap-add time stretch by `factor` (output length is
    /// input length x factor). Hann-windowed grains, 75% synthesis overlap.
    fn stretch(&self, input: &[f32], factor: f64) -> Vec<f32> {
        let out_len = (input.len() as f64 * factor).round() as usize;
        if out_len == 0 {
            return Vec::new();
        }
        if input.len() < MIN_OLA_INPUT {
            return (0..out_len)
                .map(|i| {
                    let src = ((i as f64 / factor) as usize).min(input.len() - 1);
                    input[src]
                })
                .collect();
        }

        let frame = self.frame_len.min(input.len());
        let hop = (frame / 4).max(1);
        let window: Vec<f32> = (0..frame)
            .map(|i| {
                let phase = i as f32 / frame as f32;
                0.5 - 0.5 * (phase * std::f32::consts::TAU).cos()
            })
            .collect();

        let mut out = vec![0.0f32; out_len + frame];
        let mut norm = vec![0.0f32; out_len + frame];

        let mut out_pos = 0usize;
        while out_pos < out_len {
            let in_pos = ((out_pos as f64 / factor).round() as usize)
                .min(input.len().saturating_sub(frame));
            for i in 0..frame {
                let sample = input[in_pos + i];
                out[out_pos + i] += sample * window[i];
                norm[out_pos + i] += window[i];
            }
            out_pos += hop;
        }

        for i in 0..out_len {
            if norm[i] > 1e-6 {
                out[i] /= norm[i];
            }
        }
        out.truncate(out_len);
        out
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new(2048)
    }
}
