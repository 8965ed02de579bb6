//! PCM audio buffers
//!
//! Mono floating-point audio with WAV I/O and offline resampling. The
//! synthesis engine produces one of these per chunk; the stitcher and pitch
//! shifter consume them.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Error, Result};

/// Mono PCM audio buffer with samples in [-1.0, 1.0]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmAudio {
    /// Audio samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Processing block size for the resampler
const RESAMPLE_CHUNK: usize = 1024;

impl PcmAudio {
    /// Create a new buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Append another buffer. The sample rates must match.
    pub fn append(&mut self, other: &PcmAudio) -> Result<()> {
        if self.sample_rate != other.sample_rate {
            return Err(Error::Audio(format!(
                "sample rate mismatch: {} vs {}",
                self.sample_rate, other.sample_rate
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Write the buffer to a 16-bit mono WAV file
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        for &sample in &self.samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(scaled)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Read a mono WAV file into a buffer
    pub fn read_wav(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(Error::Audio(format!(
                "expected mono WAV, got {} channels",
                spec.channels
            )));
        }
        let samples = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<Vec<f32>, hound::Error>>()?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        };
        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Resample to a target rate, preserving duration.
    ///
    /// Offline rendering only; not suitable for a real-time path.
    pub fn resample(&self, target_rate: u32) -> Result<PcmAudio> {
        if target_rate == 0 {
            return Err(Error::Audio("target sample rate must be non-zero".into()));
        }
        if target_rate == self.sample_rate || self.samples.is_empty() {
            return Ok(PcmAudio::new(self.samples.clone(), target_rate));
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
            .map_err(|e| Error::Audio(e.to_string()))?;
        let delay = resampler.output_delay();

        let expected = (self.samples.len() as f64 * ratio).round() as usize;
        let mut out: Vec<f32> = Vec::with_capacity(expected + RESAMPLE_CHUNK);

        let mut pos = 0;
        while pos < self.samples.len() {
            let end = (pos + RESAMPLE_CHUNK).min(self.samples.len());
            let mut frame = self.samples[pos..end].to_vec();
            frame.resize(RESAMPLE_CHUNK, 0.0);
            let processed = resampler
                .process(&[frame], None)
                .map_err(|e| Error::Audio(e.to_string()))?;
            out.extend_from_slice(&processed[0]);
            pos = end;
        }
        // One silent chunk to flush the sinc filter tail
        let processed = resampler
            .process(&[vec![0.0f32; RESAMPLE_CHUNK]], None)
            .map_err(|e| Error::Audio(e.to_string()))?;
        out.extend_from_slice(&processed[0]);

        out.drain(..delay.min(out.len()));
        out.truncate(expected);
        Ok(PcmAudio::new(out, target_rate))
    }
}
