//! VITS-style ONNX synthesizer backend
//!
//! Loads a single-file VITS voice model with ONNX Runtime. Inference is one
//! shot per chunk; the cancellation callback is observed while the produced
//! audio is streamed out block by block.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use note_reader_core::PcmAudio;
use ort::{GraphOptimizationLevel, Session};

use super::{SynthesisControl, Synthesizer, SynthesizerFactory};
use crate::PipelineError;

const BLOCK_SAMPLES: usize = 1024;

/// ONNX-backed synthesizer handle
pub struct VitsSynthesizer {
    session: Session,
    voice: String,
    sample_rate: u32,
    noise_scale: f32,
    noise_scale_w: f32,
}

impl VitsSynthesizer {
    /// Load a voice model from a `.onnx` file
    pub fn from_file(
        model_path: impl AsRef<Path>,
        voice: impl Into<String>,
        sample_rate: u32,
    ) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        Ok(Self {
            session,
            voice: voice.into(),
            sample_rate,
            noise_scale: 0.667,
            noise_scale_w: 0.8,
        })
    }
}

impl Synthesizer for VitsSynthesizer {
    fn voice(&self) -> &str {
        &self.voice
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(
        &mut self,
        text: &str,
        _speaker_id: u32,
        speed: f32,
        on_block: &mut dyn FnMut(&[f32]) -> SynthesisControl,
    ) -> Result<PcmAudio, PipelineError> {
        let text_ids: Vec<i64> = text.chars().map(|c| c as i64).collect();
        let id_count = text_ids.len();

        let input = Array2::from_shape_vec((1, id_count), text_ids)
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        let input_lengths = Array2::from_shape_vec((1, 1), vec![id_count as i64])
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        let scales = Array2::from_shape_vec(
            (1, 3),
            vec![self.noise_scale, 1.0 / speed.max(0.1), self.noise_scale_w],
        )
        .map_err(|e| PipelineError::Synthesis(e.to_string()))?;

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input" => input.view(),
                    "input_lengths" => input_lengths.view(),
                    "scales" => scales.view(),
                ]
                .map_err(|e| PipelineError::Model(e.to_string()))?,
            )
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        let audio = outputs
            .get("output")
            .ok_or_else(|| PipelineError::Model("missing output tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Model(e.to_string()))?;
        let raw: Vec<f32> = audio.view().iter().copied().collect();

        // Stream the result through the callback so a stop request still
        // takes effect within one block
        let mut samples = Vec::with_capacity(raw.len());
        for block in raw.chunks(BLOCK_SAMPLES) {
            samples.extend_from_slice(block);
            if on_block(block) == SynthesisControl::Stop {
                break;
            }
        }

        Ok(PcmAudio::new(samples, self.sample_rate))
    }
}

/// Factory loading `.onnx` voice models from a directory
pub struct VitsFactory {
    models_dir: PathBuf,
    sample_rate: u32,
}

impl VitsFactory {
    pub fn new(models_dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            models_dir: models_dir.into(),
            sample_rate,
        }
    }
}

impl SynthesizerFactory for VitsFactory {
    fn load(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError> {
        let path = self.models_dir.join(format!("{voice}.onnx"));
        if !path.is_file() {
            return Err(PipelineError::Model(format!(
                "voice model not found: {}",
                path.display()
            )));
        }
        let synth = VitsSynthesizer::from_file(&path, voice, self.sample_rate)?;
        Ok(Box::new(synth))
    }
}
