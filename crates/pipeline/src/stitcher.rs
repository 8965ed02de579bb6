//! Audio stitching
//!
//! Concatenates the ordered per-chunk WAV files of one run into a single
//! durable artifact. Chunk files are named `{runId}_chunk{N}.wav`; ordering
//! is recovered from the encoded sequence number rather than trusted from
//! filesystem enumeration order.

use std::fs;
use std::path::{Path, PathBuf};

use note_reader_core::PcmAudio;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::PipelineError;

static CHUNK_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"chunk(\d+)").expect("chunk number pattern is valid"));

/// The final stitched output of one run
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Path of the stitched WAV file
    pub path: PathBuf,
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// The run that produced it
    pub run_id: String,
}

/// Extract the sequence number encoded in a chunk filename
pub fn chunk_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let captures = CHUNK_NUMBER.captures(name)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Concatenates per-chunk audio files into one output file
#[derive(Debug, Default)]
pub struct AudioStitcher;

impl AudioStitcher {
    pub fn new() -> Self {
        Self
    }

    /// Stitch `chunk_files` into `output` in sequence order.
    ///
    /// Empty input is an error, not an empty output file. Files are sorted
    /// by the sequence number in their names before concatenation, so a
    /// caller that discovered them in arbitrary order still gets the right
    /// result. All inputs must share one sample rate.
    pub fn stitch(
        &self,
        run_id: &str,
        chunk_files: &[PathBuf],
        output: &Path,
    ) -> Result<AudioArtifact, PipelineError> {
        if chunk_files.is_empty() {
            return Err(PipelineError::Stitch(
                "no chunk files to stitch".to_string(),
            ));
        }

        let mut ordered = chunk_files.to_vec();
        ordered.sort_by_key(|path| chunk_number(path).unwrap_or(0));

        let mut combined = PcmAudio::read_wav(&ordered[0])
            .map_err(|e| PipelineError::Stitch(e.to_string()))?;
        for path in &ordered[1..] {
            let chunk = PcmAudio::read_wav(path).map_err(|e| PipelineError::Stitch(e.to_string()))?;
            combined
                .append(&chunk)
                .map_err(|e| PipelineError::Stitch(e.to_string()))?;
        }

        combined
            .write_wav(output)
            .map_err(|e| PipelineError::Stitch(e.to_string()))?;

        tracing::debug!(
            run_id,
            chunks = ordered.len(),
            duration_seconds = combined.duration_seconds(),
            "stitched run audio"
        );

        Ok(AudioArtifact {
            path: output.to_path_buf(),
            duration_seconds: combined.duration_seconds(),
            run_id: run_id.to_string(),
        })
    }

    /// Discover a run's chunk files in `temp_dir` and stitch them into
    /// `{run_id}_stitched.wav` under `output_dir`.
    pub fn stitch_run(
        &self,
        temp_dir: &Path,
        run_id: &str,
        output_dir: &Path,
    ) -> Result<AudioArtifact, PipelineError> {
        let prefix = format!("{run_id}_chunk");
        let mut chunk_files = Vec::new();
        for entry in fs::read_dir(temp_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".wav") {
                chunk_files.push(path);
            }
        }

        let output = output_dir.join(format!("{run_id}_stitched.wav"));
        self.stitch(run_id, &chunk_files, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tone(dir: &Path, name: &str, freq: f32, len: usize) -> PathBuf {
        let samples: Vec<f32> = (0..len)
            .map(|i| (i as f32 / 22050.0 * freq * std::f32::consts::TAU).sin() * 0.5)
            .collect();
        let path = dir.join(name);
        PcmAudio::new(samples, 22050).write_wav(&path).unwrap();
        path
    }

    #[test]
    fn test_chunk_number_parsing() {
        assert_eq!(chunk_number(Path::new("/tmp/abc_chunk7.wav")), Some(7));
        assert_eq!(chunk_number(Path::new("/tmp/abc_chunk12.wav")), Some(12));
        assert_eq!(chunk_number(Path::new("/tmp/abc_stitched.wav")), None);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let stitcher = AudioStitcher::new();
        let result = stitcher.stitch("run", &[], &dir.path().join("out.wav"));
        assert!(matches!(result, Err(PipelineError::Stitch(_))));
    }

    #[test]
    fn test_out_of_order_discovery_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        // Distinct lengths let us verify content order in the output
        let c0 = write_tone(dir.path(), "run_chunk0.wav", 220.0, 1000);
        let c1 = write_tone(dir.path(), "run_chunk1.wav", 220.0, 2000);
        let c2 = write_tone(dir.path(), "run_chunk2.wav", 220.0, 3000);

        let output = dir.path().join("run_stitched.wav");
        let stitcher = AudioStitcher::new();
        // Hand the files over in scrambled [2, 0, 1] order
        let artifact = stitcher
            .stitch("run", &[c2, c0.clone(), c1], &output)
            .unwrap();

        let stitched = PcmAudio::read_wav(&artifact.path).unwrap();
        assert_eq!(stitched.len(), 6000);

        let first = PcmAudio::read_wav(&c0).unwrap();
        for (a, b) in first.samples.iter().zip(stitched.samples.iter()) {
            assert!((a - b).abs() < 1e-4, "chunk 0 must open the stitched file");
        }
    }

    #[test]
    fn test_stitch_run_discovers_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write_tone(dir.path(), "runA_chunk0.wav", 220.0, 500);
        write_tone(dir.path(), "runA_chunk1.wav", 220.0, 500);
        write_tone(dir.path(), "runB_chunk0.wav", 220.0, 9000);

        let out_dir = tempfile::tempdir().unwrap();
        let stitcher = AudioStitcher::new();
        let artifact = stitcher
            .stitch_run(dir.path(), "runA", out_dir.path())
            .unwrap();

        assert!(artifact.path.ends_with("runA_stitched.wav"));
        let stitched = PcmAudio::read_wav(&artifact.path).unwrap();
        assert_eq!(stitched.len(), 1000);
    }

    #[test]
    fn test_duration_is_sum_of_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_tone(dir.path(), "r_chunk0.wav", 330.0, 22050);
        write_tone(dir.path(), "r_chunk1.wav", 330.0, 11025);

        let out_dir = tempfile::tempdir().unwrap();
        let stitcher = AudioStitcher::new();
        let artifact = stitcher.stitch_run(dir.path(), "r", out_dir.path()).unwrap();
        assert!((artifact.duration_seconds - 1.5).abs() < 1e-6);
    }
}
