//! Integration tests for the generation pipeline (chunk -> synthesize ->
//! stitch -> record)
//!
//! These tests drive full runs against the tone engine and a temp-dir
//! storage layout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::timeout;

use note_reader_config::ChunkFailurePolicy;
use note_reader_core::{AudioRecord, LibrarySink, PcmAudio, StorageLayout};
use note_reader_pipeline::{
    GenerationEvent, GenerationOptions, GeneratorConfig, GeneratorState, PipelineError,
    PlaybackQueue, PlaybackSink, SpeechGenerator, SynthesisControl, Synthesizer,
    SynthesizerFactory, SynthesizerPool, ToneFactory, ToneSynthesizer, VoiceSnapshot,
};

/// In-memory library sink capturing persisted records
#[derive(Default)]
struct MemoryLibrary {
    records: Mutex<Vec<AudioRecord>>,
}

#[async_trait]
impl LibrarySink for MemoryLibrary {
    async fn record_artifact(&self, record: AudioRecord) -> note_reader_core::Result<i64> {
        let mut records = self.records.lock();
        let id = records.len() as i64 + 1;
        records.push(record);
        Ok(id)
    }
}

/// Tone engine that sleeps per block, so cancellation can win the race
struct SlowFactory;

struct SlowSynthesizer {
    inner: ToneSynthesizer,
}

impl Synthesizer for SlowSynthesizer {
    fn voice(&self) -> &str {
        self.inner.voice()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn synthesize(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
        on_block: &mut dyn FnMut(&[f32]) -> SynthesisControl,
    ) -> Result<PcmAudio, PipelineError> {
        let mut slow_block = |block: &[f32]| {
            std::thread::sleep(Duration::from_millis(10));
            on_block(block)
        };
        self.inner.synthesize(text, speaker_id, speed, &mut slow_block)
    }
}

impl SynthesizerFactory for SlowFactory {
    fn load(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError> {
        Ok(Box::new(SlowSynthesizer {
            inner: ToneSynthesizer::new(voice, 22050),
        }))
    }
}

/// Tone engine that refuses to speak a marker word
struct FlakyFactory;

struct FlakySynthesizer {
    inner: ToneSynthesizer,
}

impl Synthesizer for FlakySynthesizer {
    fn voice(&self) -> &str {
        self.inner.voice()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn synthesize(
        &mut self,
        text: &str,
        speaker_id: u32,
        speed: f32,
        on_block: &mut dyn FnMut(&[f32]) -> SynthesisControl,
    ) -> Result<PcmAudio, PipelineError> {
        if text.contains("FAILWORD") {
            return Err(PipelineError::Synthesis("refusing marker word".to_string()));
        }
        self.inner.synthesize(text, speaker_id, speed, on_block)
    }
}

impl SynthesizerFactory for FlakyFactory {
    fn load(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError> {
        Ok(Box::new(FlakySynthesizer {
            inner: ToneSynthesizer::new(voice, 22050),
        }))
    }
}

struct Fixture {
    generator: Arc<SpeechGenerator>,
    library: Arc<MemoryLibrary>,
    queue: Arc<PlaybackQueue>,
    layout: StorageLayout,
    _dir: tempfile::TempDir,
}

fn fixture_with(
    factory: Arc<dyn SynthesizerFactory>,
    config: GeneratorConfig,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let pool = Arc::new(SynthesizerPool::new(factory));
    let library = Arc::new(MemoryLibrary::default());
    let queue = Arc::new(PlaybackQueue::new());
    let generator = SpeechGenerator::new(
        config,
        layout.clone(),
        pool,
        Arc::clone(&queue) as Arc<dyn PlaybackSink>,
        Arc::clone(&library) as Arc<dyn LibrarySink>,
    );
    Fixture {
        generator,
        library,
        queue,
        layout,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(ToneFactory::default()), GeneratorConfig::default())
}

fn voice() -> VoiceSnapshot {
    VoiceSnapshot {
        model: "amy".to_string(),
        speaker_id: 0,
        speed: 1.0,
        pitch: 1.0,
    }
}

async fn wait_for<F>(
    rx: &mut tokio::sync::broadcast::Receiver<GenerationEvent>,
    mut pred: F,
) -> GenerationEvent
where
    F: FnMut(&GenerationEvent) -> bool,
{
    timeout(Duration::from_secs(20), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_generation_run() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    let run_id = fx
        .generator
        .start("Hello world. This is a test.", voice(), GenerationOptions::default())
        .unwrap();

    let completed = wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    let GenerationEvent::Completed {
        run_id: done_id,
        record_id,
        artifact,
    } = completed
    else {
        unreachable!();
    };
    assert_eq!(done_id, run_id);
    assert_eq!(record_id, 1);
    assert!(artifact.path.is_file());
    assert!(artifact.duration_seconds > 0.0);
    assert!(artifact
        .path
        .to_string_lossy()
        .ends_with(&format!("{run_id}_stitched.wav")));

    // Two sentences make two chunks, handed to playback in order
    let queued = fx.queue.snapshot();
    assert_eq!(queued.len(), 2);
    assert!(queued[0].to_string_lossy().contains("_chunk0"));
    assert!(queued[1].to_string_lossy().contains("_chunk1"));

    // Exactly one library record, with derived name and metadata
    let records = fx.library.records.lock();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.name.starts_with("Hello world."));
    assert_eq!(record.model, "amy");
    assert!(record.text_file_path.is_some());
    assert!(!record.is_favorite);

    // Stitched duration equals the sum of the chunk durations
    let total: f64 = queued
        .iter()
        .map(|p| PcmAudio::read_wav(p).unwrap().duration_seconds())
        .sum();
    assert!((artifact.duration_seconds - total).abs() < 0.01);

    assert_eq!(fx.generator.state(), GeneratorState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunk_events_arrive_in_sequence_order() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    let text = "First sentence here. ".repeat(60); // several chunks
    fx.generator
        .start(&text, voice(), GenerationOptions::default())
        .unwrap();

    let mut indices = Vec::new();
    timeout(Duration::from_secs(20), async {
        loop {
            match events.recv().await.expect("event channel closed") {
                GenerationEvent::ChunkReady { sequence_index, .. } => {
                    indices.push(sequence_index)
                }
                GenerationEvent::Completed { .. } => break,
                _ => {}
            }
        }
    })
    .await
    .expect("run did not complete");

    let expected: Vec<usize> = (0..indices.len()).collect();
    assert_eq!(indices, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_text_is_rejected() {
    let fx = fixture();
    let result = fx
        .generator
        .start("   \n  ", voice(), GenerationOptions::default());
    assert!(matches!(result, Err(PipelineError::EmptyInput)));
    assert_eq!(fx.generator.state(), GeneratorState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_runs_are_rejected() {
    let fx = fixture_with(Arc::new(SlowFactory), GeneratorConfig::default());
    let text = "word. ".repeat(500);
    fx.generator
        .start(&text, voice(), GenerationOptions::default())
        .unwrap();

    let second = fx
        .generator
        .start("another run", voice(), GenerationOptions::default());
    assert!(matches!(second, Err(PipelineError::Busy)));

    fx.generator.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_cancels_without_artifact() {
    let fx = fixture_with(Arc::new(SlowFactory), GeneratorConfig::default());
    let mut events = fx.generator.subscribe();

    let text = "A sentence to speak. ".repeat(2000);
    let run_id = fx
        .generator
        .start(&text, voice(), GenerationOptions::default())
        .unwrap();

    // Let at least one chunk land, then cancel
    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::ChunkReady { .. })
    })
    .await;
    fx.generator.stop().await;

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Cancelled { run_id: id } if *id == run_id)
    })
    .await;

    assert_eq!(fx.generator.state(), GeneratorState::Idle);
    assert!(fx.library.records.lock().is_empty());
    assert!(fx.queue.is_empty());
    assert!(!fx
        .layout
        .audio_dir()
        .join(format!("{run_id}_stitched.wav"))
        .exists());

    // Scratch chunk files were force-cleared
    tokio::time::sleep(Duration::from_millis(200)).await;
    let leftovers: Vec<_> = std::fs::read_dir(fx.layout.temp_dir())
        .unwrap()
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&format!("{run_id}_chunk"))
        })
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_play_audio_disabled_skips_queue() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    let options = GenerationOptions {
        play_audio: false,
        ..Default::default()
    };
    fx.generator
        .start("Quiet generation run.", voice(), options)
        .unwrap();

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    assert!(fx.queue.is_empty());
    assert_eq!(fx.library.records.lock().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_mode_holds_progress_at_one() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();
    let progress = fx.generator.progress();

    let options = GenerationOptions {
        batch: true,
        ..Default::default()
    };
    fx.generator
        .start("Batch document text.", voice(), options)
        .unwrap();

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*progress.borrow(), Some(1.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_clears_after_normal_run() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();
    let progress = fx.generator.progress();

    fx.generator
        .start("Normal run text.", voice(), GenerationOptions::default())
        .unwrap();

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*progress.borrow(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunk_failure_aborts_by_default() {
    let fx = fixture_with(Arc::new(FlakyFactory), GeneratorConfig::default());
    let mut events = fx.generator.subscribe();

    let run_id = fx
        .generator
        .start("Fine opening. FAILWORD breaks this.", voice(), GenerationOptions::default())
        .unwrap();

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::ChunkFailed { .. })
    })
    .await;
    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Failed { run_id: id, .. } if *id == run_id)
    })
    .await;

    assert_eq!(fx.generator.state(), GeneratorState::Idle);
    assert!(fx.library.records.lock().is_empty());
    assert!(!fx
        .layout
        .audio_dir()
        .join(format!("{run_id}_stitched.wav"))
        .exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_continue_policy_keeps_going_past_failed_chunk() {
    let config = GeneratorConfig {
        on_chunk_failure: ChunkFailurePolicy::Continue,
        ..Default::default()
    };
    let fx = fixture_with(Arc::new(FlakyFactory), config);
    let mut events = fx.generator.subscribe();

    fx.generator
        .start("Fine opening. FAILWORD breaks this chunk only.", voice(), GenerationOptions::default())
        .unwrap();

    let mut saw_failed = false;
    let completed = timeout(Duration::from_secs(20), async {
        loop {
            match events.recv().await.expect("event channel closed") {
                GenerationEvent::ChunkFailed { .. } => saw_failed = true,
                ev @ GenerationEvent::Completed { .. } => return ev,
                GenerationEvent::Failed { error, .. } => panic!("run failed: {error}"),
                _ => {}
            }
        }
    })
    .await
    .expect("run did not complete");

    assert!(saw_failed);
    let GenerationEvent::Completed { artifact, .. } = completed else {
        unreachable!();
    };
    // The surviving chunk still produced an artifact, with a gap where the
    // failed chunk would have been
    assert!(artifact.path.is_file());
    assert_eq!(fx.library.records.lock().len(), 1);
    assert_eq!(fx.queue.snapshot().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pitch_shifted_run_completes() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    let shifted_voice = VoiceSnapshot {
        pitch: 1.3,
        ..voice()
    };
    fx.generator
        .start("Pitch shifted sentence.", shifted_voice, GenerationOptions::default())
        .unwrap();

    let completed = wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    let GenerationEvent::Completed { artifact, .. } = completed else {
        unreachable!();
    };
    let stitched = PcmAudio::read_wav(&artifact.path).unwrap();
    assert!(!stitched.is_empty());

    let records = fx.library.records.lock();
    assert!((records[0].pitch - 1.3).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_document_run_skips_text_snapshot() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    let options = GenerationOptions {
        document_id: Some(42),
        ..Default::default()
    };
    fx.generator
        .start("Text imported from a document.", voice(), options)
        .unwrap();

    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    let records = fx.library.records.lock();
    assert_eq!(records[0].document_id, Some(42));
    assert!(records[0].text_file_path.is_none());

    // No snapshot file was written
    let snapshots: Vec<_> = std::fs::read_dir(fx.layout.text_dir())
        .unwrap()
        .flatten()
        .collect();
    assert!(snapshots.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generator_is_reusable_after_completion() {
    let fx = fixture();
    let mut events = fx.generator.subscribe();

    fx.generator
        .start("First run.", voice(), GenerationOptions::default())
        .unwrap();
    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    fx.generator
        .start("Second run.", voice(), GenerationOptions::default())
        .unwrap();
    wait_for(&mut events, |ev| {
        matches!(ev, GenerationEvent::Completed { .. })
    })
    .await;

    assert_eq!(fx.library.records.lock().len(), 2);
}
