//! Generation orchestrator
//!
//! Top-level state machine for one text-to-audio run. Wires the streaming
//! chunker into per-chunk synthesis jobs on a strictly serial lane, tracks
//! progress, handles cancellation at every checkpoint, and on a normal end
//! of stream stitches the chunk files into one artifact and records it in
//! the library.
//!
//! Lanes: the parser runs to completion on its own blocking lane,
//! independent of synthesis; chunk events queue on an unbounded channel and
//! are consumed one at a time, so no two synthesis calls ever overlap.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use note_reader_config::{ChunkFailurePolicy, Settings, VoiceSettings};
use note_reader_core::{derive_audio_name, AudioRecord, LibrarySink, StorageLayout, TextChunk};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chunker::{ChunkerConfig, ChunkerEvent, StreamingChunker, TerminateReason};
use crate::pitch::PitchShifter;
use crate::playback::PlaybackSink;
use crate::pool::SynthesizerPool;
use crate::stitcher::{AudioArtifact, AudioStitcher};
use crate::{PipelineError, SynthesisControl};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// No run in flight
    Idle,
    /// Parsing and synthesizing
    Generating,
    /// Combining chunk files into the final artifact
    Stitching,
    /// Tearing down a cancelled run
    Cancelling,
}

/// Events emitted over the run's lifetime
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// A run was accepted and started
    Started { run_id: Uuid },
    /// A chunk's audio was synthesized and persisted
    ChunkReady {
        run_id: Uuid,
        sequence_index: usize,
        path: PathBuf,
    },
    /// A chunk failed to synthesize
    ChunkFailed {
        run_id: Uuid,
        sequence_index: usize,
        error: String,
    },
    /// The run finished and its record was persisted
    Completed {
        run_id: Uuid,
        record_id: i64,
        artifact: AudioArtifact,
    },
    /// The run was cancelled; no artifact was produced
    Cancelled { run_id: Uuid },
    /// The run failed; no artifact was produced
    Failed { run_id: Uuid, error: String },
}

/// Per-run options
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Hand each ready chunk to the playback sink
    pub play_audio: bool,
    /// Batch mode: hold progress at 1.0 on completion so a driving
    /// collaborator can detect "ready to advance"
    pub batch: bool,
    /// Imported document this run came from, if any
    pub document_id: Option<i64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            play_audio: true,
            batch: false,
            document_id: None,
        }
    }
}

/// Voice settings frozen at the start of a run.
///
/// Settings changed mid-run apply to the next run, never to chunks already
/// in flight.
#[derive(Debug, Clone)]
pub struct VoiceSnapshot {
    /// Voice model id
    pub model: String,
    /// Speaker id within the model
    pub speaker_id: u32,
    /// Speaking rate (1.0 = normal)
    pub speed: f32,
    /// Pitch factor (1.0 = unity)
    pub pitch: f32,
}

impl From<&VoiceSettings> for VoiceSnapshot {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            model: settings.model.clone(),
            speaker_id: settings.speaker_id,
            speed: settings.speed,
            pitch: settings.pitch,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Chunker configuration
    pub chunker: ChunkerConfig,
    /// Per-chunk failure policy
    pub on_chunk_failure: ChunkFailurePolicy,
    /// Grace period after a stop request before stragglers are force-cleared
    pub settle: Duration,
    /// Character budget for derived record names
    pub name_char_limit: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            on_chunk_failure: ChunkFailurePolicy::default(),
            settle: Duration::from_millis(100),
            name_char_limit: 25,
        }
    }
}

impl GeneratorConfig {
    /// Build from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunker: ChunkerConfig::from(&settings.chunker),
            on_chunk_failure: settings.generation.on_chunk_failure,
            settle: Duration::from_millis(settings.generation.settle_ms),
            name_char_limit: settings.generation.name_char_limit,
        }
    }
}

/// One in-flight run
struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    model: String,
    batch: bool,
    worker: tokio::task::JoinHandle<()>,
}

/// Everything the serial worker needs for one run
struct RunContext {
    run_id: Uuid,
    text: String,
    voice: VoiceSnapshot,
    options: GenerationOptions,
    cancel: CancellationToken,
    /// Chunks the parser has emitted so far; the denominator of the
    /// progress estimate
    chunks_seen: Arc<AtomicUsize>,
}

/// Top-level generation orchestrator
pub struct SpeechGenerator {
    config: GeneratorConfig,
    layout: StorageLayout,
    pool: Arc<SynthesizerPool>,
    shifter: PitchShifter,
    stitcher: AudioStitcher,
    playback: Arc<dyn PlaybackSink>,
    library: Arc<dyn LibrarySink>,
    state: Mutex<GeneratorState>,
    current: Mutex<Option<RunHandle>>,
    progress: watch::Sender<Option<f32>>,
    event_tx: broadcast::Sender<GenerationEvent>,
}

impl SpeechGenerator {
    /// Create an orchestrator. Must be called within a tokio runtime.
    pub fn new(
        config: GeneratorConfig,
        layout: StorageLayout,
        pool: Arc<SynthesizerPool>,
        playback: Arc<dyn PlaybackSink>,
        library: Arc<dyn LibrarySink>,
    ) -> Arc<Self> {
        let (progress, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(128);
        Arc::new(Self {
            config,
            layout,
            pool,
            shifter: PitchShifter::default(),
            stitcher: AudioStitcher::new(),
            playback,
            library,
            state: Mutex::new(GeneratorState::Idle),
            current: Mutex::new(None),
            progress,
            event_tx,
        })
    }

    /// Current state
    pub fn state(&self) -> GeneratorState {
        *self.state.lock()
    }

    /// Whether a run is in flight
    pub fn is_generating(&self) -> bool {
        self.state() != GeneratorState::Idle
    }

    /// Progress observable: absent when idle, in [0, 1] during a run,
    /// exactly 1.0 on completion (held there in batch mode)
    pub fn progress(&self) -> watch::Receiver<Option<f32>> {
        self.progress.subscribe()
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    /// Start a run.
    ///
    /// Rejects empty or whitespace-only text and overlapping runs without
    /// any state change. Returns the run id once the parser and worker
    /// lanes are up.
    pub fn start(
        self: &Arc<Self>,
        text: &str,
        voice: VoiceSnapshot,
        options: GenerationOptions,
    ) -> Result<Uuid, PipelineError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        {
            let mut state = self.state.lock();
            if *state != GeneratorState::Idle {
                return Err(PipelineError::Busy);
            }
            *state = GeneratorState::Generating;
        }
        self.layout.ensure().map_err(|e| {
            *self.state.lock() = GeneratorState::Idle;
            PipelineError::Io(e.to_string())
        })?;

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let chunks_seen = Arc::new(AtomicUsize::new(0));
        self.progress.send_replace(Some(0.0));

        tracing::info!(run_id = %run_id, model = %voice.model, "starting generation run");

        // Standby build starts while the first chunk is still parsing
        self.pool.prewarm(&voice.model);

        let (tx, rx) = mpsc::unbounded_channel();

        // Parser lane: runs to completion independent of synthesis
        let chunker = StreamingChunker::new(self.config.chunker.clone(), cancel.clone());
        let parser_text = trimmed.to_string();
        let seen = Arc::clone(&chunks_seen);
        tokio::task::spawn_blocking(move || {
            let reader = Cursor::new(parser_text.into_bytes());
            chunker.run(reader, &mut |event| {
                if matches!(event, ChunkerEvent::Chunk(_)) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                let _ = tx.send(event);
            });
        });

        let ctx = RunContext {
            run_id,
            text: trimmed.to_string(),
            voice: voice.clone(),
            options: options.clone(),
            cancel: cancel.clone(),
            chunks_seen,
        };
        let worker = tokio::spawn(Arc::clone(self).run_worker(ctx, rx));

        *self.current.lock() = Some(RunHandle {
            run_id,
            cancel,
            model: voice.model,
            batch: options.batch,
            worker,
        });
        let _ = self.event_tx.send(GenerationEvent::Started { run_id });
        Ok(run_id)
    }

    /// Cancel the current run, if any. Idempotent.
    ///
    /// Sets the shared cancellation flag, clears the playback queue, waits
    /// out the settle period for in-flight work to observe the flag, then
    /// force-clears stragglers, resets the pool, and removes the run's
    /// scratch files. No artifact is produced.
    pub async fn stop(&self) {
        let Some(handle) = self.current.lock().take() else {
            return;
        };
        tracing::info!(run_id = %handle.run_id, "stopping generation run");
        *self.state.lock() = GeneratorState::Cancelling;

        handle.cancel.cancel();
        self.playback.clear();

        tokio::time::sleep(self.config.settle).await;
        if !handle.worker.is_finished() {
            tracing::warn!(run_id = %handle.run_id, "worker still busy after settle, aborting");
            handle.worker.abort();
        }

        self.pool.reset(&handle.model).await;
        self.remove_run_files(&handle.run_id);

        self.progress
            .send_replace(if handle.batch { Some(1.0) } else { None });
        *self.state.lock() = GeneratorState::Idle;
        let _ = self.event_tx.send(GenerationEvent::Cancelled {
            run_id: handle.run_id,
        });
    }

    /// Serial consumer lane: one chunk job at a time, in emission order
    async fn run_worker(
        self: Arc<Self>,
        ctx: RunContext,
        mut rx: mpsc::UnboundedReceiver<ChunkerEvent>,
    ) {
        // Append-only ledger of persisted chunk files; mutated only here
        let mut ledger: Vec<PathBuf> = Vec::new();

        while let Some(event) = rx.recv().await {
            match event {
                ChunkerEvent::Chunk(chunk) => {
                    // Checkpoint 1: a queued job is dropped outright once
                    // cancellation is requested
                    if ctx.cancel.is_cancelled() {
                        continue;
                    }

                    let seen = ctx.chunks_seen.load(Ordering::SeqCst);
                    let estimate = (ledger.len() + 1) as f32 / (seen + 1) as f32;
                    self.progress.send_replace(Some(estimate.min(1.0)));

                    let sequence_index = chunk.sequence_index;
                    match self.synthesize_chunk(&ctx, chunk).await {
                        Ok(Some(path)) => {
                            ledger.push(path.clone());
                            if ctx.options.play_audio {
                                self.playback.enqueue(&path);
                            }
                            let _ = self.event_tx.send(GenerationEvent::ChunkReady {
                                run_id: ctx.run_id,
                                sequence_index,
                                path,
                            });
                        }
                        Ok(None) => {
                            // Cancelled mid-synthesis; the stale result was
                            // discarded, stop() owns the cleanup
                        }
                        Err(error) => {
                            let _ = self.event_tx.send(GenerationEvent::ChunkFailed {
                                run_id: ctx.run_id,
                                sequence_index,
                                error: error.to_string(),
                            });
                            // A missing model is fatal regardless of policy
                            let fatal = matches!(error, PipelineError::Model(_))
                                || self.config.on_chunk_failure == ChunkFailurePolicy::Abort;
                            if fatal {
                                self.fail_run(&ctx, &error).await;
                                return;
                            }
                            tracing::warn!(
                                run_id = %ctx.run_id,
                                sequence_index,
                                error = %error,
                                "chunk synthesis failed, continuing without it"
                            );
                        }
                    }
                }
                ChunkerEvent::Finished { total_chunks } => {
                    if ctx.cancel.is_cancelled() {
                        return;
                    }
                    // FIFO consumption means every chunk job already ran
                    *self.state.lock() = GeneratorState::Stitching;
                    tracing::info!(
                        run_id = %ctx.run_id,
                        total_chunks,
                        "parsing finished, stitching"
                    );

                    match self.finalize_run(&ctx, &ledger).await {
                        Ok(Some((record_id, artifact))) => {
                            self.progress.send_replace(Some(1.0));
                            let _ = self.event_tx.send(GenerationEvent::Completed {
                                run_id: ctx.run_id,
                                record_id,
                                artifact,
                            });
                            if !ctx.options.batch {
                                self.progress.send_replace(None);
                            }
                            *self.state.lock() = GeneratorState::Idle;
                            self.current.lock().take();
                        }
                        Ok(None) => {
                            // Cancelled during stitching; stop() cleans up
                        }
                        Err(error) => {
                            self.fail_run(&ctx, &error).await;
                        }
                    }
                    return;
                }
                ChunkerEvent::Terminated { word_count, reason } => {
                    match reason {
                        TerminateReason::Cancelled => {
                            // stop() owns the teardown
                            tracing::debug!(
                                run_id = %ctx.run_id,
                                word_count,
                                "parsing terminated by cancellation"
                            );
                        }
                        TerminateReason::DecodeError => {
                            self.fail_run(
                                &ctx,
                                &PipelineError::Chunker(
                                    "source text could not be decoded".to_string(),
                                ),
                            )
                            .await;
                        }
                    }
                    return;
                }
            }
        }
    }

    /// One chunk job: acquire a handle, synthesize with the cancellation
    /// callback, pitch-shift if needed, persist. Returns `Ok(None)` when the
    /// job was overtaken by cancellation and its result discarded.
    async fn synthesize_chunk(
        self: &Arc<Self>,
        ctx: &RunContext,
        chunk: TextChunk,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let this = Arc::clone(self);
        let run_id = ctx.run_id;
        let voice = ctx.voice.clone();
        let cancel = ctx.cancel.clone();

        let job = tokio::task::spawn_blocking(move || -> Result<Option<PathBuf>, PipelineError> {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let mut synth = this.pool.acquire_for_chunk(&voice.model)?;

            // Checkpoint 2: the engine polls this once per sample block
            let block_cancel = cancel.clone();
            let mut on_block = move |_: &[f32]| {
                if block_cancel.is_cancelled() {
                    SynthesisControl::Stop
                } else {
                    SynthesisControl::Continue
                }
            };
            let audio =
                synth.synthesize(&chunk.text, voice.speaker_id, voice.speed, &mut on_block)?;
            // The handle is dropped after one chunk; the pool already has
            // the next one loading
            drop(synth);

            if cancel.is_cancelled() {
                return Ok(None);
            }
            if audio.is_empty() {
                return Err(PipelineError::Synthesis(
                    "engine produced no audio".to_string(),
                ));
            }

            let audio = if PitchShifter::is_unity(voice.pitch) {
                audio
            } else {
                this.shifter.shift(&audio, voice.pitch)?
            };

            let path = this
                .layout
                .temp_dir()
                .join(format!("{}_chunk{}.wav", run_id, chunk.sequence_index));
            audio
                .write_wav(&path)
                .map_err(|e| PipelineError::Audio(e.to_string()))?;

            // Checkpoint 3: a chunk that finished after cancellation was
            // requested must not be kept or enqueued
            if cancel.is_cancelled() {
                let _ = std::fs::remove_file(&path);
                return Ok(None);
            }
            Ok(Some(path))
        });

        job.await
            .map_err(|e| PipelineError::Synthesis(format!("chunk job panicked: {e}")))?
    }

    /// Stitch, snapshot the source text, and persist the library record.
    /// Returns `Ok(None)` when cancellation won the race.
    async fn finalize_run(
        self: &Arc<Self>,
        ctx: &RunContext,
        ledger: &[PathBuf],
    ) -> Result<Option<(i64, AudioArtifact)>, PipelineError> {
        if ctx.cancel.is_cancelled() {
            return Ok(None);
        }

        let this = Arc::clone(self);
        let run_id = ctx.run_id;
        let files = ledger.to_vec();
        let artifact = tokio::task::spawn_blocking(move || {
            let output = this
                .layout
                .audio_dir()
                .join(format!("{run_id}_stitched.wav"));
            this.stitcher.stitch(&run_id.to_string(), &files, &output)
        })
        .await
        .map_err(|e| PipelineError::Stitch(format!("stitch job panicked: {e}")))??;

        // Plain-text snapshot unless the run came from an imported document
        let text_file_path = if ctx.options.document_id.is_none() {
            let path = self.layout.text_dir().join(format!("{run_id}.txt"));
            tokio::fs::write(&path, &ctx.text)
                .await
                .map_err(|e| PipelineError::Io(e.to_string()))?;
            Some(self.layout.relative_path(&path))
        } else {
            None
        };

        if ctx.cancel.is_cancelled() {
            return Ok(None);
        }

        let record = AudioRecord {
            id: 0,
            name: derive_audio_name(&ctx.text, self.config.name_char_limit),
            file_path: self.layout.relative_path(&artifact.path),
            date_generated: Utc::now(),
            model: ctx.voice.model.clone(),
            pitch: ctx.voice.pitch as f64,
            speed: ctx.voice.speed as f64,
            document_id: ctx.options.document_id,
            text_file_path,
            duration_seconds: artifact.duration_seconds.round() as i64,
            is_favorite: false,
        };
        let record_id = self
            .library
            .record_artifact(record)
            .await
            .map_err(|e| PipelineError::Library(e.to_string()))?;

        tracing::info!(
            run_id = %ctx.run_id,
            record_id,
            duration_seconds = artifact.duration_seconds,
            "run completed and recorded"
        );
        Ok(Some((record_id, artifact)))
    }

    /// Abort the run: tear everything down, no artifact, surface the error
    async fn fail_run(self: &Arc<Self>, ctx: &RunContext, error: &PipelineError) {
        tracing::error!(run_id = %ctx.run_id, error = %error, "generation run failed");
        ctx.cancel.cancel();
        self.playback.clear();
        self.pool.reset(&ctx.voice.model).await;
        self.remove_run_files(&ctx.run_id);

        self.progress
            .send_replace(if ctx.options.batch { Some(1.0) } else { None });
        *self.state.lock() = GeneratorState::Idle;
        self.current.lock().take();
        let _ = self.event_tx.send(GenerationEvent::Failed {
            run_id: ctx.run_id,
            error: error.to_string(),
        });
    }

    /// Delete a run's scratch chunk files
    fn remove_run_files(&self, run_id: &Uuid) {
        let prefix = format!("{run_id}_chunk");
        let Ok(entries) = std::fs::read_dir(self.layout.temp_dir()) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if matches {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove chunk file");
                }
            }
        }
    }
}
