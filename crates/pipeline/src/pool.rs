//! Prewarmed synthesizer pool
//!
//! Holds at most one standby handle next to the one currently in use. While
//! chunk N is synthesizing on the serial lane, the handle for chunk N+1 is
//! already loading off-lane; acquiring hands over the standby when its voice
//! matches and falls back to a synchronous load when it does not. The
//! standby slot is guarded by a single-permit lock so a reset cannot race a
//! hand-off mid-swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::{Synthesizer, SynthesizerFactory};
use crate::PipelineError;

#[derive(Default)]
struct StandbySlot {
    voice: Option<String>,
    handle: Option<Box<dyn Synthesizer>>,
}

/// Active/standby synthesizer handle pool
pub struct SynthesizerPool {
    factory: Arc<dyn SynthesizerFactory>,
    standby: Arc<Mutex<StandbySlot>>,
    // Bumped on reset; in-flight standby builds from before the bump are
    // discarded instead of stored
    epoch: Arc<AtomicU64>,
    runtime: tokio::runtime::Handle,
}

impl SynthesizerPool {
    /// Create a pool. Must be called within a tokio runtime; standby builds
    /// are spawned onto it.
    pub fn new(factory: Arc<dyn SynthesizerFactory>) -> Self {
        Self {
            factory,
            standby: Arc::new(Mutex::new(StandbySlot::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Start building a standby handle for `voice` without waiting for it
    pub fn prewarm(&self, voice: &str) {
        self.spawn_standby_build(voice.to_string());
    }

    /// Take a handle configured for `voice`, preferring the standby.
    ///
    /// Blocking; call from the serial synthesis lane only. On a standby miss
    /// (no handle yet, or one loaded for a different voice) the handle is
    /// constructed synchronously. Either way a fresh standby build for
    /// `voice` is issued before returning.
    pub fn acquire_for_chunk(&self, voice: &str) -> Result<Box<dyn Synthesizer>, PipelineError> {
        let reused = {
            let mut slot = self.standby.blocking_lock();
            if slot.voice.as_deref() == Some(voice) {
                slot.handle.take()
            } else {
                None
            }
        };

        let handle = match reused {
            Some(handle) => handle,
            None => {
                tracing::debug!(voice, "standby miss, loading synthesizer on the serial lane");
                self.factory.load(voice)?
            }
        };

        // Speculative prefetch: the next chunk almost always uses the same voice
        self.spawn_standby_build(voice.to_string());
        Ok(handle)
    }

    /// Discard both handles and issue a fresh standby build for `voice`.
    ///
    /// Returns once the rebuild has been issued, not once it completes. Used
    /// by cancellation and explicit state reset.
    pub async fn reset(&self, voice: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut slot = self.standby.lock().await;
            slot.voice = None;
            slot.handle = None;
        }
        self.spawn_standby_build(voice.to_string());
    }

    fn spawn_standby_build(&self, voice: String) {
        let factory = Arc::clone(&self.factory);
        let standby = Arc::clone(&self.standby);
        let epoch = Arc::clone(&self.epoch);
        let issued_at = epoch.load(Ordering::SeqCst);

        self.runtime.spawn_blocking(move || match factory.load(&voice) {
            Ok(handle) => {
                let mut slot = standby.blocking_lock();
                if epoch.load(Ordering::SeqCst) == issued_at {
                    slot.voice = Some(voice);
                    slot.handle = Some(handle);
                } else {
                    tracing::debug!(voice = %voice, "discarding standby built before reset");
                }
            }
            Err(e) => {
                tracing::warn!(voice = %voice, error = %e, "standby synthesizer build failed");
            }
        });
    }
}
