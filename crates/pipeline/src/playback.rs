//! Playback queue boundary
//!
//! The orchestrator hands each chunk's audio file to a gapless sequential
//! player as it becomes ready. The contract is ordering only: files arrive
//! in sequence order because synthesis itself is serial, and the sink must
//! play them FIFO.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Where ready chunk files are handed for playback
pub trait PlaybackSink: Send + Sync {
    /// Append a ready chunk file to the play queue
    fn enqueue(&self, path: &Path);

    /// Drop everything queued; used on cancellation
    fn clear(&self);
}

/// Sink that discards everything, for generation-only runs
#[derive(Debug, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn enqueue(&self, _path: &Path) {}
    fn clear(&self) {}
}

/// FIFO queue backing a sequential audio player
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<PathBuf>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next file to play
    pub fn pop_next(&self) -> Option<PathBuf> {
        self.items.lock().pop_front()
    }

    /// Number of queued files
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copy of the queue contents, front first
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.items.lock().iter().cloned().collect()
    }
}

impl PlaybackSink for PlaybackQueue {
    fn enqueue(&self, path: &Path) {
        self.items.lock().push_back(path.to_path_buf());
    }

    fn clear(&self) {
        self.items.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = PlaybackQueue::new();
        queue.enqueue(Path::new("a.wav"));
        queue.enqueue(Path::new("b.wav"));
        queue.enqueue(Path::new("c.wav"));

        assert_eq!(queue.pop_next(), Some(PathBuf::from("a.wav")));
        assert_eq!(queue.pop_next(), Some(PathBuf::from("b.wav")));
        assert_eq!(queue.pop_next(), Some(PathBuf::from("c.wav")));
        assert_eq!(queue.pop_next(), None);
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = PlaybackQueue::new();
        queue.enqueue(Path::new("a.wav"));
        queue.enqueue(Path::new("b.wav"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
