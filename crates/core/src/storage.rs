//! On-device storage layout
//!
//! All generated artifacts live under one application-support root:
//! `database/` for the library database, `audiofiles/` for stitched output,
//! `textfiles/` for plain-text snapshots, `models/` for user-imported voice
//! models, and `tmp/` for per-chunk scratch files. Library records store
//! paths relative to the root so the root can move between app versions.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory layout rooted at the application-support directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at `root`. No directories are created until
    /// [`StorageLayout::ensure`] is called.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the library database
    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    /// Path of the library database file
    pub fn database_path(&self) -> PathBuf {
        self.database_dir().join("library.sqlite")
    }

    /// Directory holding stitched audio files
    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audiofiles")
    }

    /// Directory holding plain-text snapshots
    pub fn text_dir(&self) -> PathBuf {
        self.root.join("textfiles")
    }

    /// Directory holding user-imported voice models
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// Scratch directory for per-chunk audio files
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Create every directory in the layout
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.database_dir(),
            self.audio_dir(),
            self.text_dir(),
            self.models_dir(),
            self.temp_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Path relative to the storage root, for persisting in library records.
    /// Paths outside the root are returned unchanged.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Resolve a stored relative path back to an absolute one
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}
