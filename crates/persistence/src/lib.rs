//! Local library persistence for the note reader
//!
//! Provides on-device storage for:
//! - Audio records (the library of generated audio)
//! - Voice profiles (named pitch/speed/model presets)
//! - Imported documents
//!
//! Backed by a local SQLite database; every store is a trait so the
//! pipeline and UI layers stay storage-agnostic.

pub mod client;
pub mod documents;
pub mod error;
pub mod library;
pub mod profiles;

pub use client::LocalDatabase;
pub use documents::{DocumentStore, LibsqlDocuments};
pub use error::PersistenceError;
pub use library::{AudioQuery, LibraryStore, LibsqlLibrary, SortField, SortOrder};
pub use profiles::{LibsqlProfiles, ProfileStore};

use note_reader_core::StorageLayout;

/// Combined persistence layer with all stores
pub struct PersistenceLayer {
    pub library: LibsqlLibrary,
    pub profiles: LibsqlProfiles,
    pub documents: LibsqlDocuments,
}

/// Open the local database under the storage layout and ensure the schema
/// exists.
pub async fn init(layout: &StorageLayout) -> Result<PersistenceLayer, PersistenceError> {
    layout
        .ensure()
        .map_err(|e| PersistenceError::Io(e.to_string()))?;
    let db = LocalDatabase::open(&layout.database_path()).await?;
    db.ensure_schema().await?;

    Ok(PersistenceLayer {
        library: LibsqlLibrary::new(db.clone()),
        profiles: LibsqlProfiles::new(db.clone()),
        documents: LibsqlDocuments::new(db),
    })
}
