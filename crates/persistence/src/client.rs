//! Local database client

use std::path::Path;
use std::sync::Arc;

use crate::PersistenceError;

/// Shared handle to the local SQLite database
#[derive(Clone)]
pub struct LocalDatabase {
    db: Arc<libsql::Database>,
}

impl LocalDatabase {
    /// Open (or create) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::Io(e.to_string()))?;
        }
        let db = libsql::Builder::new_local(path).build().await?;
        tracing::debug!(path = %path.display(), "opened library database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a connection
    pub fn conn(&self) -> Result<libsql::Connection, PersistenceError> {
        Ok(self.db.connect()?)
    }

    /// Create every table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_name TEXT NOT NULL,
                upload_date TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_type TEXT NOT NULL
            )",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS audios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                date_generated TEXT NOT NULL,
                model TEXT NOT NULL,
                pitch REAL NOT NULL,
                speed REAL NOT NULL,
                document_id INTEGER,
                text_file_path TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(document_id) REFERENCES documents(id)
            )",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_name TEXT NOT NULL UNIQUE,
                pitch REAL NOT NULL,
                speed REAL NOT NULL,
                model TEXT NOT NULL
            )",
            (),
        )
        .await?;

        Ok(())
    }
}

/// Read an optional TEXT column
pub(crate) fn opt_text(value: libsql::Value) -> Option<String> {
    match value {
        libsql::Value::Text(s) => Some(s),
        _ => None,
    }
}

/// Read an optional INTEGER column
pub(crate) fn opt_integer(value: libsql::Value) -> Option<i64> {
    match value {
        libsql::Value::Integer(i) => Some(i),
        _ => None,
    }
}
