//! Audio record store
//!
//! The library of generated audio: insert on run completion, then search,
//! filter, sort, rename, favorite, and delete from the UI layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use note_reader_core::{AudioRecord, LibrarySink};
use serde::{Deserialize, Serialize};

use crate::client::{opt_integer, opt_text};
use crate::{LocalDatabase, PersistenceError};

/// Sortable record fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    #[default]
    DateGenerated,
    Duration,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::DateGenerated => "date_generated",
            SortField::Duration => "duration_seconds",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Search/filter/sort parameters for listing the library
#[derive(Debug, Clone, Default)]
pub struct AudioQuery {
    /// Case-insensitive name substring
    pub search: Option<String>,
    /// Restrict to one voice model
    pub model: Option<String>,
    /// Only favorited records
    pub favorites_only: bool,
    /// Only records linked to this document
    pub document_id: Option<i64>,
    /// Sort field
    pub sort: SortField,
    /// Sort direction
    pub order: SortOrder,
    /// Maximum number of records returned
    pub limit: Option<i64>,
}

/// Audio record store
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn insert(&self, record: &AudioRecord) -> Result<i64, PersistenceError>;
    async fn get(&self, id: i64) -> Result<Option<AudioRecord>, PersistenceError>;
    async fn list(&self, query: &AudioQuery) -> Result<Vec<AudioRecord>, PersistenceError>;
    async fn rename(&self, id: i64, name: &str) -> Result<(), PersistenceError>;
    async fn set_favorite(&self, id: i64, favorite: bool) -> Result<(), PersistenceError>;
    async fn delete(&self, id: i64) -> Result<(), PersistenceError>;
}

/// SQLite-backed library store
#[derive(Clone)]
pub struct LibsqlLibrary {
    db: LocalDatabase,
}

impl LibsqlLibrary {
    pub fn new(db: LocalDatabase) -> Self {
        Self { db }
    }

    fn record_from_row(row: &libsql::Row) -> Result<AudioRecord, PersistenceError> {
        let date_text = row.get::<String>(3)?;
        let date_generated = DateTime::parse_from_rfc3339(&date_text)
            .map_err(|e| PersistenceError::InvalidData(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(AudioRecord {
            id: row.get::<i64>(0)?,
            name: row.get::<String>(1)?,
            file_path: row.get::<String>(2)?,
            date_generated,
            model: row.get::<String>(4)?,
            pitch: row.get::<f64>(5)?,
            speed: row.get::<f64>(6)?,
            document_id: opt_integer(row.get_value(7)?),
            text_file_path: opt_text(row.get_value(8)?),
            duration_seconds: row.get::<i64>(9)?,
            is_favorite: row.get::<i64>(10)? != 0,
        })
    }
}

const AUDIO_COLUMNS: &str = "id, name, file_path, date_generated, model, pitch, speed, \
     document_id, text_file_path, duration_seconds, is_favorite";

#[async_trait]
impl LibraryStore for LibsqlLibrary {
    async fn insert(&self, record: &AudioRecord) -> Result<i64, PersistenceError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO audios (
                name, file_path, date_generated, model, pitch, speed,
                document_id, text_file_path, duration_seconds, is_favorite
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                record.name.as_str(),
                record.file_path.as_str(),
                record.date_generated.to_rfc3339(),
                record.model.as_str(),
                record.pitch,
                record.speed,
                record.document_id,
                record.text_file_path.clone(),
                record.duration_seconds,
                record.is_favorite as i64,
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        tracing::debug!(id, name = %record.name, "audio record inserted");
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<AudioRecord>, PersistenceError> {
        let conn = self.db.conn()?;
        let mut rows = conn
            .query(
                &format!("SELECT {AUDIO_COLUMNS} FROM audios WHERE id = ?"),
                libsql::params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &AudioQuery) -> Result<Vec<AudioRecord>, PersistenceError> {
        let mut sql = format!("SELECT {AUDIO_COLUMNS} FROM audios");
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(search) = &query.search {
            clauses.push("name LIKE ?");
            params.push(libsql::Value::Text(format!("%{search}%")));
        }
        if let Some(model) = &query.model {
            clauses.push("model = ?");
            params.push(libsql::Value::Text(model.clone()));
        }
        if query.favorites_only {
            clauses.push("is_favorite = 1");
        }
        if let Some(document_id) = query.document_id {
            clauses.push("document_id = ?");
            params.push(libsql::Value::Integer(document_id));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY {} {}",
            query.sort.column(),
            query.order.keyword()
        ));
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params.push(libsql::Value::Integer(limit));
        }

        let conn = self.db.conn()?;
        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::record_from_row(&row)?);
        }
        Ok(records)
    }

    async fn rename(&self, id: i64, name: &str) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute(
                "UPDATE audios SET name = ? WHERE id = ?",
                libsql::params![name, id],
            )
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        Ok(())
    }

    async fn set_favorite(&self, id: i64, favorite: bool) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute(
                "UPDATE audios SET is_favorite = ? WHERE id = ?",
                libsql::params![favorite as i64, id],
            )
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute("DELETE FROM audios WHERE id = ?", libsql::params![id])
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        tracing::debug!(id, "audio record deleted");
        Ok(())
    }
}

#[async_trait]
impl LibrarySink for LibsqlLibrary {
    async fn record_artifact(&self, record: AudioRecord) -> note_reader_core::Result<i64> {
        Ok(self.insert(&record).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use note_reader_core::StorageLayout;

    async fn open_store() -> (LibsqlLibrary, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let layer = crate::init(&layout).await.unwrap();
        (layer.library, dir)
    }

    fn record(name: &str, model: &str, duration: i64) -> AudioRecord {
        AudioRecord {
            id: 0,
            name: name.to_string(),
            file_path: format!("audiofiles/{name}.wav"),
            date_generated: Utc::now(),
            model: model.to_string(),
            pitch: 1.0,
            speed: 1.0,
            document_id: None,
            text_file_path: Some(format!("textfiles/{name}.txt")),
            duration_seconds: duration,
            is_favorite: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (store, _dir) = open_store().await;

        let id = store.insert(&record("First note", "amy", 12)).await.unwrap();
        assert!(id > 0);

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.name, "First note");
        assert_eq!(loaded.model, "amy");
        assert_eq!(loaded.duration_seconds, 12);
        assert_eq!(loaded.document_id, None);
        assert!(loaded.text_file_path.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _dir) = open_store().await;
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_filters_by_name() {
        let (store, _dir) = open_store().await;
        store.insert(&record("Morning notes", "amy", 5)).await.unwrap();
        store.insert(&record("Evening recap", "amy", 7)).await.unwrap();

        let query = AudioQuery {
            search: Some("Morning".to_string()),
            ..Default::default()
        };
        let results = store.list(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Morning notes");
    }

    #[tokio::test]
    async fn test_sort_by_duration() {
        let (store, _dir) = open_store().await;
        store.insert(&record("short", "amy", 3)).await.unwrap();
        store.insert(&record("long", "amy", 30)).await.unwrap();
        store.insert(&record("medium", "amy", 10)).await.unwrap();

        let query = AudioQuery {
            sort: SortField::Duration,
            order: SortOrder::Ascending,
            ..Default::default()
        };
        let results = store.list(&query).await.unwrap();
        let durations: Vec<i64> = results.iter().map(|r| r.duration_seconds).collect();
        assert_eq!(durations, vec![3, 10, 30]);
    }

    #[tokio::test]
    async fn test_favorite_toggle_and_filter() {
        let (store, _dir) = open_store().await;
        let id = store.insert(&record("keeper", "amy", 5)).await.unwrap();
        store.insert(&record("other", "amy", 5)).await.unwrap();

        store.set_favorite(id, true).await.unwrap();

        let query = AudioQuery {
            favorites_only: true,
            ..Default::default()
        };
        let results = store.list(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert!(results[0].is_favorite);
    }

    #[tokio::test]
    async fn test_model_filter() {
        let (store, _dir) = open_store().await;
        store.insert(&record("one", "amy", 5)).await.unwrap();
        store.insert(&record("two", "kristin", 5)).await.unwrap();

        let query = AudioQuery {
            model: Some("kristin".to_string()),
            ..Default::default()
        };
        let results = store.list(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "two");
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let (store, _dir) = open_store().await;
        let id = store.insert(&record("draft", "amy", 5)).await.unwrap();

        store.rename(id, "final").await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().name, "final");

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(id).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_artifact_sink() {
        let (store, _dir) = open_store().await;
        let id = LibrarySink::record_artifact(&store, record("via sink", "amy", 8))
            .await
            .unwrap();
        assert!(store.get(id).await.unwrap().is_some());
    }
}
