//! Imported document store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use note_reader_core::DocumentRecord;

use crate::{LocalDatabase, PersistenceError};

/// Imported document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: &DocumentRecord) -> Result<i64, PersistenceError>;
    async fn get(&self, id: i64) -> Result<Option<DocumentRecord>, PersistenceError>;
    async fn list(&self) -> Result<Vec<DocumentRecord>, PersistenceError>;
    async fn delete(&self, id: i64) -> Result<(), PersistenceError>;
}

/// SQLite-backed document store
#[derive(Clone)]
pub struct LibsqlDocuments {
    db: LocalDatabase,
}

impl LibsqlDocuments {
    pub fn new(db: LocalDatabase) -> Self {
        Self { db }
    }

    fn document_from_row(row: &libsql::Row) -> Result<DocumentRecord, PersistenceError> {
        let date_text = row.get::<String>(2)?;
        let upload_date = DateTime::parse_from_rfc3339(&date_text)
            .map_err(|e| PersistenceError::InvalidData(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(DocumentRecord {
            id: row.get::<i64>(0)?,
            name: row.get::<String>(1)?,
            upload_date,
            file_path: row.get::<String>(3)?,
            file_type: row.get::<String>(4)?,
        })
    }
}

#[async_trait]
impl DocumentStore for LibsqlDocuments {
    async fn insert(&self, document: &DocumentRecord) -> Result<i64, PersistenceError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO documents (document_name, upload_date, file_path, file_type)
             VALUES (?, ?, ?, ?)",
            libsql::params![
                document.name.as_str(),
                document.upload_date.to_rfc3339(),
                document.file_path.as_str(),
                document.file_type.as_str(),
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<DocumentRecord>, PersistenceError> {
        let conn = self.db.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, document_name, upload_date, file_path, file_type
                 FROM documents WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::document_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, PersistenceError> {
        let conn = self.db.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, document_name, upload_date, file_path, file_type
                 FROM documents ORDER BY upload_date DESC",
                (),
            )
            .await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::document_from_row(&row)?);
        }
        Ok(documents)
    }

    async fn delete(&self, id: i64) -> Result<(), PersistenceError> {
        let conn = self.db.conn()?;
        let changed = conn
            .execute("DELETE FROM documents WHERE id = ?", libsql::params![id])
            .await?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        Ok(())
    }
}
