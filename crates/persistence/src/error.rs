//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(String),

    #[error("record not found: {0}")]
    NotFound(i64),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<libsql::Error> for PersistenceError {
    fn from(e: libsql::Error) -> Self {
        PersistenceError::Database(e.to_string())
    }
}

impl From<PersistenceError> for note_reader_core::Error {
    fn from(err: PersistenceError) -> Self {
        note_reader_core::Error::Persistence(err.to_string())
    }
}
