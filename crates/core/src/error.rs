//! Error types for Verdict Core

use thiserror::Error;

use crate::models::Phase;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Not allowed: {0}")]
    NotAuthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Room is full ({max} participants)")]
    RoomFull { max: u32 },

    #[error("Not everyone is ready ({ready}/{total})")]
    NotReady { ready: usize, total: usize },

    #[error("Room has expired")]
    Expired,

    #[error("Room is in the {actual} phase, expected {expected}")]
    WrongPhase { expected: &'static str, actual: Phase },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Translate a SQLite unique-constraint violation into `Conflict`
    pub(crate) fn from_insert(err: rusqlite::Error, what: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Error::Conflict(format!("{what} already exists"))
            }
            other => Error::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
