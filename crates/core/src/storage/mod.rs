//! SQLite storage layer for Verdict

mod decisions;
mod feed;
mod migrations;
mod options;
mod parse;
mod participants;
mod rooms;
mod sqlite;
mod traits;
mod votes;

use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

use crate::error::Result;

pub use decisions::{DecisionStore, FinalizeOutcome};
pub use feed::{ChangeEvent, ChangeStream, FeedHub, Notification, Relation};
pub use options::OptionStore;
pub use participants::ParticipantStore;
pub use rooms::{RoomFilter, RoomStore};
pub use sqlite::SqliteStore;
pub use traits::{
    ChangeFeed, DecisionRepository, OptionRepository, ParticipantRepository, RoomRepository,
    Store, VoteRepository,
};
pub use votes::VoteStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn rooms(&self) -> RoomStore<'_> {
        RoomStore::new(&self.conn)
    }

    pub fn participants(&self) -> ParticipantStore<'_> {
        ParticipantStore::new(&self.conn)
    }

    pub fn options(&self) -> OptionStore<'_> {
        OptionStore::new(&self.conn)
    }

    pub fn votes(&self) -> VoteStore<'_> {
        VoteStore::new(&self.conn)
    }

    pub fn decisions(&self) -> DecisionStore<'_> {
        DecisionStore::new(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdict.db");

        let db = Database::open(&path).unwrap();
        assert!(db.schema_version() >= 1);
        drop(db);

        // Reopening runs no migrations twice
        let db = Database::open(&path).unwrap();
        assert!(db.schema_version() >= 1);
    }
}
