//! Option storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::RoomOption;

pub struct OptionStore<'a> {
    conn: &'a Connection,
}

impl<'a> OptionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new option
    #[instrument(skip(self, option), fields(room_id = %option.room_id))]
    pub fn create(&self, option: &RoomOption) -> Result<()> {
        self.conn.execute(
            "INSERT INTO options (id, room_id, text, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                option.id.to_string(),
                option.room_id.to_string(),
                option.text,
                option.created_by.to_string(),
                option.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find option by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<RoomOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, text, created_by, created_at FROM options WHERE id = ?1",
        )?;
        let option = stmt
            .query_row(params![id.to_string()], Self::map_option)
            .optional()?;
        Ok(option)
    }

    /// List options for a room in submission order
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<RoomOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, text, created_by, created_at FROM options
             WHERE room_id = ?1 ORDER BY created_at, id",
        )?;
        let options = stmt
            .query_map(params![room_id.to_string()], Self::map_option)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(options)
    }

    /// Update option text
    pub fn update_text(&self, option_id: Uuid, text: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE options SET text = ?1 WHERE id = ?2",
            params![text, option_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Delete option
    pub fn delete(&self, option_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM options WHERE id = ?1",
            params![option_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn map_option(row: &Row<'_>) -> rusqlite::Result<RoomOption> {
        Ok(RoomOption {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            room_id: parse_uuid(&row.get::<_, String>(1)?)?,
            text: row.get(2)?,
            created_by: parse_uuid(&row.get::<_, String>(3)?)?,
            created_at: parse_datetime(&row.get::<_, String>(4)?)?,
        })
    }
}
