//! Participant storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::Participant;

pub struct ParticipantStore<'a> {
    conn: &'a Connection,
}

impl<'a> ParticipantStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a participant, enforcing the room's cap in the same transaction
    #[instrument(skip(self, participant), fields(room_id = %participant.room_id, user_id = %participant.user_id))]
    pub fn insert_capped(&self, participant: &Participant, cap: Option<u32>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if let Some(max) = cap {
            let count: u32 = tx.query_row(
                "SELECT COUNT(*) FROM participants WHERE room_id = ?1",
                params![participant.room_id.to_string()],
                |row| row.get(0),
            )?;
            if count >= max {
                return Err(Error::RoomFull { max });
            }
        }

        tx.execute(
            "INSERT INTO participants (id, room_id, user_id, joined_at, has_submitted, has_voted, is_ready)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                participant.id.to_string(),
                participant.room_id.to_string(),
                participant.user_id.to_string(),
                participant.joined_at.to_rfc3339(),
                participant.has_submitted as i32,
                participant.has_voted as i32,
                participant.is_ready as i32,
            ],
        )
        .map_err(|e| Error::from_insert(e, "participant"))?;

        tx.commit()?;
        Ok(())
    }

    /// Get a user's participant row in a room
    #[instrument(skip(self))]
    pub fn find(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, user_id, joined_at, has_submitted, has_voted, is_ready
             FROM participants WHERE room_id = ?1 AND user_id = ?2",
        )?;
        let participant = stmt
            .query_row(
                params![room_id.to_string(), user_id.to_string()],
                Self::map_participant,
            )
            .optional()?;
        Ok(participant)
    }

    /// List participants of a room in join order
    #[instrument(skip(self))]
    pub fn list(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, user_id, joined_at, has_submitted, has_voted, is_ready
             FROM participants WHERE room_id = ?1 ORDER BY joined_at, id",
        )?;
        let participants = stmt
            .query_map(params![room_id.to_string()], Self::map_participant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(participants)
    }

    pub fn count(&self, room_id: Uuid) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Set readiness. Returns false if no row matched.
    #[instrument(skip(self))]
    pub fn set_ready(&self, room_id: Uuid, user_id: Uuid, ready: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE participants SET is_ready = ?1 WHERE room_id = ?2 AND user_id = ?3",
            params![ready as i32, room_id.to_string(), user_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Flip `has_submitted` on. True only for the first transition.
    #[instrument(skip(self))]
    pub fn mark_submitted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE participants SET has_submitted = 1
             WHERE room_id = ?1 AND user_id = ?2 AND has_submitted = 0",
            params![room_id.to_string(), user_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Flip `has_voted` on. True only for the first transition.
    #[instrument(skip(self))]
    pub fn mark_voted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE participants SET has_voted = 1
             WHERE room_id = ?1 AND user_id = ?2 AND has_voted = 0",
            params![room_id.to_string(), user_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn map_participant(row: &Row<'_>) -> rusqlite::Result<Participant> {
        Ok(Participant {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            room_id: parse_uuid(&row.get::<_, String>(1)?)?,
            user_id: parse_uuid(&row.get::<_, String>(2)?)?,
            joined_at: parse_datetime(&row.get::<_, String>(3)?)?,
            has_submitted: row.get::<_, i32>(4)? != 0,
            has_voted: row.get::<_, i32>(5)? != 0,
            is_ready: row.get::<_, i32>(6)? != 0,
        })
    }
}
