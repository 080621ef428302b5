//! Room storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_decision_type, parse_phase, parse_uuid, OptionalExt};
use crate::code;
use crate::error::{Error, Result};
use crate::invariants;
use crate::models::{Phase, Room};

const ROOM_COLUMNS: &str = "id, code, name, description, decision_type, phase, allow_everyone_to_submit, \
     hide_results_until_end, max_participants, expires_at, created_by, created_at";

/// Which of a user's rooms to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomFilter {
    /// Rooms that have not reached Results
    Active,
    /// Rooms with a final decision
    Finished,
}

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new room
    #[instrument(skip(self, room), fields(room_id = %room.id, code = %room.code))]
    pub fn create(&self, room: &Room) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO rooms (id, code, name, description, decision_type, phase, allow_everyone_to_submit,
                    hide_results_until_end, max_participants, expires_at, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    room.id.to_string(),
                    room.code,
                    room.name,
                    room.description,
                    room.decision_type.as_str(),
                    room.phase.as_str(),
                    room.allow_everyone_to_submit as i32,
                    room.hide_results_until_end as i32,
                    room.max_participants,
                    room.expires_at.to_rfc3339(),
                    room.created_by.to_string(),
                    room.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::from_insert(e, "room code"))?;
        Ok(())
    }

    /// Find room by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"))?;
        let room = stmt
            .query_row(params![id.to_string()], Self::map_room)
            .optional()?;
        Ok(room)
    }

    /// Find room by its share code (already normalized)
    #[instrument(skip(self))]
    pub fn find_by_code(&self, code: &str) -> Result<Option<Room>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE code = ?1"))?;
        let room = stmt.query_row(params![code], Self::map_room).optional()?;
        Ok(room)
    }

    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rooms WHERE code = ?1",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Draw codes until one is free. `None` when every attempt collided.
    pub fn generate_code(&self, attempts: u32) -> Result<Option<String>> {
        let mut rng = rand::thread_rng();
        for _ in 0..attempts {
            let candidate = code::random_code(&mut rng);
            if !self.code_exists(&candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Compare-and-swap the phase. Returns false if the room was not in `from`.
    #[instrument(skip(self))]
    pub fn advance_phase(&self, room_id: Uuid, from: Phase, to: Phase) -> Result<bool> {
        invariants::assert_phase_advance(room_id, from, to);
        let changed = self.conn.execute(
            "UPDATE rooms SET phase = ?1 WHERE id = ?2 AND phase = ?3",
            params![to.as_str(), room_id.to_string(), from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// List rooms the user participates in, newest first
    #[instrument(skip(self))]
    pub fn list_for_user(&self, user_id: Uuid, filter: RoomFilter) -> Result<Vec<Room>> {
        let phase_clause = match filter {
            RoomFilter::Active => "r.phase != 'results'",
            RoomFilter::Finished => "r.phase = 'results'",
        };
        let columns = ROOM_COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns} FROM rooms r
             INNER JOIN participants p ON p.room_id = r.id
             WHERE p.user_id = ?1 AND {phase_clause}
             ORDER BY r.created_at DESC"
        ))?;

        let rooms = stmt
            .query_map(params![user_id.to_string()], Self::map_room)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    fn map_room(row: &Row<'_>) -> rusqlite::Result<Room> {
        Ok(Room {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            code: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            decision_type: parse_decision_type(&row.get::<_, String>(4)?)?,
            phase: parse_phase(&row.get::<_, String>(5)?)?,
            allow_everyone_to_submit: row.get::<_, i32>(6)? != 0,
            hide_results_until_end: row.get::<_, i32>(7)? != 0,
            max_participants: row.get(8)?,
            expires_at: parse_datetime(&row.get::<_, String>(9)?)?,
            created_by: parse_uuid(&row.get::<_, String>(10)?)?,
            created_at: parse_datetime(&row.get::<_, String>(11)?)?,
        })
    }
}
