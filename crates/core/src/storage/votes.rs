//! Vote storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_phase, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::{Phase, Vote};

pub struct VoteStore<'a> {
    conn: &'a Connection,
}

impl<'a> VoteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a vote while the room is still in Voting.
    ///
    /// The phase check and the insert share a transaction so a vote can never
    /// land after the room has been finalized.
    #[instrument(skip(self, vote), fields(room_id = %vote.room_id, user_id = %vote.user_id))]
    pub fn insert_while_voting(&self, vote: &Vote) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let phase = tx
            .query_row(
                "SELECT phase FROM rooms WHERE id = ?1",
                params![vote.room_id.to_string()],
                |row| parse_phase(&row.get::<_, String>(0)?),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("room {}", vote.room_id)))?;
        if phase != Phase::Voting {
            return Err(Error::WrongPhase {
                expected: "voting",
                actual: phase,
            });
        }

        tx.execute(
            "INSERT INTO votes (id, room_id, option_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                vote.id.to_string(),
                vote.room_id.to_string(),
                vote.option_id.to_string(),
                vote.user_id.to_string(),
                vote.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::from_insert(e, "vote for this user"))?;

        tx.commit()?;
        Ok(())
    }

    /// List all votes cast in a room
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<Vote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, option_id, user_id, created_at FROM votes
             WHERE room_id = ?1 ORDER BY created_at, id",
        )?;
        let votes = stmt
            .query_map(params![room_id.to_string()], Self::map_vote)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(votes)
    }

    pub fn count_for_room(&self, room_id: Uuid) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn map_vote(row: &Row<'_>) -> rusqlite::Result<Vote> {
        Ok(Vote {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            room_id: parse_uuid(&row.get::<_, String>(1)?)?,
            option_id: parse_uuid(&row.get::<_, String>(2)?)?,
            user_id: parse_uuid(&row.get::<_, String>(3)?)?,
            created_at: parse_datetime(&row.get::<_, String>(4)?)?,
        })
    }
}
