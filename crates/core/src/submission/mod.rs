//! Option submission and per-participant progress
//!
//! Who may add, edit and remove options, plus the readiness flags the
//! creator waits on before opening the vote.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ratio, Phase, Room, RoomOption};
use crate::storage::Store;

/// Longest option text accepted
pub const MAX_OPTION_LEN: usize = 200;

pub struct SubmissionTracker {
    store: Arc<dyn Store>,
}

impl SubmissionTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add an option on behalf of `actor`
    #[instrument(skip(self, room, text), fields(room_id = %room.id, user_id = %actor))]
    pub async fn submit_option(&self, room: &Room, actor: Uuid, text: &str) -> Result<RoomOption> {
        let text = clean_text(text)?;
        if !room.accepts_submissions_from(actor) {
            return Err(Error::NotAuthorized(
                "only the room creator can add options".into(),
            ));
        }
        if room.phase != Phase::Submission {
            return Err(Error::WrongPhase {
                expected: "submission",
                actual: room.phase,
            });
        }
        if room.is_expired(Utc::now()) {
            return Err(Error::Expired);
        }
        self.require_participant(room.id, actor).await?;

        let option = RoomOption::new(room.id, actor, text);
        self.store.insert_option(&option).await?;

        // Only the first accepted option flips the flag; later ones are just more options
        match self.store.mark_submitted(room.id, actor).await {
            Ok(true) => info!("First submission"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not flag participant as submitted"),
        }

        Ok(option)
    }

    /// Change an option's text. Author or creator only, before voting opens.
    #[instrument(skip(self, room, text), fields(room_id = %room.id, user_id = %actor))]
    pub async fn update_option(
        &self,
        room: &Room,
        actor: Uuid,
        option_id: Uuid,
        text: &str,
    ) -> Result<RoomOption> {
        let text = clean_text(text)?;
        let mut option = self.editable_option(room, actor, option_id).await?;

        if !self.store.update_option_text(&option, &text).await? {
            return Err(Error::NotFound(format!("option {option_id}")));
        }
        option.text = text;
        Ok(option)
    }

    /// Remove an option. The author's `has_submitted` flag is left as it was.
    #[instrument(skip(self, room), fields(room_id = %room.id, user_id = %actor))]
    pub async fn delete_option(&self, room: &Room, actor: Uuid, option_id: Uuid) -> Result<()> {
        let option = self.editable_option(room, actor, option_id).await?;
        if !self.store.delete_option(&option).await? {
            return Err(Error::NotFound(format!("option {option_id}")));
        }
        Ok(())
    }

    /// Flag `actor` ready or not ready to move on to voting
    #[instrument(skip(self, room), fields(room_id = %room.id, user_id = %actor))]
    pub async fn set_ready(&self, room: &Room, actor: Uuid, ready: bool) -> Result<()> {
        if room.phase != Phase::Submission {
            return Err(Error::WrongPhase {
                expected: "submission",
                actual: room.phase,
            });
        }
        self.require_participant(room.id, actor).await?;
        self.store.set_ready(room.id, actor, ready).await?;
        Ok(())
    }

    /// Share of participants with at least one accepted option
    pub async fn submission_progress(&self, room_id: Uuid) -> Result<f64> {
        let participants = self.store.list_participants(room_id).await?;
        Ok(ratio(&participants, |p| p.has_submitted))
    }

    /// Share of participants flagged ready
    pub async fn ready_progress(&self, room_id: Uuid) -> Result<f64> {
        let participants = self.store.list_participants(room_id).await?;
        Ok(ratio(&participants, |p| p.is_ready))
    }

    async fn require_participant(&self, room_id: Uuid, actor: Uuid) -> Result<()> {
        match self.store.find_participant(room_id, actor).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotAuthorized("join the room first".into())),
        }
    }

    async fn editable_option(&self, room: &Room, actor: Uuid, option_id: Uuid) -> Result<RoomOption> {
        if room.phase > Phase::Submission {
            return Err(Error::WrongPhase {
                expected: "lobby or submission",
                actual: room.phase,
            });
        }

        let option = match self.store.find_option(option_id).await? {
            Some(option) if option.room_id == room.id => option,
            _ => return Err(Error::NotFound(format!("option {option_id} in this room"))),
        };
        if option.created_by != actor && !room.is_creator(actor) {
            return Err(Error::NotAuthorized(
                "only the author or the room creator can change an option".into(),
            ));
        }
        Ok(option)
    }
}

fn clean_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Validation("option text cannot be empty".into()));
    }
    if text.chars().count() > MAX_OPTION_LEN {
        return Err(Error::Validation(format!(
            "option text is limited to {MAX_OPTION_LEN} characters"
        )));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionType, Participant, RoomDraft};
    use crate::storage::SqliteStore;

    async fn setup(draft: RoomDraft) -> (Arc<dyn Store>, Room, Uuid) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let creator = Uuid::new_v4();
        let room = Room::from_draft(
            &draft.open_submission(),
            "SUBMIT".into(),
            creator,
            chrono::Duration::minutes(30),
        );
        store.insert_room(&room).await.unwrap();
        store
            .insert_participant(&Participant::new(room.id, creator), None)
            .await
            .unwrap();
        (store, room, creator)
    }

    async fn join(store: &Arc<dyn Store>, room: &Room) -> Uuid {
        let user = Uuid::new_v4();
        store
            .insert_participant(&Participant::new(room.id, user), None)
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_creator_only_rejects_others() {
        let (store, room, _) =
            setup(RoomDraft::new("Board game", DecisionType::Dice).creator_only_submissions()).await;
        let guest = join(&store, &room).await;
        let tracker = SubmissionTracker::new(store.clone());

        let err = tracker
            .submit_option(&room, guest, "Catan")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
        assert!(store.list_options(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let (store, room, creator) = setup(RoomDraft::new("Dinner", DecisionType::Coin)).await;
        let tracker = SubmissionTracker::new(store.clone());

        let err = tracker.submit_option(&room, creator, "   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list_options(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_counts_first_submission_once() {
        let (store, room, creator) = setup(RoomDraft::new("Dinner", DecisionType::Coin)).await;
        let guest = join(&store, &room).await;
        let tracker = SubmissionTracker::new(store.clone());

        assert_eq!(tracker.submission_progress(room.id).await.unwrap(), 0.0);
        tracker.submit_option(&room, creator, "Pizza").await.unwrap();
        let second = tracker.submit_option(&room, creator, "Ramen").await.unwrap();
        assert_eq!(tracker.submission_progress(room.id).await.unwrap(), 0.5);

        // Deleting keeps the flag
        tracker.delete_option(&room, creator, second.id).await.unwrap();
        assert_eq!(store.list_options(room.id).await.unwrap().len(), 1);
        assert_eq!(tracker.submission_progress(room.id).await.unwrap(), 0.5);

        tracker.submit_option(&room, guest, "Sushi").await.unwrap();
        assert_eq!(tracker.submission_progress(room.id).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_edit_permissions() {
        let (store, room, creator) = setup(RoomDraft::new("Trip", DecisionType::Spinner)).await;
        let author = join(&store, &room).await;
        let bystander = join(&store, &room).await;
        let tracker = SubmissionTracker::new(store.clone());

        let option = tracker.submit_option(&room, author, "Lisbon").await.unwrap();

        let err = tracker
            .update_option(&room, bystander, option.id, "Porto")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        let renamed = tracker
            .update_option(&room, author, option.id, " Porto ")
            .await
            .unwrap();
        assert_eq!(renamed.text, "Porto");

        tracker.delete_option(&room, creator, option.id).await.unwrap();
        assert!(store.find_option(option.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ready_progress() {
        let (store, room, creator) = setup(RoomDraft::new("Film", DecisionType::Coin)).await;
        let guest = join(&store, &room).await;
        let tracker = SubmissionTracker::new(store.clone());

        tracker.set_ready(&room, guest, true).await.unwrap();
        assert_eq!(tracker.ready_progress(room.id).await.unwrap(), 0.5);
        tracker.set_ready(&room, creator, true).await.unwrap();
        assert_eq!(tracker.ready_progress(room.id).await.unwrap(), 1.0);

        let err = tracker
            .set_ready(&room, Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
    }
}
