//! Room lifecycle state machine
//!
//! Lobby -> Submission -> Voting -> Results. Every move is a compare-and-swap
//! in the store, so clients racing on the same room agree on one history.
//! Entering Results writes the room's single Decision in the same step.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants;
use crate::models::{Decision, Phase, Room};
use crate::storage::{FinalizeOutcome, Store};
use crate::tally::{Outcome, Tally, VoteTally};
use crate::tiebreak::TieBreaker;

pub struct PhaseController {
    store: Arc<dyn Store>,
    tally: VoteTally,
    breaker: Arc<TieBreaker>,
    finalize_attempts: u32,
}

impl PhaseController {
    pub fn new(store: Arc<dyn Store>, breaker: Arc<TieBreaker>, finalize_attempts: u32) -> Self {
        Self {
            tally: VoteTally::new(store.clone()),
            store,
            breaker,
            finalize_attempts: finalize_attempts.max(1),
        }
    }

    /// Lobby -> Submission. Already in Submission is a no-op.
    #[instrument(skip(self))]
    pub async fn start_submission(&self, room_id: Uuid) -> Result<()> {
        let room = require_room(self.store.as_ref(), room_id).await?;
        match room.phase {
            Phase::Submission => return Ok(()),
            Phase::Lobby => {}
            actual => {
                return Err(Error::WrongPhase {
                    expected: "lobby",
                    actual,
                })
            }
        }

        if self
            .store
            .advance_phase(room_id, Phase::Lobby, Phase::Submission)
            .await?
        {
            info!("Submission opened");
            return Ok(());
        }

        // Lost the race; fine if the winner moved it to the same place
        let room = require_room(self.store.as_ref(), room_id).await?;
        if room.phase == Phase::Submission {
            Ok(())
        } else {
            Err(Error::WrongPhase {
                expected: "lobby",
                actual: room.phase,
            })
        }
    }

    /// Submission -> Voting, creator only, once everyone else is ready
    #[instrument(skip(self))]
    pub async fn request_voting(&self, room_id: Uuid, actor: Uuid) -> Result<()> {
        let room = require_room(self.store.as_ref(), room_id).await?;
        if !room.is_creator(actor) {
            return Err(Error::NotAuthorized(
                "only the room creator can start voting".into(),
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

        // The creator's request is their own readiness signal
        let participants = self.store.list_participants(room_id).await?;
        let others: Vec<_> = participants
            .iter()
            .filter(|p| p.user_id != actor)
            .collect();
        let ready = others.iter().filter(|p| p.is_ready).count();
        if ready < others.len() {
            return Err(Error::NotReady {
                ready,
                total: others.len(),
            });
        }

        if !self
            .store
            .advance_phase(room_id, Phase::Submission, Phase::Voting)
            .await?
        {
            let room = require_room(self.store.as_ref(), room_id).await?;
            return Err(Error::WrongPhase {
                expected: "submission",
                actual: room.phase,
            });
        }

        info!(participants = participants.len(), "Voting opened");
        Ok(())
    }

    /// Submission|Voting -> Results, writing the decision.
    ///
    /// Safe to call from many clients at once: exactly one write wins and
    /// every caller gets the stored decision back.
    #[instrument(skip(self))]
    pub async fn force_results(&self, room_id: Uuid) -> Result<Decision> {
        for attempt in 1..=self.finalize_attempts {
            let room = require_room(self.store.as_ref(), room_id).await?;
            match room.phase {
                Phase::Results => return self.stored_decision(room_id).await,
                Phase::Lobby => {
                    return Err(Error::WrongPhase {
                        expected: "submission or voting",
                        actual: Phase::Lobby,
                    })
                }
                Phase::Submission | Phase::Voting => {}
            }

            let tally = self.tally.tally(room_id).await?;
            let decision = self.decide(&room, &tally)?;

            match self.store.finalize(&decision, tally.vote_rows()).await? {
                FinalizeOutcome::Finalized => {
                    let options = self.store.list_options(room_id).await?;
                    invariants::assert_decision_invariants(&decision, &room, &options);
                    info!(
                        winner = ?decision.winning_option_id,
                        tie_break = decision.tie_breaker_used,
                        votes = tally.vote_rows(),
                        "Results decided"
                    );
                    return Ok(decision);
                }
                FinalizeOutcome::AlreadyFinal => return self.stored_decision(room_id).await,
                FinalizeOutcome::Stale => {
                    debug!(attempt, "Votes changed during tally, retrying");
                }
                FinalizeOutcome::NotEligible(actual) => {
                    return Err(Error::WrongPhase {
                        expected: "submission or voting",
                        actual,
                    })
                }
            }
        }

        warn!(attempts = self.finalize_attempts, "Could not settle the tally");
        Err(Error::Conflict(
            "votes kept changing while results were being written".into(),
        ))
    }

    /// Close the room once every participant has voted
    #[instrument(skip(self))]
    pub async fn after_vote(&self, room_id: Uuid) -> Result<Option<Decision>> {
        if !self.tally.all_voted(room_id).await? {
            return Ok(None);
        }
        debug!("Everyone has voted");
        self.force_results(room_id).await.map(Some)
    }

    /// Turn a tally into the decision for `room`
    pub fn decide(&self, room: &Room, tally: &Tally) -> Result<Decision> {
        let decision = match tally.winner() {
            Outcome::Unique(winner) => Decision::plain(room.id, Some(winner)),
            Outcome::Tie(tied) => {
                let result = self.breaker.resolve(&tied, room.decision_type)?;
                Decision::tie_broken(room.id, result.winner, result.kind)
            }
            Outcome::None => Decision::plain(room.id, None),
        };
        Ok(decision)
    }

    async fn stored_decision(&self, room_id: Uuid) -> Result<Decision> {
        self.store
            .find_decision(room_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("decision for room {room_id}")))
    }
}

/// Load a room or fail with `NotFound`
pub(crate) async fn require_room(store: &dyn Store, room_id: Uuid) -> Result<Room> {
    store
        .find_room(room_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("room {room_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionType, Participant, RoomDraft, RoomOption, Vote};
    use crate::storage::SqliteStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<dyn Store>,
        controller: Arc<PhaseController>,
        room: Room,
    }

    async fn fixture(draft: RoomDraft, seed: u64) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let room = Room::from_draft(&draft, "PHASE1".into(), Uuid::new_v4(), Duration::minutes(30));
        store.insert_room(&room).await.unwrap();
        store
            .insert_participant(&Participant::new(room.id, room.created_by), None)
            .await
            .unwrap();
        let controller = Arc::new(PhaseController::new(
            store.clone(),
            Arc::new(TieBreaker::seeded(seed)),
            8,
        ));
        Fixture {
            store,
            controller,
            room,
        }
    }

    async fn add_user(f: &Fixture) -> Uuid {
        let user = Uuid::new_v4();
        f.store
            .insert_participant(&Participant::new(f.room.id, user), None)
            .await
            .unwrap();
        user
    }

    async fn add_option(f: &Fixture, text: &str) -> RoomOption {
        let option = RoomOption::new(f.room.id, f.room.created_by, text.into());
        f.store.insert_option(&option).await.unwrap();
        option
    }

    async fn phase(f: &Fixture) -> Phase {
        f.store.find_room(f.room.id).await.unwrap().unwrap().phase
    }

    #[tokio::test]
    async fn test_phases_only_move_forward() {
        let f = fixture(RoomDraft::new("Order", DecisionType::Dice), 1).await;
        let mut seen = vec![phase(&f).await];

        f.controller.start_submission(f.room.id).await.unwrap();
        f.controller.start_submission(f.room.id).await.unwrap();
        seen.push(phase(&f).await);

        f.controller
            .request_voting(f.room.id, f.room.created_by)
            .await
            .unwrap();
        seen.push(phase(&f).await);

        let err = f.controller.start_submission(f.room.id).await.unwrap_err();
        assert!(matches!(err, Error::WrongPhase { .. }));
        seen.push(phase(&f).await);

        f.controller.force_results(f.room.id).await.unwrap();
        seen.push(phase(&f).await);

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&Phase::Results));
    }

    #[tokio::test]
    async fn test_request_voting_guards() {
        let f = fixture(
            RoomDraft::new("Quorum", DecisionType::Coin).open_submission(),
            2,
        )
        .await;
        let guest = add_user(&f).await;

        let err = f
            .controller
            .request_voting(f.room.id, guest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        let err = f
            .controller
            .request_voting(f.room.id, f.room.created_by)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotReady { ready: 0, total: 1 }));

        f.store.set_ready(f.room.id, guest, true).await.unwrap();
        f.controller
            .request_voting(f.room.id, f.room.created_by)
            .await
            .unwrap();
        assert_eq!(phase(&f).await, Phase::Voting);
    }

    #[tokio::test]
    async fn test_lonely_creator_passes_quorum() {
        let f = fixture(
            RoomDraft::new("Solo", DecisionType::Spinner).open_submission(),
            3,
        )
        .await;
        f.controller
            .request_voting(f.room.id, f.room.created_by)
            .await
            .unwrap();
        assert_eq!(phase(&f).await, Phase::Voting);
    }

    #[tokio::test]
    async fn test_coin_tie_is_broken() {
        let f = fixture(
            RoomDraft::new("Dinner", DecisionType::Coin).open_submission(),
            4,
        )
        .await;
        let guest = add_user(&f).await;
        let pizza = add_option(&f, "Pizza").await;
        let sushi = add_option(&f, "Sushi").await;
        f.store
            .advance_phase(f.room.id, Phase::Submission, Phase::Voting)
            .await
            .unwrap();

        f.store
            .insert_vote(&Vote::new(f.room.id, pizza.id, f.room.created_by))
            .await
            .unwrap();
        f.store
            .insert_vote(&Vote::new(f.room.id, sushi.id, guest))
            .await
            .unwrap();

        let decision = f.controller.force_results(f.room.id).await.unwrap();
        assert!(decision.tie_breaker_used);
        assert_eq!(decision.tie_breaker_type, Some(DecisionType::Coin));
        let winner = decision.winning_option_id.unwrap();
        assert!(winner == pizza.id || winner == sushi.id);
    }

    #[tokio::test]
    async fn test_unique_winner_and_empty_room() {
        let f = fixture(
            RoomDraft::new("Walk", DecisionType::Dice).open_submission(),
            5,
        )
        .await;
        let park = add_option(&f, "Park").await;
        add_option(&f, "Beach").await;
        f.store
            .advance_phase(f.room.id, Phase::Submission, Phase::Voting)
            .await
            .unwrap();
        f.store
            .insert_vote(&Vote::new(f.room.id, park.id, f.room.created_by))
            .await
            .unwrap();

        let decision = f.controller.force_results(f.room.id).await.unwrap();
        assert_eq!(decision.winning_option_id, Some(park.id));
        assert!(!decision.tie_breaker_used);
        assert_eq!(decision.tie_breaker_type, None);

        let empty = fixture(
            RoomDraft::new("Nobody", DecisionType::Dice).open_submission(),
            6,
        )
        .await;
        let decision = empty.controller.force_results(empty.room.id).await.unwrap();
        assert_eq!(decision.winning_option_id, None);
        assert!(!decision.tie_breaker_used);
    }

    #[tokio::test]
    async fn test_force_results_from_lobby_rejected() {
        let f = fixture(RoomDraft::new("Early", DecisionType::Coin), 7).await;
        let err = f.controller.force_results(f.room.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::WrongPhase {
                actual: Phase::Lobby,
                ..
            }
        ));
        assert!(f.store.find_decision(f.room.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_force_results_decide_once() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let mut room = Room::from_draft(
            &RoomDraft::new("Expired", DecisionType::Spinner).open_submission(),
            "RACE01".into(),
            Uuid::new_v4(),
            Duration::minutes(30),
        );
        room.expires_at = Utc::now() - Duration::seconds(1);
        store.insert_room(&room).await.unwrap();
        let option = RoomOption::new(room.id, room.created_by, "Go".into());
        store.insert_option(&option).await.unwrap();

        // Two independent clients sharing only the store
        let a = Arc::new(PhaseController::new(store.clone(), Arc::new(TieBreaker::seeded(1)), 8));
        let b = Arc::new(PhaseController::new(store.clone(), Arc::new(TieBreaker::seeded(2)), 8));
        let room_id = room.id;
        let first = tokio::spawn(async move { a.force_results(room_id).await });
        let second = tokio::spawn(async move { b.force_results(room_id).await });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let stored = store.find_decision(room.id).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(
            store.find_room(room.id).await.unwrap().unwrap().phase,
            Phase::Results
        );
    }

    #[tokio::test]
    async fn test_after_vote_closes_full_room() {
        let f = fixture(
            RoomDraft::new("Auto", DecisionType::Coin).open_submission(),
            8,
        )
        .await;
        let guest = add_user(&f).await;
        let option = add_option(&f, "Only").await;
        f.store
            .advance_phase(f.room.id, Phase::Submission, Phase::Voting)
            .await
            .unwrap();

        f.store
            .insert_vote(&Vote::new(f.room.id, option.id, f.room.created_by))
            .await
            .unwrap();
        f.store
            .mark_voted(f.room.id, f.room.created_by)
            .await
            .unwrap();
        assert!(f.controller.after_vote(f.room.id).await.unwrap().is_none());

        f.store
            .insert_vote(&Vote::new(f.room.id, option.id, guest))
            .await
            .unwrap();
        let decision = f.controller.after_vote(f.room.id).await.unwrap().unwrap();
        assert_eq!(decision.winning_option_id, Some(option.id));
        assert_eq!(phase(&f).await, Phase::Results);
    }
}
