//! Room deadline tracking
//!
//! Each client may run its own clock for a room; when the deadline passes
//! while the room is still in flight, the clock forces results. Several
//! clocks firing together is harmless because forcing results is idempotent.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Decision, Phase, Room};
use crate::phase::{require_room, PhaseController};
use crate::storage::Store;

/// Delay before re-checking after a failed store call
const RETRY_DELAY_MS: u64 = 1000;

/// What a deadline check found
#[derive(Debug, Clone, PartialEq)]
pub enum ClockStatus {
    /// Deadline still ahead
    Pending(Duration),
    /// Deadline passed and the room is now in Results
    Fired(Decision),
    /// Nothing to count down in this phase
    Idle(Phase),
}

pub struct ExpirationClock {
    store: Arc<dyn Store>,
    controller: Arc<PhaseController>,
}

impl ExpirationClock {
    pub fn new(store: Arc<dyn Store>, controller: Arc<PhaseController>) -> Self {
        Self { store, controller }
    }

    /// Time left until the deadline, never negative
    pub fn time_remaining(room: &Room, now: DateTime<Utc>) -> Duration {
        (room.expires_at - now).max(Duration::zero())
    }

    /// Compare the room's deadline against `now`, forcing results if it passed
    pub async fn check(&self, room_id: Uuid, now: DateTime<Utc>) -> Result<ClockStatus> {
        let room = require_room(self.store.as_ref(), room_id).await?;
        if !room.phase.is_in_flight() {
            return Ok(ClockStatus::Idle(room.phase));
        }

        let remaining = Self::time_remaining(&room, now);
        if remaining > Duration::zero() {
            return Ok(ClockStatus::Pending(remaining));
        }

        info!(room_id = %room_id, phase = %room.phase, "Room deadline passed");
        let decision = self.controller.force_results(room_id).await?;
        Ok(ClockStatus::Fired(decision))
    }

    /// Run a countdown task for `room_id` until the room reaches Results
    pub fn spawn(self: &Arc<Self>, room_id: Uuid) -> ClockHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_clock(self.clone(), room_id, shutdown_rx));
        ClockHandle {
            room_id,
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Handle to a running clock task. Dropping it stops the clock.
pub struct ClockHandle {
    room_id: Uuid,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ClockHandle {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for the task to end, either by firing or by `stop`
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(room_id = %self.room_id, error = %e, "Clock task failed");
            }
        }
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_clock(
    clock: Arc<ExpirationClock>,
    room_id: Uuid,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // Phase or deadline changes wake the loop early
    let mut feed = clock.store.subscribe(room_id);

    loop {
        let wait = match clock.check(room_id, Utc::now()).await {
            Ok(ClockStatus::Pending(remaining)) => {
                Some(remaining.to_std().unwrap_or(StdDuration::ZERO))
            }
            Ok(ClockStatus::Fired(decision)) => {
                info!(room_id = %room_id, decision_id = %decision.id, "Clock fired");
                break;
            }
            Ok(ClockStatus::Idle(phase)) if phase.is_terminal() => {
                debug!(room_id = %room_id, "Room already decided");
                break;
            }
            Ok(ClockStatus::Idle(_)) => None,
            Err(Error::NotFound(what)) => {
                warn!(room_id = %room_id, what = %what, "Clock stopped, room missing");
                break;
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Deadline check failed");
                Some(StdDuration::from_millis(RETRY_DELAY_MS))
            }
        };

        let sleep = async {
            match wait {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = sleep => {}
            notification = feed.next() => {
                if notification.is_none() {
                    debug!(room_id = %room_id, "Change feed closed");
                    break;
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(room_id = %room_id, "Clock stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionType, Participant, RoomDraft};
    use crate::storage::SqliteStore;
    use crate::tiebreak::TieBreaker;

    async fn setup(duration: Duration) -> (Arc<dyn Store>, Arc<ExpirationClock>, Room) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let room = Room::from_draft(
            &RoomDraft::new("Clock", DecisionType::Coin)
                .open_submission()
                .with_duration(duration),
            "CLOCK1".into(),
            Uuid::new_v4(),
            Duration::minutes(30),
        );
        store.insert_room(&room).await.unwrap();
        store
            .insert_participant(&Participant::new(room.id, room.created_by), None)
            .await
            .unwrap();
        let controller = Arc::new(PhaseController::new(
            store.clone(),
            Arc::new(TieBreaker::seeded(9)),
            8,
        ));
        let clock = Arc::new(ExpirationClock::new(store.clone(), controller));
        (store, clock, room)
    }

    #[test]
    fn test_time_remaining_never_negative() {
        let room = Room::from_draft(
            &RoomDraft::new("Timer", DecisionType::Dice),
            "TIMER1".into(),
            Uuid::new_v4(),
            Duration::minutes(10),
        );
        let remaining = ExpirationClock::time_remaining(&room, room.created_at);
        assert_eq!(remaining, Duration::minutes(10));
        let later = room.expires_at + Duration::minutes(1);
        assert_eq!(
            ExpirationClock::time_remaining(&room, later),
            Duration::zero()
        );
    }

    #[tokio::test]
    async fn test_check_fires_once_deadline_passes() {
        let (store, clock, room) = setup(Duration::minutes(5)).await;

        let status = clock.check(room.id, room.created_at).await.unwrap();
        assert!(matches!(status, ClockStatus::Pending(_)));

        let late = room.expires_at + Duration::seconds(1);
        let fired = match clock.check(room.id, late).await.unwrap() {
            ClockStatus::Fired(decision) => decision,
            other => panic!("expected fired, got {other:?}"),
        };
        assert_eq!(fired.winning_option_id, None);

        // A second clock arriving late sees the settled room
        assert_eq!(
            clock.check(room.id, late).await.unwrap(),
            ClockStatus::Idle(Phase::Results)
        );
        assert_eq!(
            store.find_decision(room.id).await.unwrap().unwrap().id,
            fired.id
        );
    }

    #[tokio::test]
    async fn test_spawned_clock_forces_results() {
        let (store, clock, room) = setup(Duration::milliseconds(50)).await;

        let mut handle = clock.spawn(room.id);
        tokio::time::timeout(StdDuration::from_secs(5), handle.finished())
            .await
            .unwrap();

        let room = store.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(room.phase, Phase::Results);
        assert!(store.find_decision(room.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clock_on_decided_room_exits() {
        let (store, clock, room) = setup(Duration::minutes(5)).await;
        store
            .finalize(&Decision::plain(room.id, None), 0)
            .await
            .unwrap();

        let mut handle = clock.spawn(room.id);
        tokio::time::timeout(StdDuration::from_secs(5), handle.finished())
            .await
            .unwrap();
        assert!(store.find_decision(room.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stopped_clock_does_not_fire() {
        let (store, clock, room) = setup(Duration::minutes(5)).await;

        let mut handle = clock.spawn(room.id);
        handle.stop();
        tokio::time::timeout(StdDuration::from_secs(5), handle.finished())
            .await
            .unwrap();

        let room = store.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(room.phase, Phase::Submission);
    }
}
