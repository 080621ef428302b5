//! Change-feed listener for one room
//!
//! Subscribes on entry, re-reads whichever relation a notification names and
//! publishes the new snapshot through a watch channel. Readers always see a
//! whole snapshot, never a half-applied one.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use verdict_core::storage::{ChangeStream, Notification, Store};

use crate::error::{Error, Result};
use crate::projection::Projection;

/// Live view of a room. Dropping it unsubscribes.
pub struct RoomSync {
    room_id: Uuid,
    snapshot: watch::Receiver<Arc<Projection>>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl RoomSync {
    /// Load the room and start following its changes
    #[instrument(skip(store))]
    pub async fn enter(store: Arc<dyn Store>, room_id: Uuid) -> Result<Self> {
        // Subscribe first so nothing written during the initial load is missed
        let feed = store.subscribe(room_id);
        let initial = Projection::load(store.as_ref(), room_id).await?;

        let (snapshot_tx, snapshot) = watch::channel(Arc::new(initial));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(listen(store, feed, snapshot_tx, shutdown_rx));

        info!("Entered room");
        Ok(Self {
            room_id,
            snapshot,
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// The latest snapshot
    pub fn current(&self) -> Arc<Projection> {
        self.snapshot.borrow().clone()
    }

    /// A receiver for callers that want to await updates themselves
    pub fn watch(&self) -> watch::Receiver<Arc<Projection>> {
        self.snapshot.clone()
    }

    /// Wait for the next snapshot
    pub async fn changed(&mut self) -> Result<Arc<Projection>> {
        self.snapshot.changed().await.map_err(|_| Error::Closed)?;
        Ok(self.snapshot.borrow_and_update().clone())
    }

    /// Stop following the room
    pub async fn leave(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(room_id = %self.room_id, error = %e, "Sync task failed");
            }
        }
        info!(room_id = %self.room_id, "Left room");
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn listen(
    store: Arc<dyn Store>,
    mut feed: ChangeStream,
    snapshot_tx: watch::Sender<Arc<Projection>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let room_id = feed.room_id();

    loop {
        let notification = tokio::select! {
            n = feed.next() => n,
            _ = shutdown_rx.recv() => {
                debug!(room_id = %room_id, "Sync listener stopping");
                break;
            }
        };

        let current = snapshot_tx.borrow().clone();
        let next = match notification {
            Some(Notification::Changed(relation)) => {
                debug!(room_id = %room_id, ?relation, "Refreshing relation");
                current.refresh(store.as_ref(), relation).await
            }
            Some(Notification::Resync) => {
                debug!(room_id = %room_id, "Reloading every relation");
                Projection::load(store.as_ref(), room_id).await
            }
            None => {
                debug!(room_id = %room_id, "Change feed closed");
                break;
            }
        };

        match next {
            Ok(next) if next != *current => {
                let phase_changed = next.room.phase != current.room.phase;
                if phase_changed {
                    info!(room_id = %room_id, phase = %next.room.phase, "Room phase changed");
                }
                snapshot_tx.send_replace(Arc::new(next));
            }
            Ok(_) => {}
            // Keep showing the last good snapshot
            Err(e) => warn!(room_id = %room_id, error = %e, "Refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use verdict_core::{
        Decision, DecisionType, Participant, Phase, Room, RoomDraft, RoomOption, SqliteStore,
    };

    async fn setup() -> (Arc<dyn Store>, Room) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let room = Room::from_draft(
            &RoomDraft::new("Live", DecisionType::Coin).open_submission(),
            "LIVE01".into(),
            Uuid::new_v4(),
            chrono::Duration::minutes(30),
        );
        store.insert_room(&room).await.unwrap();
        store
            .insert_participant(&Participant::new(room.id, room.created_by), None)
            .await
            .unwrap();
        (store, room)
    }

    /// Wait until the snapshot satisfies `pred`
    async fn wait_for<F>(sync: &mut RoomSync, pred: F) -> Arc<Projection>
    where
        F: Fn(&Projection) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = sync.current();
                if pred(&view) {
                    return view;
                }
                sync.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_follows_writes() {
        let (store, room) = setup().await;
        let mut sync = RoomSync::enter(store.clone(), room.id).await.unwrap();
        assert!(sync.current().options.is_empty());

        let option = RoomOption::new(room.id, room.created_by, "Tapas".into());
        store.insert_option(&option).await.unwrap();
        let view = wait_for(&mut sync, |v| v.options.len() == 1).await;
        assert_eq!(view.options[0].text, "Tapas");

        store
            .advance_phase(room.id, Phase::Submission, Phase::Voting)
            .await
            .unwrap();
        store
            .finalize(&Decision::plain(room.id, Some(option.id)), 0)
            .await
            .unwrap();

        let view = wait_for(&mut sync, |v| v.decision.is_some()).await;
        assert_eq!(view.room.phase, Phase::Results);
        assert_eq!(view.winning_option().map(|o| o.id), Some(option.id));

        sync.leave().await;
    }

    #[tokio::test]
    async fn test_other_rooms_ignored() {
        let (store, room) = setup().await;
        let sync = RoomSync::enter(store.clone(), room.id).await.unwrap();
        let mut rx = sync.watch();

        let other = Room::from_draft(
            &RoomDraft::new("Elsewhere", DecisionType::Dice).open_submission(),
            "ELSE01".into(),
            Uuid::new_v4(),
            chrono::Duration::minutes(30),
        );
        store.insert_room(&other).await.unwrap();
        store
            .insert_option(&RoomOption::new(other.id, other.created_by, "Nope".into()))
            .await
            .unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(200), rx.changed()).await;
        assert!(waited.is_err());
        assert!(sync.current().options.is_empty());
    }

    #[tokio::test]
    async fn test_enter_missing_room_fails() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let err = RoomSync::enter(store, Uuid::new_v4()).await.err().unwrap();
        assert!(matches!(err, Error::Core(verdict_core::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_changed_after_leave_is_closed() {
        let (store, room) = setup().await;
        let sync = RoomSync::enter(store, room.id).await.unwrap();
        let mut rx = sync.watch();
        sync.leave().await;
        assert!(rx.changed().await.is_err());
    }
}
