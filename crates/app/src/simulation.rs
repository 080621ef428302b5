//! Scripted multi-client session
//!
//! Several simulated participants, each with its own session and engine,
//! share one store and race through a room: join, submit, ready up, vote.
//! Two of them also try to force results at the end, which must settle on a
//! single decision.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use verdict_core::{
    Decision, DecisionType, EngineConfig, LocalSession, Phase, Room, RoomDraft, RoomService,
    Store, Tally, TieBreaker,
};
use verdict_sync::{Projection, Result, RoomSync};

const NAMES: &[&str] = &["Ada", "Bo", "Cy", "Dee", "Eli", "Fay", "Gus", "Hal"];
const DISHES: &[&str] = &[
    "Pizza", "Sushi", "Tacos", "Ramen", "Curry", "Falafel", "Dumplings", "Paella",
];

/// How long to wait for the room to settle after the last vote
const SETTLE_TIMEOUT_SECS: u64 = 10;

/// One simulated person
struct Client {
    name: &'static str,
    service: RoomService,
}

impl Client {
    fn new(
        name: &'static str,
        store: &Arc<dyn Store>,
        config: &EngineConfig,
        seed: u64,
    ) -> Self {
        let session = Arc::new(LocalSession::signed_in(Uuid::new_v4()));
        let service = RoomService::with_tie_breaker(
            store.clone(),
            session,
            config.clone(),
            TieBreaker::seeded(seed),
        );
        Self { name, service }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub participants: usize,
    pub decision_type: DecisionType,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            participants: 4,
            decision_type: DecisionType::Dice,
            seed: 42,
        }
    }
}

/// What the session ended with
#[derive(Debug)]
pub struct Report {
    pub room: Room,
    pub decision: Decision,
    pub winner: Option<String>,
    pub tally: Option<Tally>,
    pub snapshot: Arc<Projection>,
}

#[instrument(skip(store, config), fields(participants = sim.participants))]
pub async fn run(store: Arc<dyn Store>, config: &EngineConfig, sim: &SimulationConfig) -> Result<Report> {
    let count = sim.participants.clamp(1, NAMES.len());
    let mut rng = StdRng::seed_from_u64(sim.seed);

    let clients: Vec<Arc<Client>> = NAMES[..count]
        .iter()
        .copied()
        .enumerate()
        .map(|(i, name)| Arc::new(Client::new(name, &store, config, sim.seed + i as u64)))
        .collect();
    let host = clients[0].clone();

    let room = host
        .service
        .create_room(
            RoomDraft::new("Where do we eat?", sim.decision_type)
                .with_description("Simulated dinner vote")
                .with_max_participants(count as u32),
        )
        .await?;
    info!(code = %room.code, host = host.name, "Room open");

    let mut sync = RoomSync::enter(store.clone(), room.id).await?;
    let _clock = host.service.watch_expiry(room.id);

    // Everyone else joins at once
    let mut joins = Vec::new();
    for client in clients.iter().skip(1) {
        let client = client.clone();
        let code = room.code.clone();
        joins.push(tokio::spawn(async move {
            client.service.join_by_code(&code).await.map(|_| client.name)
        }));
    }
    for join in joins {
        let name = join.await.map_err(join_error)??;
        debug!(name, "Joined");
    }

    host.service.start_submission(room.id).await?;

    // Each person proposes a dish and readies up
    let mut submits = Vec::new();
    for (i, client) in clients.iter().enumerate() {
        let client = client.clone();
        let dish = DISHES[i % DISHES.len()];
        let room_id = room.id;
        submits.push(tokio::spawn(async move {
            client.service.submit_option(room_id, dish).await?;
            client.service.set_ready(room_id, true).await
        }));
    }
    for submit in submits {
        submit.await.map_err(join_error)??;
    }

    host.service.request_voting(room.id).await?;
    let options = host.service.options(room.id).await?;

    // Votes go in concurrently; the last one closes the room
    let mut votes = Vec::new();
    for client in &clients {
        let client = client.clone();
        let choice = options[rng.gen_range(0..options.len())].id;
        let room_id = room.id;
        votes.push(tokio::spawn(async move {
            client.service.cast_vote(room_id, choice).await
        }));
    }
    for vote in votes {
        vote.await.map_err(join_error)??;
    }

    // Late callers racing to close the room must agree on one decision
    let mut closers = Vec::new();
    for client in clients.iter().take(2) {
        let client = client.clone();
        let room_id = room.id;
        closers.push(tokio::spawn(async move {
            client.service.force_results(room_id).await
        }));
    }
    let mut decisions = Vec::new();
    for closer in closers {
        decisions.push(closer.await.map_err(join_error)??);
    }
    debug_assert!(decisions.windows(2).all(|w| w[0].id == w[1].id));

    let snapshot = tokio::time::timeout(Duration::from_secs(SETTLE_TIMEOUT_SECS), async {
        loop {
            let view = sync.current();
            if view.room.phase == Phase::Results && view.decision.is_some() {
                return Ok::<_, verdict_sync::Error>(view);
            }
            sync.changed().await?;
        }
    })
    .await
    .map_err(|_| verdict_core::Error::Conflict("room did not settle in time".into()))??;
    sync.leave().await;

    let decision = snapshot
        .decision
        .clone()
        .ok_or_else(|| verdict_core::Error::NotFound("decision".into()))?;
    let report = Report {
        room: snapshot.room.clone(),
        winner: snapshot.winning_option().map(|o| o.text.clone()),
        tally: snapshot.tally(),
        decision,
        snapshot,
    };

    info!(
        winner = report.winner.as_deref().unwrap_or("none"),
        tie_break = report.decision.tie_breaker_used,
        "Session finished"
    );
    Ok(report)
}

fn join_error(e: tokio::task::JoinError) -> verdict_core::Error {
    verdict_core::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::SqliteStore;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_session_reaches_one_decision() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let sim = SimulationConfig {
            participants: 5,
            decision_type: DecisionType::Coin,
            seed: 7,
        };

        let report = run(store.clone(), &EngineConfig::default(), &sim)
            .await
            .unwrap();

        assert_eq!(report.room.phase, Phase::Results);
        assert_eq!(report.tally.as_ref().unwrap().total(), 5);
        assert!(report.winner.is_some());
        assert_eq!(
            store.find_decision(report.room.id).await.unwrap().unwrap().id,
            report.decision.id
        );
        if report.decision.tie_breaker_used {
            assert_eq!(report.decision.tie_breaker_type, Some(DecisionType::Coin));
        }
    }

    #[tokio::test]
    async fn test_session_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            database_path: Some(dir.path().join("verdict.db")),
            ..EngineConfig::default()
        };
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config).unwrap());

        let report = run(store, &config, &SimulationConfig::default())
            .await
            .unwrap();
        assert_eq!(report.snapshot.participants.len(), 4);
        assert!(report.snapshot.to_json().unwrap().contains("\"results\""));
    }
}
