//! End-to-end tests: the full BDI core against the simulated transport.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use relay_agent::StopToken;
use relay_engine::sim::{GameSim, SimConfig};
use relay_engine::worker::spawn_worker;
use relay_types::{AgentConfig, AgentId, Hand2HandMode, Point};

/// Poll until `check` passes or the timeout elapses.
async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    result.is_ok()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_agent_collects_and_delivers() {
    let config = SimConfig {
        rows: vec![String::from("123")],
        parcel_spawn_interval_ms: 150,
        sense_interval_ms: 50,
        parcel_decay_seconds: None,
        max_parcels: 2,
        seed: 11,
        ..SimConfig::default()
    };
    let mut sim = GameSim::new(config).unwrap();

    let shutdown = StopToken::new();
    let worker = spawn_worker("solo", AgentConfig::default(), None, &shutdown);
    sim.add_seat(
        AgentId::new("solo"),
        "solo",
        Point::new(1, 0),
        worker.events.clone(),
        worker.actions,
    )
    .unwrap();

    let scores = sim.score_watch();
    tokio::spawn(sim.run(shutdown.clone()));

    let delivered = wait_for(Duration::from_secs(20), || {
        let scores = scores.clone();
        async move { scores.borrow().iter().any(|s| *s > 0) }
    })
    .await;
    shutdown.stop();

    assert!(delivered, "the agent never delivered a parcel");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corridor_pair_elects_and_relays() {
    // One-tile corridor: the leader starts on the spawn at x=0, the
    // follower at x=2 between the leader and the depot at x=4. The
    // leader cannot route past the follower's tile, so the election
    // must turn the pair into a gather/deliver relay.
    let config = SimConfig {
        rows: vec![String::from("13332")],
        parcel_spawn_interval_ms: 200,
        sense_interval_ms: 50,
        parcel_decay_seconds: None,
        max_parcels: 2,
        seed: 3,
        ..SimConfig::default()
    };
    let mut sim = GameSim::new(config).unwrap();

    let shutdown = StopToken::new();
    let leader_config = AgentConfig {
        dual_agent: true,
        is_leader: true,
        ..AgentConfig::default()
    };
    let follower_config = AgentConfig {
        dual_agent: true,
        is_leader: false,
        rng_seed: 43,
        ..AgentConfig::default()
    };

    let leader = spawn_worker(
        "leader",
        leader_config,
        Some(AgentId::new("follower")),
        &shutdown,
    );
    let follower = spawn_worker(
        "follower",
        follower_config,
        Some(AgentId::new("leader")),
        &shutdown,
    );

    sim.add_seat(
        AgentId::new("leader"),
        "leader",
        Point::new(0, 0),
        leader.events.clone(),
        leader.actions,
    )
    .unwrap();
    sim.add_seat(
        AgentId::new("follower"),
        "follower",
        Point::new(2, 0),
        follower.events.clone(),
        follower.actions,
    )
    .unwrap();

    let scores = sim.score_watch();
    tokio::spawn(sim.run(shutdown.clone()));

    // Election: the blocked leader gathers, the follower delivers.
    let leader_agent = leader.agent.clone();
    let follower_agent = follower.agent.clone();
    let elected = wait_for(Duration::from_secs(10), || {
        let leader_agent = leader_agent.clone();
        let follower_agent = follower_agent.clone();
        async move {
            leader_agent.snapshot().await.mode == Hand2HandMode::Gather
                && follower_agent.snapshot().await.mode == Hand2HandMode::Deliver
        }
    })
    .await;
    assert!(elected, "hand-to-hand election did not converge");

    // Negotiation: both sides agree on the tile next to the gatherer.
    let leader_agent = leader.agent.clone();
    let follower_agent = follower.agent.clone();
    let negotiated = wait_for(Duration::from_secs(10), || {
        let leader_agent = leader_agent.clone();
        let follower_agent = follower_agent.clone();
        async move {
            let deliverer = follower_agent.snapshot().await.delivery_tile;
            let gatherer = leader_agent.snapshot().await.delivery_tile;
            deliverer == Some(Point::new(1, 0)) && gatherer == Some(Point::new(1, 0))
        }
    })
    .await;
    assert!(negotiated, "delivery tile negotiation did not converge");

    // The relay moves parcels end to end: only the deliverer can score.
    let delivered = wait_for(Duration::from_secs(30), || {
        let scores = scores.clone();
        async move { scores.borrow().get(1).copied().unwrap_or(0) > 0 }
    })
    .await;
    shutdown.stop();

    assert!(delivered, "the relay never delivered a parcel");
}
