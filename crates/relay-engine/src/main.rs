//! Engine binary for the Relay delivery agents.
//!
//! Wires one or two agent workers to the in-process simulated game
//! transport and runs until interrupted. Configuration comes from the
//! environment (`DUAL_AGENT`, the agent tuning knobs, `LOG_LEVEL`) and
//! an optional `SIM_CONFIG` YAML file describing the simulated world.
//!
//! # Startup sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Read the environment settings
//! 3. Load (or default) the simulated-world configuration
//! 4. Spawn the leader worker, and the follower in dual mode
//! 5. Seat the workers in the sim and start it
//! 6. Wait for ctrl-c, then stop everything

use relay_agent::StopToken;
use relay_engine::env::EnvSettings;
use relay_engine::error::EngineError;
use relay_engine::sim::{GameSim, SimConfig};
use relay_engine::worker;
use relay_types::AgentId;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error when configuration is invalid or the simulated
/// world cannot be assembled.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Structured logging: LOG_LEVEL wins, then RUST_LOG, then info.
    let filter = std::env::var("LOG_LEVEL").map_or_else(
        |_unset| EnvFilter::try_from_default_env().unwrap_or_else(|_unset| EnvFilter::new("info")),
        EnvFilter::new,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("relay-engine starting");

    // 2. Environment settings.
    let settings = EnvSettings::from_env()?;
    info!(
        dual_agent = settings.dual_agent,
        option_interval_ms = settings.option_generation_interval_ms,
        max_carried = settings.max_carried_parcels,
        "settings loaded"
    );

    // 3. Simulated world.
    let sim_config = load_sim_config(&settings)?;
    info!(world = sim_config.name, "sim config loaded");
    let mut sim = GameSim::new(sim_config)?;

    // 4. Workers.
    let shutdown = StopToken::new();
    let seat_count = if settings.dual_agent { 2 } else { 1 };
    let starts = sim.suggest_starts(seat_count)?;

    let leader_companion = settings.dual_agent.then(|| AgentId::new("follower"));
    let leader = worker::spawn_worker(
        "leader",
        settings.agent_config(true),
        leader_companion,
        &shutdown,
    );
    let leader_start = starts.first().copied().ok_or(EngineError::SimWorld {
        reason: String::from("no start tile for the leader"),
    })?;
    sim.add_seat(
        AgentId::new("leader"),
        "leader",
        leader_start,
        leader.events.clone(),
        leader.actions,
    )?;

    if settings.dual_agent {
        let follower = worker::spawn_worker(
            "follower",
            settings.agent_config(false),
            Some(AgentId::new("leader")),
            &shutdown,
        );
        let follower_start = starts.get(1).copied().ok_or(EngineError::SimWorld {
            reason: String::from("no start tile for the follower"),
        })?;
        sim.add_seat(
            AgentId::new("follower"),
            "follower",
            follower_start,
            follower.events.clone(),
            follower.actions,
        )?;
    }

    // 5. Run the sim.
    let sim_task = tokio::spawn(sim.run(shutdown.clone()));

    // 6. Wait for the operator.
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.stop();
    let _ = sim_task.await;

    info!("relay-engine shutdown complete");
    Ok(())
}

/// Load the simulated-world configuration from `SIM_CONFIG`, falling
/// back to the built-in default world.
fn load_sim_config(settings: &EnvSettings) -> Result<SimConfig, EngineError> {
    settings.sim_config.as_deref().map_or_else(
        || {
            info!("no SIM_CONFIG set, using the built-in world");
            Ok(SimConfig::default())
        },
        SimConfig::from_file,
    )
}
