//! Per-worker task assembly.
//!
//! One worker is one agent: a belief state, an agent handle, and three
//! tokio tasks (observer, option timer, agent loop) wired to the
//! transport by an unbounded sensor-event channel and a bounded action
//! channel. A fatal observer error (bad map, protocol violation) stops
//! that worker's tasks without taking down the rest of the process.

use std::sync::Arc;

use relay_agent::{
    ActionCommand, Agent, AgentContext, GameHandle, Observer, OptionGenerator, StopToken,
    WorldState,
};
use relay_types::{AgentConfig, AgentId, SensorEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A spawned worker's handles.
///
/// `events` and `actions` are the transport-side channel ends; the
/// transport clones the sender and consumes the receiver.
pub struct Worker {
    /// The worker's agent handle, for inspection and tests.
    pub agent: Agent,
    /// The worker's belief state.
    pub world: WorldState,
    /// Sensor events into the worker.
    pub events: mpsc::UnboundedSender<SensorEvent>,
    /// Action commands out of the worker.
    pub actions: mpsc::Receiver<ActionCommand>,
    /// Stops this worker's tasks.
    pub shutdown: StopToken,
    /// The worker's tasks (observer, timer, loop).
    pub tasks: Vec<JoinHandle<()>>,
}

/// Assemble and start one worker.
pub fn spawn_worker(
    label: &str,
    config: AgentConfig,
    companion: Option<AgentId>,
    parent_shutdown: &StopToken,
) -> Worker {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (client, actions_rx) = GameHandle::channel(64);

    let world = WorldState::new();
    let agent = Agent::new(&config, companion);
    let ctx = AgentContext::new(
        agent.clone(),
        world.clone(),
        client,
        Arc::new(config),
    );
    let options = Arc::new(OptionGenerator::new(ctx.clone()));
    let observer = Observer::new(ctx.clone(), Arc::clone(&options));
    let shutdown = parent_shutdown.child();

    let mut tasks = Vec::new();

    let observer_label = label.to_owned();
    let observer_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        match observer.run(events_rx).await {
            Ok(()) => info!(worker = observer_label, "observer finished"),
            Err(err) => {
                error!(worker = observer_label, error = %err, "worker failed, stopping");
                observer_shutdown.stop();
            }
        }
    }));

    let timer_options = Arc::clone(&options);
    let timer_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        timer_options.run_timer(timer_shutdown).await;
    }));

    let loop_agent = agent.clone();
    let loop_ctx = ctx;
    let loop_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        loop_agent.run_loop(&loop_ctx, loop_shutdown).await;
    }));

    info!(worker = label, "worker started");
    Worker {
        agent,
        world,
        events: events_tx,
        actions: actions_rx,
        shutdown,
        tasks,
    }
}
