//! The bundle of collaborators handed to plans and intentions.

use std::sync::Arc;

use relay_types::AgentConfig;

use crate::agent::Agent;
use crate::client::GameHandle;
use crate::plan::pddl::PddlSolver;
use crate::state::WorldState;

/// Everything a plan needs to act: the agent handle, the belief state,
/// the game transport, the worker configuration, and (for the symbolic
/// routing variant) the external solver.
///
/// Cheap to clone; every field is a handle.
#[derive(Clone)]
pub struct AgentContext {
    /// The owning agent.
    pub agent: Agent,
    /// The worker's belief state.
    pub world: WorldState,
    /// The game transport adapter.
    pub client: GameHandle,
    /// Worker tuning knobs.
    pub config: Arc<AgentConfig>,
    /// External PDDL solver, when the symbolic variant is configured.
    pub solver: Option<Arc<dyn PddlSolver>>,
}

impl AgentContext {
    /// Assemble a context from its collaborators.
    pub fn new(
        agent: Agent,
        world: WorldState,
        client: GameHandle,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self {
            agent,
            world,
            client,
            config,
            solver: None,
        }
    }

    /// Attach an external PDDL solver.
    #[must_use]
    pub fn with_solver(mut self, solver: Arc<dyn PddlSolver>) -> Self {
        self.solver = Some(solver);
        self
    }
}
