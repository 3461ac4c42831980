//! Error types for the `relay-agent` crate.
//!
//! The layering mirrors the recovery strategy: [`PlanError`] is caught at
//! the intention boundary (try the next applicable plan), [`AgentError`]
//! at the agent-loop boundary (log and continue), and only
//! [`AgentError::Protocol`] and map-initialisation failures terminate the
//! worker.

use relay_world::WorldError;

/// The game transport is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("game transport channel closed")]
pub struct ClientError;

/// Errors surfaced by plan execution.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Cooperative cancellation: the plan's stop token was set before an
    /// externally visible action.
    #[error("plan stopped")]
    Stopped,

    /// The pathfinder found no route to the plan's destination.
    #[error("no path found to ({x}, {y})")]
    NoPathFound {
        /// Destination column.
        x: u32,
        /// Destination row.
        y: u32,
    },

    /// A sub-intention raised by this plan failed.
    #[error("sub-intention failed: {0}")]
    SubIntention(String),

    /// The external PDDL solver failed or returned an unusable plan.
    #[error("solver failed: {0}")]
    Solver(String),

    /// The plan class does not match the predicate's action tag. Guarded
    /// against by the applicability test; surfacing it means a library
    /// bug, and the intention simply tries the next plan.
    #[error("plan not applicable to predicate")]
    NotApplicable,

    /// The game transport dropped mid-plan.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Errors surfaced by intentions, the agent loop, and the coordination
/// protocol.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Cooperative cancellation of an intention.
    #[error("intention stopped")]
    Stopped,

    /// No plan in the library can realise the predicate.
    #[error("no applicable plan for {predicate}")]
    NoPlan {
        /// Display form of the rejected predicate.
        predicate: String,
    },

    /// The coordination assumption was broken (for example a command to
    /// deliver with no reachable depot). Fatal for the worker: continuing
    /// would livelock the pair.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// What assumption was broken.
        reason: String,
    },

    /// A belief-map operation failed. Fatal when raised during map
    /// initialisation.
    #[error(transparent)]
    World(#[from] WorldError),

    /// The game transport is gone.
    #[error(transparent)]
    Client(#[from] ClientError),
}
