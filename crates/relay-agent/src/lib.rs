//! Belief-desire-intention core for the Relay delivery agents.
//!
//! One worker owns one [`Agent`], one [`WorldState`], and one transport
//! adapter; the observer task translates sensor events into beliefs,
//! the option generator turns beliefs into candidate desires, and the
//! agent loop consumes the resulting intention queue through the plan
//! library. The coordination module runs the dual-agent protocol on top
//! of the same pieces.
//!
//! # Modules
//!
//! - [`client`] -- channel-based adapter over the game transport
//! - [`state`] -- shared belief-state handle (map + world constants)
//! - [`observer`] -- sensor event dispatch
//! - [`intention`] -- intentions and cooperative cancellation
//! - [`plan`] -- the plan library (`GoTo`, `GoPickUp`, `GoDropOff`,
//!   and the symbolic `GoToPddl` variant)
//! - [`agent`] -- intention queue, priority policy, agent loop
//! - [`options`] -- mode-specific option producers
//! - [`coordination`] -- companion protocol handlers
//! - [`context`] -- the collaborator bundle handed to plans
//! - [`error`] -- the error taxonomy

pub mod agent;
pub mod client;
pub mod context;
pub mod coordination;
pub mod error;
pub mod intention;
pub mod observer;
pub mod options;
pub mod plan;
pub mod state;

// Re-export primary types at crate root.
pub use agent::{Agent, AgentCore, AgentSnapshot};
pub use client::{ActionCommand, GameHandle, RecordedAction, StubTransport};
pub use context::AgentContext;
pub use coordination::Coordinator;
pub use error::{AgentError, ClientError, PlanError};
pub use intention::{Intention, IntentionState, StopToken};
pub use observer::Observer;
pub use options::{OptionGenerator, find_common_delivery_tile, has_reachable_spawn, nearest_reachable_depot};
pub use plan::{PlanKind, pddl::PddlSolver};
pub use state::WorldState;
