//! Worker harness and simulated game transport for the Relay agents.
//!
//! The library half of the engine: environment settings, per-worker
//! task assembly, and the in-process simulated game. The binary in
//! `main.rs` wires these together; the integration tests drive the same
//! pieces directly.
//!
//! # Modules
//!
//! - [`env`] -- environment-variable settings
//! - [`worker`] -- per-worker task assembly
//! - [`sim`] -- the simulated game transport
//! - [`error`] -- engine error types

pub mod env;
pub mod error;
pub mod sim;
pub mod worker;

pub use env::EnvSettings;
pub use error::EngineError;
pub use sim::{GameSim, SimConfig};
pub use worker::{Worker, spawn_worker};
