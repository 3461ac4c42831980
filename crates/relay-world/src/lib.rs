//! Grid belief map and pathfinding for the Relay delivery agents.
//!
//! This crate models the physical world one agent believes in: the tiled
//! map with depot and spawn registries, sensed parcels and adversaries,
//! companion positions, walkability queries, and the synchronous A*
//! pathfinder used for both option scoring and route execution.
//!
//! # Modules
//!
//! - [`grid`] -- [`GridMap`], the authoritative spatial model
//! - [`pathfinder`] -- A* over a map snapshot
//! - [`belief`] -- directional adjacency facts for the PDDL variant
//! - [`error`] -- error types for map operations

pub mod belief;
pub mod error;
pub mod grid;
pub mod pathfinder;

// Re-export primary types at crate root.
pub use belief::{belief_set, tile_name};
pub use error::WorldError;
pub use grid::{GridMap, MapRole};
pub use pathfinder::find_path;
