//! Shared type definitions for the Relay delivery agents.
//!
//! This crate is the single source of truth for the types used across the
//! Relay workspace: grid geometry, belief-map entities, the intention
//! predicate sum type, companion wire messages, and sensor event records.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for server-assigned string identifiers
//! - [`enums`] -- Tile kinds, movement directions, hand-to-hand modes
//! - [`structs`] -- Points, tiles, parcels, tracked agents, world config
//! - [`predicate`] -- The desire/intention predicate and its wire parser
//! - [`messages`] -- Companion coordination messages
//! - [`events`] -- Sensor events delivered by the game transport
//! - [`config`] -- The per-worker agent configuration record

pub mod config;
pub mod enums;
pub mod events;
pub mod ids;
pub mod messages;
pub mod predicate;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use config::AgentConfig;
pub use enums::{Direction, Hand2HandMode, TileKind, UnknownTileCode};
pub use events::{AgentSensed, ParcelSensed, RawGameConfig, RawTile, SensorEvent, YouUpdate};
pub use ids::{AgentId, ParcelId};
pub use messages::{CompanionMessage, DeliveryTileStatus};
pub use predicate::{Predicate, PredicateError};
pub use structs::{GameConfig, Parcel, Point, Tile, TrackedAgent, parse_decay_interval};
