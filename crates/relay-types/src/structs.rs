//! Core entity structs: grid geometry, tiles, parcels, tracked agents,
//! and the parsed world configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::TileKind;
use crate::ids::{AgentId, ParcelId};

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A tile coordinate on the grid. `(0, 0)` is the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Column index, `0 <= x < width`.
    pub x: u32,
    /// Row index, `0 <= y < height`.
    pub y: u32,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another point.
    pub const fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    /// Whether the straight-line (Euclidean) distance to `other` is at
    /// most `radius`. Compared on squared integer distances so no
    /// floating point is involved.
    pub fn euclidean_within(self, other: Self, radius: u32) -> bool {
        let dx = u64::from(self.x.abs_diff(other.x));
        let dy = u64::from(self.y.abs_diff(other.y));
        let squared = dx
            .saturating_mul(dx)
            .saturating_add(dy.saturating_mul(dy));
        squared <= u64::from(radius).saturating_mul(u64::from(radius))
    }

    /// Whether the two points are 4-adjacent (Manhattan distance 1).
    pub const fn is_adjacent(self, other: Self) -> bool {
        self.manhattan_distance(other) == 1
    }
}

impl core::fmt::Display for Point {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// A single map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Column index.
    pub x: u32,
    /// Row index.
    pub y: u32,
    /// What kind of tile this is.
    pub kind: TileKind,
}

impl Tile {
    /// Create a tile.
    pub const fn new(x: u32, y: u32, kind: TileKind) -> Self {
        Self { x, y, kind }
    }

    /// The tile's coordinate.
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Parcel
// ---------------------------------------------------------------------------

/// A parcel known to the belief map.
///
/// `timestamp` records when the parcel was last observed; the reward
/// decays by one per decay interval since that observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Server-assigned parcel identifier.
    pub id: ParcelId,
    /// Column index of the parcel's tile.
    pub x: u32,
    /// Row index of the parcel's tile.
    pub y: u32,
    /// Reward at observation time.
    pub reward: i64,
    /// When the parcel was last observed.
    pub timestamp: DateTime<Utc>,
    /// The agent carrying the parcel, if any. Parcels with a carrier are
    /// never inserted into the belief map.
    pub carried_by: Option<AgentId>,
}

impl Parcel {
    /// The parcel's tile coordinate.
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Whether the decayed reward has dropped below zero.
    ///
    /// The decayed reward is `reward - floor(elapsed / decay)`. A `None`
    /// decay interval means rewards never decay and the parcel never
    /// expires.
    pub fn is_expired(&self, now: DateTime<Utc>, decay: Option<Duration>) -> bool {
        let Some(decay) = decay else {
            return false;
        };
        let Ok(decay_ms) = i64::try_from(decay.as_millis()) else {
            return false;
        };
        if decay_ms <= 0 {
            return self.reward < 0;
        }
        let elapsed_ms = now
            .signed_duration_since(self.timestamp)
            .num_milliseconds()
            .max(0);
        let decayed_steps = elapsed_ms.checked_div(decay_ms).unwrap_or(0);
        self.reward.saturating_sub(decayed_steps) < 0
    }
}

// ---------------------------------------------------------------------------
// TrackedAgent
// ---------------------------------------------------------------------------

/// An adversary agent observed by the agents sensor.
///
/// Teammates (own id or the companion's id) are never stored as tracked
/// agents; their observations update the leader/follower position fields
/// on the map instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAgent {
    /// Server-assigned agent identifier.
    pub id: AgentId,
    /// Column index of the agent's tile.
    pub x: u32,
    /// Row index of the agent's tile.
    pub y: u32,
    /// When the agent was last observed.
    pub timestamp: DateTime<Utc>,
}

impl TrackedAgent {
    /// The agent's tile coordinate.
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// World constants captured from the server's config broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameConfig {
    /// Interval at which parcel rewards decay by one. `None` disables
    /// decay (the server advertises `infinite`).
    pub parcel_decay: Option<Duration>,
    /// Sensing radius for parcels, in tiles.
    pub parcels_observation_distance: u32,
    /// Average reward of freshly spawned parcels.
    pub parcel_reward_avg: u32,
    /// Reward spread of freshly spawned parcels.
    pub parcel_reward_variance: u32,
}

/// Parse a decay interval advertised by the server.
///
/// The value is a number of seconds with an optional trailing unit
/// (`"1s"`, `"2"`). Anything that does not parse to a positive number
/// (notably `"infinite"`) disables decay.
pub fn parse_decay_interval(raw: &str) -> Option<Duration> {
    let numeric = raw.trim().trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let seconds: f64 = numeric.parse().ok()?;
    if seconds.is_finite() && seconds > 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}
