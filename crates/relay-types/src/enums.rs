//! Enumeration types shared across the Relay workspace.

use serde::{Deserialize, Serialize};

use crate::structs::Point;

// ---------------------------------------------------------------------------
// Tile kinds
// ---------------------------------------------------------------------------

/// The kind of a map tile, as reported by the map sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    /// Impassable tile. Never walkable.
    Wall,
    /// Parcel spawn area.
    Spawn,
    /// Delivery depot.
    Depot,
    /// Plain walkable tile.
    Other,
}

/// The map sensor delivered a tile type code outside the known range.
///
/// This is fatal at map initialisation: an unknown code means the sensor
/// contract has changed and every later walkability decision would be
/// built on a wrong map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown tile type code: {0}")]
pub struct UnknownTileCode(pub u8);

impl TileKind {
    /// Map a raw sensor type code to a tile kind.
    ///
    /// Codes: `0` wall, `1` spawn, `2` depot, `3`/`4`/`5` plain.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownTileCode`] for any other code.
    pub const fn from_code(code: u8) -> Result<Self, UnknownTileCode> {
        match code {
            0 => Ok(Self::Wall),
            1 => Ok(Self::Spawn),
            2 => Ok(Self::Depot),
            3..=5 => Ok(Self::Other),
            other => Err(UnknownTileCode(other)),
        }
    }

    /// Whether an agent may ever stand on this kind of tile.
    ///
    /// Occupancy (adversaries, the companion) is layered on top of this
    /// by the map's walkability query.
    pub const fn is_traversable(self) -> bool {
        !matches!(self, Self::Wall)
    }
}

// ---------------------------------------------------------------------------
// Movement directions
// ---------------------------------------------------------------------------

/// A cardinal movement direction accepted by the move action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Increase `y` by one.
    Up,
    /// Decrease `y` by one.
    Down,
    /// Decrease `x` by one.
    Left,
    /// Increase `x` by one.
    Right,
}

impl Direction {
    /// The wire name of the direction.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Pick the cardinal direction whose sign matches the step from
    /// `from` to `to`, preferring horizontal movement when both axes
    /// differ. Returns `None` when the points coincide.
    pub const fn toward(from: Point, to: Point) -> Option<Self> {
        if to.x > from.x {
            Some(Self::Right)
        } else if to.x < from.x {
            Some(Self::Left)
        } else if to.y > from.y {
            Some(Self::Up)
        } else if to.y < from.y {
            Some(Self::Down)
        } else {
            None
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Hand-to-hand relay modes
// ---------------------------------------------------------------------------

/// Behavior mode of an agent in the dual deployment.
///
/// The same set of values travels on the wire in the `hand2hand` message
/// (as the commanded behavior) and lives in the agent state (as the
/// current mode). Agents start in [`Hand2HandMode::None`] and only leave
/// it when the leader's role election detects a topology that demands a
/// relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand2HandMode {
    /// Default behavior: collect and deliver independently.
    #[default]
    None,
    /// Collect parcels and leave them on the shared delivery tile.
    Gather,
    /// Ferry parcels from the shared delivery tile to the depot.
    Deliver,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_codes_map_to_kinds() {
        assert_eq!(TileKind::from_code(0), Ok(TileKind::Wall));
        assert_eq!(TileKind::from_code(1), Ok(TileKind::Spawn));
        assert_eq!(TileKind::from_code(2), Ok(TileKind::Depot));
        assert_eq!(TileKind::from_code(3), Ok(TileKind::Other));
        assert_eq!(TileKind::from_code(4), Ok(TileKind::Other));
        assert_eq!(TileKind::from_code(5), Ok(TileKind::Other));
    }

    #[test]
    fn unknown_tile_code_is_error() {
        assert_eq!(TileKind::from_code(6), Err(UnknownTileCode(6)));
        assert_eq!(TileKind::from_code(255), Err(UnknownTileCode(255)));
    }

    #[test]
    fn walls_are_never_traversable() {
        assert!(!TileKind::Wall.is_traversable());
        assert!(TileKind::Spawn.is_traversable());
        assert!(TileKind::Depot.is_traversable());
        assert!(TileKind::Other.is_traversable());
    }

    #[test]
    fn direction_prefers_horizontal() {
        let from = Point::new(2, 2);
        // Both axes differ: horizontal wins.
        assert_eq!(Direction::toward(from, Point::new(3, 5)), Some(Direction::Right));
        assert_eq!(Direction::toward(from, Point::new(0, 0)), Some(Direction::Left));
        // Single axis.
        assert_eq!(Direction::toward(from, Point::new(2, 3)), Some(Direction::Up));
        assert_eq!(Direction::toward(from, Point::new(2, 1)), Some(Direction::Down));
        // Same tile.
        assert_eq!(Direction::toward(from, from), None);
    }

    #[test]
    fn hand2hand_wire_names() {
        let json = serde_json::to_string(&Hand2HandMode::Deliver).ok();
        assert_eq!(json.as_deref(), Some("\"deliver\""));
        let parsed: Result<Hand2HandMode, _> = serde_json::from_str("\"none\"");
        assert_eq!(parsed.ok(), Some(Hand2HandMode::None));
    }
}
