//! The desire/intention predicate as a tagged sum type.
//!
//! The planner's wire format represents a predicate as a JSON tuple,
//! `["go_pick_up", x, y, parcelId]`. Internally each action is a variant
//! with typed fields; [`Predicate::parse`] is the boundary parser and
//! rejects malformed tuples with a typed error instead of letting them
//! into the intention queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ParcelId;
use crate::structs::Point;

/// A candidate desire produced by the option generator, or the goal of a
/// committed intention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Predicate {
    /// Reposition to a tile.
    GoTo {
        /// Destination column.
        x: u32,
        /// Destination row.
        y: u32,
    },
    /// Walk to a parcel's tile and pick it up.
    GoPickUp {
        /// Parcel column.
        x: u32,
        /// Parcel row.
        y: u32,
        /// The parcel to collect.
        parcel: ParcelId,
    },
    /// Walk to a tile and put down everything carried.
    GoDropOff {
        /// Target column.
        x: u32,
        /// Target row.
        y: u32,
        /// Optional depot hint. Informational only; the drop-off target
        /// is always `(x, y)`.
        depot: Option<String>,
    },
}

/// A predicate tuple failed to parse at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    /// The tuple was not a JSON array.
    #[error("predicate is not a tuple: {0}")]
    NotATuple(String),

    /// The action tag is not one of the known actions.
    #[error("unknown predicate action: {0}")]
    UnknownAction(String),

    /// A required element is missing or has the wrong type.
    #[error("malformed {action} predicate: missing or invalid {field}")]
    MalformedField {
        /// The action being parsed.
        action: &'static str,
        /// The offending element.
        field: &'static str,
    },
}

impl Predicate {
    /// The action tag, as it appears on the wire.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::GoTo { .. } => "go_to",
            Self::GoPickUp { .. } => "go_pick_up",
            Self::GoDropOff { .. } => "go_drop_off",
        }
    }

    /// The tile this predicate drives the agent toward.
    pub const fn target(&self) -> Point {
        match *self {
            Self::GoTo { x, y }
            | Self::GoPickUp { x, y, .. }
            | Self::GoDropOff { x, y, .. } => Point::new(x, y),
        }
    }

    /// Whether this is a pickup predicate.
    pub const fn is_pick_up(&self) -> bool {
        matches!(self, Self::GoPickUp { .. })
    }

    /// Whether this is a drop-off predicate.
    pub const fn is_drop_off(&self) -> bool {
        matches!(self, Self::GoDropOff { .. })
    }

    /// Whether this is a plain reposition predicate.
    pub const fn is_go_to(&self) -> bool {
        matches!(self, Self::GoTo { .. })
    }

    /// Parse a wire tuple of the form `[action, x, y, ...]`.
    ///
    /// The trailing drop-off depot element is optional and falls back to
    /// `None` when absent or null.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError`] when the tuple shape, action tag, or a
    /// required element is invalid.
    pub fn parse(value: &Value) -> Result<Self, PredicateError> {
        let tuple = value
            .as_array()
            .ok_or_else(|| PredicateError::NotATuple(value.to_string()))?;

        let action = tuple
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| PredicateError::NotATuple(value.to_string()))?;

        match action {
            "go_to" => {
                let x = coordinate(tuple.get(1), "go_to", "x")?;
                let y = coordinate(tuple.get(2), "go_to", "y")?;
                Ok(Self::GoTo { x, y })
            }
            "go_pick_up" => {
                let x = coordinate(tuple.get(1), "go_pick_up", "x")?;
                let y = coordinate(tuple.get(2), "go_pick_up", "y")?;
                let parcel = tuple
                    .get(3)
                    .and_then(Value::as_str)
                    .ok_or(PredicateError::MalformedField {
                        action: "go_pick_up",
                        field: "parcel id",
                    })?;
                Ok(Self::GoPickUp {
                    x,
                    y,
                    parcel: ParcelId::new(parcel),
                })
            }
            "go_drop_off" => {
                let x = coordinate(tuple.get(1), "go_drop_off", "x")?;
                let y = coordinate(tuple.get(2), "go_drop_off", "y")?;
                // The depot element is a hint; absent or null means no hint.
                let depot = tuple
                    .get(3)
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                Ok(Self::GoDropOff { x, y, depot })
            }
            other => Err(PredicateError::UnknownAction(other.to_owned())),
        }
    }
}

impl core::fmt::Display for Predicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GoTo { x, y } => write!(f, "go_to({x}, {y})"),
            Self::GoPickUp { x, y, parcel } => write!(f, "go_pick_up({x}, {y}, {parcel})"),
            Self::GoDropOff { x, y, depot } => match depot {
                Some(depot) => write!(f, "go_drop_off({x}, {y}, {depot})"),
                None => write!(f, "go_drop_off({x}, {y})"),
            },
        }
    }
}

/// Extract a coordinate element from a wire tuple.
fn coordinate(
    value: Option<&Value>,
    action: &'static str,
    field: &'static str,
) -> Result<u32, PredicateError> {
    value
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(PredicateError::MalformedField { action, field })
}
