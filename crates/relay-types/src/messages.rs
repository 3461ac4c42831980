//! Wire messages exchanged between the two cooperating agents.
//!
//! Messages travel over the game's per-agent `say` channel as JSON
//! records discriminated by an `action` field. The channel is assumed
//! in-order and non-lossy; the coordination protocol builds on that.

use serde::{Deserialize, Serialize};

use crate::enums::Hand2HandMode;
use crate::ids::ParcelId;
use crate::structs::Point;

/// Status discriminator of a [`CompanionMessage::DeliveryTile`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTileStatus {
    /// The deliverer proposes (and has recorded) the tile.
    Set,
    /// The gatherer rejects the tile; the deliverer must renegotiate.
    Error,
}

/// A coordination message between companion agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CompanionMessage {
    /// The sender's planned pickups, in priority order. The receiver
    /// replaces its ignore-list with these ids so the pair never chases
    /// the same parcels.
    MultiPickup {
        /// Parcel ids in the sender's queue order.
        parcel_ids: Vec<ParcelId>,
    },

    /// The sender's current tile. The first reception on the leader also
    /// triggers hand-to-hand role election.
    CompanionPosition {
        /// Sender column.
        x: u32,
        /// Sender row.
        y: u32,
    },

    /// Role command from the leader's election.
    Hand2Hand {
        /// The behavior the receiver must switch to.
        behavior: Hand2HandMode,
    },

    /// Delivery-tile negotiation between the deliverer and the gatherer.
    DeliveryTile {
        /// Whether the tile is being proposed or rejected.
        status: DeliveryTileStatus,
        /// The proposed tile. Present on `set`, absent on `error`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tile: Option<Point>,
    },
}
