//! Sensor events delivered by the game transport.
//!
//! The external client (network or simulated) pushes these records into
//! the worker's event channel; the world-state observer translates them
//! into belief-map updates. The shapes mirror the server callbacks:
//! config, map, self, parcel sensing, agent sensing, and say messages.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ParcelId};

/// Raw world constants as broadcast by the server.
///
/// Values arrive stringly-typed (the decay interval carries a unit
/// suffix); parsing into a typed config happens in the observer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGameConfig {
    /// Parcel reward decay interval, e.g. `"1s"` or `"infinite"`.
    #[serde(default, alias = "PARCEL_DECADING_INTERVAL")]
    pub parcel_decaying_interval: Option<String>,
    /// Parcel sensing radius in tiles.
    #[serde(default, alias = "PARCELS_OBSERVATION_DISTANCE")]
    pub parcels_observation_distance: Option<u32>,
    /// Average reward of a fresh parcel.
    #[serde(default, alias = "PARCEL_REWARD_AVG")]
    pub parcel_reward_avg: Option<u32>,
    /// Reward spread of a fresh parcel.
    #[serde(default, alias = "PARCEL_REWARD_VARIANCE")]
    pub parcel_reward_variance: Option<u32>,
}

/// One tile of the initial map broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTile {
    /// Column index.
    pub x: u32,
    /// Row index.
    pub y: u32,
    /// Tile type code (`0` wall, `1` spawn, `2` depot, `3`-`5` plain).
    #[serde(alias = "type")]
    pub code: u8,
}

/// Self-observation: the agent's own identity, position, and score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YouUpdate {
    /// Own agent id.
    pub id: AgentId,
    /// Current column.
    pub x: u32,
    /// Current row.
    pub y: u32,
    /// Current game score.
    pub score: u64,
}

/// One parcel as seen by the parcel sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelSensed {
    /// Parcel id.
    pub id: ParcelId,
    /// Parcel column.
    pub x: u32,
    /// Parcel row.
    pub y: u32,
    /// Current reward.
    pub reward: i64,
    /// The carrying agent, if the parcel is being carried.
    #[serde(default)]
    pub carried_by: Option<AgentId>,
}

/// One agent as seen by the agent sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSensed {
    /// Agent id.
    pub id: AgentId,
    /// Agent column.
    pub x: u32,
    /// Agent row.
    pub y: u32,
}

/// An event pushed by the game transport into a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// The transport established its connection.
    Connected,
    /// The transport lost its connection.
    Disconnected,
    /// World constants broadcast.
    Config(RawGameConfig),
    /// Initial map broadcast.
    Map {
        /// Map width in tiles.
        width: u32,
        /// Map height in tiles.
        height: u32,
        /// Every tile of the map.
        tiles: Vec<RawTile>,
    },
    /// Self-observation.
    You(YouUpdate),
    /// Parcel sensing sweep.
    Parcels(Vec<ParcelSensed>),
    /// Agent sensing sweep.
    Agents(Vec<AgentSensed>),
    /// A say message from another agent.
    Message {
        /// The sending agent.
        sender: AgentId,
        /// The sender's display name.
        sender_name: String,
        /// The raw JSON payload.
        payload: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_accepts_server_field_names() {
        let json = serde_json::json!({
            "PARCEL_DECADING_INTERVAL": "2s",
            "PARCELS_OBSERVATION_DISTANCE": 10,
            "PARCEL_REWARD_AVG": 30,
            "PARCEL_REWARD_VARIANCE": 10,
        });
        let raw: Result<RawGameConfig, _> = serde_json::from_value(json);
        let raw = raw.ok().unwrap_or_default();
        assert_eq!(raw.parcel_decaying_interval.as_deref(), Some("2s"));
        assert_eq!(raw.parcels_observation_distance, Some(10));
    }

    #[test]
    fn raw_tile_accepts_type_alias() {
        let json = serde_json::json!({ "x": 1, "y": 2, "type": 2 });
        let tile: Result<RawTile, _> = serde_json::from_value(json);
        assert_eq!(tile.ok(), Some(RawTile { x: 1, y: 2, code: 2 }));
    }

    #[test]
    fn parcel_sensed_defaults_carrier_to_none() {
        let json = serde_json::json!({ "id": "p1", "x": 0, "y": 0, "reward": 10 });
        let sensed: Result<ParcelSensed, _> = serde_json::from_value(json);
        assert_eq!(sensed.ok().and_then(|p| p.carried_by), None);
    }
}
