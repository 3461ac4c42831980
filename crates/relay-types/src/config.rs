//! The agent configuration record.
//!
//! The core never reads the environment itself; process startup (the
//! engine binary) assembles this record and hands it to each worker.
//! All fields default to the documented deployment defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Tuning knobs for one agent worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    /// Whether this deployment runs two cooperating agents.
    #[serde(default)]
    pub dual_agent: bool,

    /// Whether this worker is the leader of the pair. The leader runs
    /// role election on the first companion-position message. Ignored in
    /// single-agent mode.
    #[serde(default)]
    pub is_leader: bool,

    /// Period of the fallback option-generation timer, in milliseconds.
    /// Covers stretches where no sensing event arrives.
    #[serde(default = "default_option_generation_interval_ms")]
    pub option_generation_interval_ms: u64,

    /// Carry saturation: at this many carried parcels the intention
    /// queue is filtered to drop-offs only.
    #[serde(default = "default_max_carried_parcels")]
    pub max_carried_parcels: usize,

    /// Radius (tiles) of the random-reposition spawn search.
    #[serde(default = "default_max_distance_for_random_move")]
    pub max_distance_for_random_move: u32,

    /// How many times the deliverer retries the common-delivery-tile
    /// negotiation before giving up.
    #[serde(default = "default_max_retry_common_delivery")]
    pub max_retry_common_delivery: u32,

    /// Seed for the worker's random number generator (spawn-tile choice).
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,

    /// Route with the symbolic PDDL planner instead of A* when true.
    #[serde(default)]
    pub pddl_goto: bool,

    /// Write each generated PDDL problem to this path for debugging.
    #[serde(default)]
    pub pddl_problem_dump: Option<PathBuf>,
}

const fn default_option_generation_interval_ms() -> u64 {
    200
}

const fn default_max_carried_parcels() -> usize {
    4
}

const fn default_max_distance_for_random_move() -> u32 {
    5
}

const fn default_max_retry_common_delivery() -> u32 {
    10
}

const fn default_rng_seed() -> u64 {
    42
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dual_agent: false,
            is_leader: false,
            option_generation_interval_ms: default_option_generation_interval_ms(),
            max_carried_parcels: default_max_carried_parcels(),
            max_distance_for_random_move: default_max_distance_for_random_move(),
            max_retry_common_delivery: default_max_retry_common_delivery(),
            rng_seed: default_rng_seed(),
            pddl_goto: false,
            pddl_problem_dump: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_table() {
        let config = AgentConfig::default();
        assert!(!config.dual_agent);
        assert_eq!(config.option_generation_interval_ms, 200);
        assert_eq!(config.max_carried_parcels, 4);
        assert_eq!(config.max_distance_for_random_move, 5);
        assert_eq!(config.max_retry_common_delivery, 10);
        assert!(!config.pddl_goto);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let json = serde_json::json!({ "dual_agent": true, "is_leader": true });
        let config: Result<AgentConfig, _> = serde_json::from_value(json);
        let config = config.ok().unwrap_or_default();
        assert!(config.dual_agent);
        assert!(config.is_leader);
        assert_eq!(config.max_carried_parcels, 4);
    }
}
