//! Environment-variable configuration for the engine process.
//!
//! The core consumes configuration only through the typed
//! [`AgentConfig`] record; this module is the single place where the
//! process environment is read. Every variable has the documented
//! deployment default; a present-but-unparsable value is a startup
//! error rather than a silent fallback.

use std::path::PathBuf;
use std::str::FromStr;

use relay_types::AgentConfig;

use crate::error::EngineError;

/// Typed view of the engine's environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    /// `DUAL_AGENT`: run two cooperating workers.
    pub dual_agent: bool,
    /// `OPTION_GENERATION_INTERVAL`: fallback option timer, milliseconds.
    pub option_generation_interval_ms: u64,
    /// `MAX_CARRIED_PARCELS`: carry saturation threshold.
    pub max_carried_parcels: usize,
    /// `MAX_DISTANCE_FOR_RANDOM_MOVE`: idle reposition radius, tiles.
    pub max_distance_for_random_move: u32,
    /// `MAX_RETRY_COMMON_DELIVERY`: delivery-tile negotiation budget.
    pub max_retry_common_delivery: u32,
    /// `RNG_SEED`: worker RNG seed.
    pub rng_seed: u64,
    /// `SIM_CONFIG`: path to the simulated-world YAML file.
    pub sim_config: Option<PathBuf>,
}

impl EnvSettings {
    /// Read and validate the environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for any variable that is set but
    /// does not parse.
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = AgentConfig::default();
        Ok(Self {
            dual_agent: parse_flag("DUAL_AGENT")?.unwrap_or(false),
            option_generation_interval_ms: parse_var("OPTION_GENERATION_INTERVAL")?
                .unwrap_or(defaults.option_generation_interval_ms),
            max_carried_parcels: parse_var("MAX_CARRIED_PARCELS")?
                .unwrap_or(defaults.max_carried_parcels),
            max_distance_for_random_move: parse_var("MAX_DISTANCE_FOR_RANDOM_MOVE")?
                .unwrap_or(defaults.max_distance_for_random_move),
            max_retry_common_delivery: parse_var("MAX_RETRY_COMMON_DELIVERY")?
                .unwrap_or(defaults.max_retry_common_delivery),
            rng_seed: parse_var("RNG_SEED")?.unwrap_or(defaults.rng_seed),
            sim_config: std::env::var_os("SIM_CONFIG").map(PathBuf::from),
        })
    }

    /// Build one worker's configuration record.
    pub fn agent_config(&self, is_leader: bool) -> AgentConfig {
        AgentConfig {
            dual_agent: self.dual_agent,
            is_leader,
            option_generation_interval_ms: self.option_generation_interval_ms,
            max_carried_parcels: self.max_carried_parcels,
            max_distance_for_random_move: self.max_distance_for_random_move,
            max_retry_common_delivery: self.max_retry_common_delivery,
            // Distinct seeds keep the pair from mirroring each other's
            // random repositioning.
            rng_seed: if is_leader {
                self.rng_seed
            } else {
                self.rng_seed.wrapping_add(1)
            },
            ..AgentConfig::default()
        }
    }
}

/// Parse an optional environment variable with [`FromStr`].
fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, EngineError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_parse| EngineError::Config {
                name: name.to_owned(),
                value,
            }),
        Err(_unset) => Ok(None),
    }
}

/// Parse an optional boolean flag (`1`/`true`/`yes` vs `0`/`false`/`no`).
fn parse_flag(name: &str) -> Result<Option<bool>, EngineError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" | "" => Ok(Some(false)),
            _ => Err(EngineError::Config {
                name: name.to_owned(),
                value,
            }),
        },
        Err(_unset) => Ok(None),
    }
}
