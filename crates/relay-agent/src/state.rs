//! The shared world-state handle: belief map plus world constants.
//!
//! One [`WorldState`] exists per worker and is cloned into every task
//! that needs it (observer, option generator, plans). It is the explicit
//! collaborator that replaces a process-wide singleton: the observer
//! task is the only writer, readers snapshot under the same lock, and
//! the `Notify` gate lets early readers wait until the first map
//! broadcast has been applied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_types::{
    AgentId, AgentSensed, GameConfig, Parcel, ParcelSensed, Point, RawGameConfig, RawTile, Tile,
    TrackedAgent, parse_decay_interval,
};
use relay_world::{GridMap, MapRole, WorldError};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

/// Shared handle on one worker's belief state.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    inner: Arc<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    /// The belief map; `None` until the first map broadcast.
    map: RwLock<Option<GridMap>>,
    /// Woken when the map becomes populated.
    populated: Notify,
    /// Parsed world constants from the config broadcast.
    config: RwLock<GameConfig>,
}

impl WorldState {
    /// Create an empty, unpopulated world state.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------

    /// Capture world constants from the server's config broadcast.
    pub async fn apply_config(&self, raw: &RawGameConfig) {
        let parsed = GameConfig {
            parcel_decay: raw
                .parcel_decaying_interval
                .as_deref()
                .and_then(parse_decay_interval),
            parcels_observation_distance: raw.parcels_observation_distance.unwrap_or_default(),
            parcel_reward_avg: raw.parcel_reward_avg.unwrap_or_default(),
            parcel_reward_variance: raw.parcel_reward_variance.unwrap_or_default(),
        };
        info!(
            parcel_decay = ?parsed.parcel_decay,
            observation_distance = parsed.parcels_observation_distance,
            "world config captured"
        );
        *self.inner.config.write().await = parsed;
    }

    /// The captured world constants.
    pub async fn game_config(&self) -> GameConfig {
        self.inner.config.read().await.clone()
    }

    // -------------------------------------------------------------------
    // Map lifecycle
    // -------------------------------------------------------------------

    /// Build and install the belief map from the initial map broadcast.
    ///
    /// Wakes every reader waiting on the populated gate.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] when the broadcast contains an unknown
    /// tile code or an out-of-bounds tile. Fatal for the worker.
    pub async fn install_map(
        &self,
        width: u32,
        height: u32,
        tiles: &[RawTile],
        role: MapRole,
    ) -> Result<(), WorldError> {
        let mut map = GridMap::from_raw(width, height, tiles)?;
        map.set_role(role);
        info!(width, height, "belief map installed");
        *self.inner.map.write().await = Some(map);
        self.inner.populated.notify_waiters();
        Ok(())
    }

    /// Whether the map has been populated at least once.
    pub async fn is_populated(&self) -> bool {
        self.inner.map.read().await.is_some()
    }

    /// Wait until the map has been populated at least once.
    pub async fn wait_populated(&self) {
        loop {
            // Register for the wakeup before checking, so a broadcast
            // between the check and the await is not lost.
            let notified = self.inner.populated.notified();
            if self.is_populated().await {
                return;
            }
            notified.await;
        }
    }

    /// Run a closure against the map under the read lock, if populated.
    pub async fn with_map<R>(&self, f: impl FnOnce(&GridMap) -> R) -> Option<R> {
        self.inner.map.read().await.as_ref().map(f)
    }

    /// Run a closure against the map under the read lock, waiting for
    /// population first.
    pub async fn with_map_wait<R>(&self, f: impl FnOnce(&GridMap) -> R) -> R {
        let mut f = Some(f);
        loop {
            self.wait_populated().await;
            let guard = self.inner.map.read().await;
            if let Some(map) = guard.as_ref() {
                if let Some(func) = f.take() {
                    return func(map);
                }
            }
        }
    }

    /// Run a closure against the map under the write lock, if populated.
    pub async fn edit_map<R>(&self, f: impl FnOnce(&mut GridMap) -> R) -> Option<R> {
        self.inner.map.write().await.as_mut().map(f)
    }

    // -------------------------------------------------------------------
    // Snapshot queries (block until populated)
    // -------------------------------------------------------------------

    /// Snapshot of the currently walkable tiles.
    pub async fn walkable_tiles(&self, with_agents: bool) -> Vec<Tile> {
        self.with_map_wait(|m| m.walkable_tiles(with_agents)).await
    }

    /// Snapshot of the depot tiles.
    pub async fn depot_tiles(&self) -> Vec<Point> {
        self.with_map_wait(|m| m.depot_tiles().to_vec()).await
    }

    /// Snapshot of the spawn tiles.
    pub async fn spawn_tiles(&self) -> Vec<Point> {
        self.with_map_wait(|m| m.spawn_tiles().to_vec()).await
    }

    // -------------------------------------------------------------------
    // Sensing application
    // -------------------------------------------------------------------

    /// Apply a parcel sensing sweep: timestamp with `now`, keep only
    /// uncarried parcels, merge into the map.
    pub async fn apply_parcels(&self, sensed: Vec<ParcelSensed>, now: DateTime<Utc>) {
        let decay = self.inner.config.read().await.parcel_decay;
        let incoming: Vec<Parcel> = sensed
            .into_iter()
            .filter(|p| p.carried_by.is_none())
            .map(|p| Parcel {
                id: p.id,
                x: p.x,
                y: p.y,
                reward: p.reward,
                timestamp: now,
                carried_by: None,
            })
            .collect();

        let applied = self
            .edit_map(|m| {
                m.update_parcels(incoming, now, decay);
                m.parcel_count()
            })
            .await;
        debug!(parcels = ?applied, "parcel sensing applied");
    }

    /// Apply an agent sensing sweep.
    ///
    /// Own sightings are ignored (the self observation is authoritative
    /// for position); companion sightings update the companion position
    /// field; everything else is upserted as an adversary.
    pub async fn apply_agents(
        &self,
        sensed: Vec<AgentSensed>,
        own: Option<&AgentId>,
        companion: Option<&AgentId>,
        is_leader: bool,
        now: DateTime<Utc>,
    ) {
        let mut adversaries = Vec::new();
        let mut companion_seen = None;

        for sighting in sensed {
            if own == Some(&sighting.id) {
                continue;
            }
            if companion == Some(&sighting.id) {
                companion_seen = Some(Point::new(sighting.x, sighting.y));
                continue;
            }
            adversaries.push(TrackedAgent {
                id: sighting.id,
                x: sighting.x,
                y: sighting.y,
                timestamp: now,
            });
        }

        self.edit_map(|m| {
            if let Some(point) = companion_seen {
                if is_leader {
                    m.set_follower_position(point);
                } else {
                    m.set_leader_position(point);
                }
            }
            m.update_adversaries(adversaries);
        })
        .await;
    }

    /// Record the companion's position as announced over the say channel.
    pub async fn set_companion_position(&self, point: Point, is_leader: bool) {
        self.edit_map(|m| {
            if is_leader {
                m.set_follower_position(point);
            } else {
                m.set_leader_position(point);
            }
        })
        .await;
    }

    /// Record this worker's own position on the map's teammate fields.
    pub async fn set_own_position(&self, point: Point, is_leader: bool) {
        self.edit_map(|m| {
            if is_leader {
                m.set_leader_position(point);
            } else {
                m.set_follower_position(point);
            }
        })
        .await;
    }
}
