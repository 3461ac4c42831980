//! The option generator: beliefs in, candidate desires out.
//!
//! A pure function of the current beliefs and the agent's mode,
//! triggered on every parcel/agent sensing event and by a fixed-interval
//! timer that covers sensing droughts. Produced predicates go through
//! [`Agent::push`], which deduplicates and re-sorts the queue.
//!
//! [`Agent::push`]: crate::agent::Agent::push

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use relay_types::{
    CompanionMessage, DeliveryTileStatus, Hand2HandMode, Parcel, Point, Predicate,
};
use relay_world::{GridMap, find_path};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::intention::StopToken;
use crate::state::WorldState;

/// Produces candidate desires from the current beliefs.
pub struct OptionGenerator {
    ctx: AgentContext,
    rng: Mutex<StdRng>,
}

impl OptionGenerator {
    /// Create a generator with a seeded RNG for reproducible
    /// repositioning choices.
    pub fn new(ctx: AgentContext) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(ctx.config.rng_seed));
        Self { ctx, rng }
    }

    /// Run one generation pass for the current mode.
    pub async fn generate(&self) {
        if !self.ctx.world.is_populated().await {
            return;
        }
        match self.ctx.agent.snapshot().await.mode {
            Hand2HandMode::None => self.generate_normal().await,
            Hand2HandMode::Gather => self.generate_gather().await,
            Hand2HandMode::Deliver => self.generate_deliver().await,
        }
    }

    /// Drive the fallback timer until shutdown.
    pub async fn run_timer(&self, shutdown: StopToken) {
        let interval = Duration::from_millis(self.ctx.config.option_generation_interval_ms);
        loop {
            tokio::time::sleep(interval).await;
            if shutdown.is_stopped() {
                return;
            }
            self.generate().await;
        }
    }

    /// Believed parcels, snapshotted under one read guard.
    async fn parcels(&self) -> Vec<Parcel> {
        self.ctx
            .world
            .with_map(|m| m.parcels().cloned().collect())
            .await
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------
    // Normal mode
    // -------------------------------------------------------------------

    async fn generate_normal(&self) {
        let snapshot = self.ctx.agent.snapshot().await;

        for parcel in self.parcels().await {
            if snapshot.parcels_to_ignore.contains(&parcel.id) {
                continue;
            }
            let _ = self
                .ctx
                .agent
                .push(
                    Predicate::GoPickUp {
                        x: parcel.x,
                        y: parcel.y,
                        parcel: parcel.id,
                    },
                    &self.ctx,
                )
                .await;
        }

        if snapshot.carried_parcels > 0 {
            if let Some(from) = snapshot.position {
                if let Some(depot) = nearest_reachable_depot(&self.ctx.world, from).await {
                    let _ = self
                        .ctx
                        .agent
                        .push(
                            Predicate::GoDropOff {
                                x: depot.x,
                                y: depot.y,
                                depot: None,
                            },
                            &self.ctx,
                        )
                        .await;
                }
            }
        }

        if self.ctx.agent.queue_predicates().await.is_empty() {
            self.random_reposition(snapshot.position).await;
        }
    }

    /// Idle fallback: walk to a random spawn tile, preferring nearby
    /// ones.
    ///
    /// Spawn tiles are filtered by Euclidean distance, then by path
    /// length, both against the same radius. An empty Euclidean filter
    /// widens the choice to every spawn tile.
    async fn random_reposition(&self, position: Option<Point>) {
        let Some(from) = position else {
            return;
        };
        let spawns = self
            .ctx
            .world
            .with_map(|m| m.spawn_tiles().to_vec())
            .await
            .unwrap_or_default();
        if spawns.is_empty() {
            return;
        }

        let radius = self.ctx.config.max_distance_for_random_move;
        let near: Vec<Point> = spawns
            .iter()
            .copied()
            .filter(|s| from.euclidean_within(*s, radius))
            .collect();

        let candidates = if near.is_empty() {
            spawns
        } else {
            let within_path: Vec<Point> = {
                let near = &near;
                self.ctx
                    .world
                    .with_map(|m| {
                        near.iter()
                            .copied()
                            .filter(|s| {
                                find_path(m, from, *s).is_some_and(|path| {
                                    u32::try_from(path.len()).is_ok_and(|len| len <= radius)
                                })
                            })
                            .collect()
                    })
                    .await
                    .unwrap_or_default()
            };
            if within_path.is_empty() { near } else { within_path }
        };

        let choice = {
            let mut rng = self.rng.lock().await;
            candidates.choose(&mut *rng).copied()
        };
        if let Some(target) = choice {
            debug!(spawn = %target, "idle reposition toward spawn");
            let _ = self
                .ctx
                .agent
                .push(Predicate::GoTo { x: target.x, y: target.y }, &self.ctx)
                .await;
        }
    }

    // -------------------------------------------------------------------
    // Gather mode
    // -------------------------------------------------------------------

    async fn generate_gather(&self) {
        let snapshot = self.ctx.agent.snapshot().await;
        // Gathering is meaningless until the pair has agreed on a tile.
        let Some(delivery_tile) = snapshot.delivery_tile else {
            return;
        };

        let mut proposed = false;
        for parcel in self.parcels().await {
            if parcel.point() == delivery_tile
                || snapshot.parcels_to_ignore.contains(&parcel.id)
            {
                continue;
            }
            proposed |= self
                .ctx
                .agent
                .push(
                    Predicate::GoPickUp {
                        x: parcel.x,
                        y: parcel.y,
                        parcel: parcel.id,
                    },
                    &self.ctx,
                )
                .await;
        }

        if snapshot.carried_parcels > 0 {
            let _ = self
                .ctx
                .agent
                .push(
                    Predicate::GoDropOff {
                        x: delivery_tile.x,
                        y: delivery_tile.y,
                        depot: None,
                    },
                    &self.ctx,
                )
                .await;
        } else if !proposed {
            let first_spawn = self
                .ctx
                .world
                .with_map(|m| m.spawn_tiles().first().copied())
                .await
                .flatten();
            if let Some(spawn) = first_spawn {
                let _ = self
                    .ctx
                    .agent
                    .push(Predicate::GoTo { x: spawn.x, y: spawn.y }, &self.ctx)
                    .await;
            }
        }
    }

    // -------------------------------------------------------------------
    // Deliver mode
    // -------------------------------------------------------------------

    async fn generate_deliver(&self) {
        let snapshot = self.ctx.agent.snapshot().await;
        let Some(depot) = snapshot.depot else {
            return;
        };
        let Some(from) = snapshot.position else {
            return;
        };

        if snapshot.carried_parcels == 0 && from != depot {
            let _ = self
                .ctx
                .agent
                .push(Predicate::GoTo { x: depot.x, y: depot.y }, &self.ctx)
                .await;
        }

        if snapshot.delivery_tile.is_none()
            && self
                .ctx
                .agent
                .try_delivery_retry(self.ctx.config.max_retry_common_delivery)
                .await
        {
            self.negotiate_delivery_tile(from, &snapshot.companion).await;
        }

        // Only parcels the gatherer left on the shared tile are ours.
        if let Some(delivery_tile) = self.ctx.agent.snapshot().await.delivery_tile {
            for parcel in self.parcels().await {
                if parcel.point() != delivery_tile {
                    continue;
                }
                let _ = self
                    .ctx
                    .agent
                    .push(
                        Predicate::GoPickUp {
                            x: parcel.x,
                            y: parcel.y,
                            parcel: parcel.id,
                        },
                        &self.ctx,
                    )
                    .await;
            }
        }

        if snapshot.carried_parcels > 0 {
            let _ = self
                .ctx
                .agent
                .push(
                    Predicate::GoDropOff {
                        x: depot.x,
                        y: depot.y,
                        depot: None,
                    },
                    &self.ctx,
                )
                .await;
        }
    }

    /// One negotiation attempt: search outward from the companion's
    /// last known tile, record a hit, and announce it.
    async fn negotiate_delivery_tile(
        &self,
        from: Point,
        companion: &Option<relay_types::AgentId>,
    ) {
        let seed = self
            .ctx
            .world
            .with_map(GridMap::companion_position)
            .await
            .flatten();
        let Some(seed) = seed else {
            return;
        };

        let mut avoid = self.ctx.agent.take_tiles_to_avoid().await;
        let found = self
            .ctx
            .world
            .with_map(|m| find_common_delivery_tile(m, from, vec![seed], &mut avoid))
            .await
            .flatten();
        self.ctx.agent.store_tiles_to_avoid(avoid).await;

        let Some(tile) = found else {
            debug!("delivery tile search exhausted this round");
            return;
        };

        info!(%tile, "common delivery tile found");
        self.ctx.agent.set_delivery_tile(Some(tile)).await;

        if let Some(companion) = companion {
            let message = CompanionMessage::DeliveryTile {
                status: DeliveryTileStatus::Set,
                tile: Some(tile),
            };
            if let Err(error) = self.ctx.client.emit_say(companion.clone(), message).await {
                warn!(error = %error, "delivery tile announcement failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reachability queries
// ---------------------------------------------------------------------------

/// The depot with the shortest path from `from`, if any is reachable.
pub async fn nearest_reachable_depot(world: &WorldState, from: Point) -> Option<Point> {
    world
        .with_map(|m| {
            m.depot_tiles()
                .iter()
                .copied()
                .filter_map(|depot| find_path(m, from, depot).map(|path| (path.len(), depot)))
                .min_by_key(|(length, _)| *length)
                .map(|(_, depot)| depot)
        })
        .await
        .flatten()
}

/// Whether any spawn tile is reachable from `from`.
pub async fn has_reachable_spawn(world: &WorldState, from: Point) -> bool {
    world
        .with_map(|m| {
            m.spawn_tiles()
                .iter()
                .any(|spawn| find_path(m, from, *spawn).is_some())
        })
        .await
        .unwrap_or(false)
}

/// Breadth-first search for a tile the deliverer can reach, expanding
/// outward from the seed candidates through walkable neighbours.
///
/// A candidate already in `avoid` is skipped; an unreachable candidate
/// joins `avoid` permanently and contributes its neighbours. Returns
/// `None` when the frontier is exhausted.
pub fn find_common_delivery_tile(
    map: &GridMap,
    from: Point,
    seeds: Vec<Point>,
    avoid: &mut BTreeSet<Point>,
) -> Option<Point> {
    let mut frontier: VecDeque<Point> = seeds.into();

    while let Some(candidate) = frontier.pop_front() {
        if !avoid.contains(&candidate) && find_path(map, from, candidate).is_some() {
            return Some(candidate);
        }
        // The candidate stays avoided, but its neighbours are still part
        // of the frontier: a rejected tile must not orphan the region
        // behind it on the next negotiation round.
        avoid.insert(candidate);
        for neighbor in map.neighbor_tiles(candidate, true) {
            let point = neighbor.point();
            if !avoid.contains(&point) {
                frontier.push_back(point);
            }
        }
    }

    None
}
