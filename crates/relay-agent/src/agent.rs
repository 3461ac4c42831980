//! The agent: identity, carry state, the intention queue with its
//! priority policy, and the loop that consumes it.
//!
//! One [`Agent`] exists per worker, shared as a cheap handle between the
//! observer task (which pushes options), the coordination handlers
//! (which flip mode flags), and the loop task (which pops and achieves
//! intentions). Lock order across the worker is agent-before-map; no
//! lock is held across an action RPC.

use std::collections::BTreeSet;
use std::sync::Arc;

use relay_types::{
    AgentConfig, AgentId, CompanionMessage, Hand2HandMode, ParcelId, Point, Predicate,
};
use relay_world::find_path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::error::{AgentError, PlanError};
use crate::intention::{Intention, StopToken};
use crate::state::WorldState;

/// Path score assigned to pickups the pathfinder cannot reach.
const UNREACHABLE: u32 = u32::MAX;

/// Mutable agent state, guarded by the [`Agent`] handle's mutex.
#[derive(Debug)]
pub struct AgentCore {
    /// Own id; `None` until the first self observation.
    pub id: Option<AgentId>,
    /// Own tile; `None` until the first self observation.
    pub position: Option<Point>,
    /// Current game score.
    pub score: u64,
    /// Number of parcels currently carried.
    pub carried_parcels: usize,
    /// The companion's id in a dual deployment.
    pub companion: Option<AgentId>,
    /// Whether this worker is the leader of the pair.
    pub is_leader: bool,
    /// Current hand-to-hand mode.
    pub mode: Hand2HandMode,
    /// The depot this worker delivers to (Deliver mode only).
    pub depot: Option<Point>,
    /// The negotiated shared delivery tile.
    pub delivery_tile: Option<Point>,
    /// Parcels claimed by the companion; never proposed as pickups.
    pub parcels_to_ignore: BTreeSet<ParcelId>,
    /// The ordered intention queue.
    pub queue: Vec<Intention>,
    /// Whether the loop may start consuming intentions.
    pub initialized: bool,
    /// Delivery-tile negotiation attempts so far.
    pub delivery_retry: u32,
    /// Tiles rejected during delivery-tile negotiation. Persists across
    /// negotiations so a rejected tile is never proposed again.
    pub tiles_to_avoid: BTreeSet<Point>,
    /// Stop token of the intention currently being achieved.
    pub current_stop: Option<StopToken>,
    /// Whether the leader has already run role election.
    pub election_done: bool,
}

/// Read-only copy of the agent's scalar state.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    /// Own id, if known.
    pub id: Option<AgentId>,
    /// Own tile, if known.
    pub position: Option<Point>,
    /// Current hand-to-hand mode.
    pub mode: Hand2HandMode,
    /// Number of parcels currently carried.
    pub carried_parcels: usize,
    /// The companion's id, if any.
    pub companion: Option<AgentId>,
    /// Whether this worker is the leader.
    pub is_leader: bool,
    /// Whether the loop is released.
    pub initialized: bool,
    /// Delivery depot (Deliver mode).
    pub depot: Option<Point>,
    /// Negotiated delivery tile.
    pub delivery_tile: Option<Point>,
    /// Parcels claimed by the companion.
    pub parcels_to_ignore: BTreeSet<ParcelId>,
}

/// Shared handle on one worker's agent.
#[derive(Debug, Clone)]
pub struct Agent {
    inner: Arc<Mutex<AgentCore>>,
}

impl Agent {
    /// Create an agent for one worker.
    ///
    /// Single-agent deployments start initialized; dual deployments wait
    /// for the coordination protocol to release the loop.
    pub fn new(config: &AgentConfig, companion: Option<AgentId>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AgentCore {
                id: None,
                position: None,
                score: 0,
                carried_parcels: 0,
                companion,
                is_leader: config.is_leader,
                mode: Hand2HandMode::None,
                depot: None,
                delivery_tile: None,
                parcels_to_ignore: BTreeSet::new(),
                queue: Vec::new(),
                initialized: !config.dual_agent,
                delivery_retry: 0,
                tiles_to_avoid: BTreeSet::new(),
                current_stop: None,
                election_done: false,
            })),
        }
    }

    // -------------------------------------------------------------------
    // State access
    // -------------------------------------------------------------------

    /// Copy of the scalar state.
    pub async fn snapshot(&self) -> AgentSnapshot {
        let core = self.inner.lock().await;
        AgentSnapshot {
            id: core.id.clone(),
            position: core.position,
            mode: core.mode,
            carried_parcels: core.carried_parcels,
            companion: core.companion.clone(),
            is_leader: core.is_leader,
            initialized: core.initialized,
            depot: core.depot,
            delivery_tile: core.delivery_tile,
            parcels_to_ignore: core.parcels_to_ignore.clone(),
        }
    }

    /// Record identity and score from a self observation.
    pub async fn set_identity(&self, id: AgentId, score: u64) {
        let mut core = self.inner.lock().await;
        core.id = Some(id);
        core.score = score;
    }

    /// Record the agent's position.
    pub async fn set_position(&self, position: Point) {
        self.inner.lock().await.position = Some(position);
    }

    /// The agent's position, once known.
    ///
    /// Yields cooperatively until the first self observation arrives, or
    /// fails with [`PlanError::Stopped`] when the token is set first.
    pub async fn current_position(&self, stop: &StopToken) -> Result<Point, PlanError> {
        loop {
            stop.ensure_active()?;
            if let Some(position) = self.inner.lock().await.position {
                return Ok(position);
            }
            tokio::task::yield_now().await;
        }
    }

    /// Switch the hand-to-hand mode.
    ///
    /// Claims in the ignore-list are only produced while both agents run
    /// default behavior, so a mode switch withdraws them.
    pub async fn set_mode(&self, mode: Hand2HandMode) {
        let mut core = self.inner.lock().await;
        info!(?mode, "hand-to-hand mode set");
        core.mode = mode;
        core.parcels_to_ignore.clear();
    }

    /// Record the delivery depot (Deliver mode).
    pub async fn set_depot(&self, depot: Point) {
        self.inner.lock().await.depot = Some(depot);
    }

    /// Record or clear the negotiated delivery tile.
    pub async fn set_delivery_tile(&self, tile: Option<Point>) {
        self.inner.lock().await.delivery_tile = tile;
    }

    /// Replace the ignore-list with the companion's claimed parcels.
    pub async fn set_parcels_to_ignore(&self, ids: Vec<ParcelId>) {
        self.inner.lock().await.parcels_to_ignore = ids.into_iter().collect();
    }

    /// Release the loop to start consuming intentions.
    pub async fn set_initialized(&self) {
        self.inner.lock().await.initialized = true;
    }

    /// Claim the one-shot right to run role election. Returns `false`
    /// when the election has already run.
    pub async fn begin_election(&self) -> bool {
        let mut core = self.inner.lock().await;
        if core.election_done {
            false
        } else {
            core.election_done = true;
            true
        }
    }

    /// Burn one delivery-tile negotiation attempt. Returns `false` once
    /// the budget is exhausted.
    pub async fn try_delivery_retry(&self, budget: u32) -> bool {
        let mut core = self.inner.lock().await;
        if core.delivery_retry >= budget {
            false
        } else {
            core.delivery_retry = core.delivery_retry.saturating_add(1);
            true
        }
    }

    /// Take the persistent avoid-set for a negotiation round.
    pub async fn take_tiles_to_avoid(&self) -> BTreeSet<Point> {
        std::mem::take(&mut self.inner.lock().await.tiles_to_avoid)
    }

    /// Store the avoid-set back after a negotiation round.
    pub async fn store_tiles_to_avoid(&self, tiles: BTreeSet<Point>) {
        self.inner.lock().await.tiles_to_avoid = tiles;
    }

    /// Account for a successful pickup: bump the carry count and drop
    /// the parcel from the belief map.
    pub async fn picked_up_parcel(&self, id: &ParcelId, world: &WorldState) {
        {
            let mut core = self.inner.lock().await;
            core.carried_parcels = core.carried_parcels.saturating_add(1);
        }
        world.edit_map(|m| m.parcel_picked_up(id)).await;
    }

    /// Account for a successful putdown: nothing is carried anymore.
    pub async fn drop_all_parcels(&self) {
        self.inner.lock().await.carried_parcels = 0;
    }

    /// Predicates currently queued, head first.
    pub async fn queue_predicates(&self) -> Vec<Predicate> {
        self.inner
            .lock()
            .await
            .queue
            .iter()
            .map(|i| i.predicate().clone())
            .collect()
    }

    /// Stop the intention currently being achieved, if any.
    pub async fn stop_current(&self) {
        if let Some(token) = &self.inner.lock().await.current_stop {
            token.stop();
        }
    }

    // -------------------------------------------------------------------
    // Queue policy
    // -------------------------------------------------------------------

    /// Commit to a new option.
    ///
    /// Rejects element-wise duplicates, appends an intention, and
    /// re-sorts the queue. Returns whether the predicate was accepted.
    pub async fn push(&self, predicate: Predicate, ctx: &AgentContext) -> bool {
        {
            let mut core = self.inner.lock().await;
            if core.queue.iter().any(|i| *i.predicate() == predicate) {
                debug!(%predicate, "duplicate predicate rejected");
                return false;
            }
            debug!(%predicate, "intention queued");
            core.queue.push(Intention::new(predicate));
        }
        self.sort_intention_queue(ctx).await;
        true
    }

    /// Enforce the queue priority policy.
    ///
    /// Pickups are scored by A* distance from the single pre-sort agent
    /// position (unreachable scores last) and sorted ascending. At most
    /// one drop-off and one goto survive, appended in that order. In
    /// dual-agent mode outside hand-to-hand, the ordered pickup ids are
    /// announced to the companion. Carry saturation filters the queue to
    /// drop-offs only.
    pub async fn sort_intention_queue(&self, ctx: &AgentContext) {
        let mut announce: Option<(AgentId, Vec<ParcelId>)> = None;

        {
            let mut core = self.inner.lock().await;
            let queue = std::mem::take(&mut core.queue);

            let mut pickups = Vec::new();
            let mut drop_offs = Vec::new();
            let mut go_tos = Vec::new();
            for intention in queue {
                match intention.predicate() {
                    Predicate::GoPickUp { .. } => pickups.push(intention),
                    Predicate::GoDropOff { .. } => drop_offs.push(intention),
                    Predicate::GoTo { .. } => go_tos.push(intention),
                }
            }

            let position = core.position;
            let mut scored = Vec::with_capacity(pickups.len());
            for intention in pickups {
                let target = intention.predicate().target();
                let score = match position {
                    Some(from) => ctx
                        .world
                        .with_map(|m| find_path(m, from, target))
                        .await
                        .flatten()
                        .map_or(UNREACHABLE, |path| {
                            u32::try_from(path.len()).unwrap_or(UNREACHABLE)
                        }),
                    None => UNREACHABLE,
                };
                scored.push((score, intention));
            }
            scored.sort_by_key(|(score, _)| *score);

            if ctx.config.dual_agent && core.mode == Hand2HandMode::None {
                if let Some(companion) = core.companion.clone() {
                    let parcel_ids: Vec<ParcelId> = scored
                        .iter()
                        .filter_map(|(_, intention)| match intention.predicate() {
                            Predicate::GoPickUp { parcel, .. } => Some(parcel.clone()),
                            _ => None,
                        })
                        .collect();
                    if !parcel_ids.is_empty() {
                        announce = Some((companion, parcel_ids));
                    }
                }
            }

            let mut rebuilt: Vec<Intention> =
                scored.into_iter().map(|(_, intention)| intention).collect();
            if let Some(first) = drop_offs.into_iter().next() {
                rebuilt.push(first);
            }
            if let Some(first) = go_tos.into_iter().next() {
                rebuilt.push(first);
            }

            if core.carried_parcels >= ctx.config.max_carried_parcels {
                rebuilt.retain(|i| i.predicate().is_drop_off());
            }

            core.queue = rebuilt;
        }

        // Announce outside the lock; the say RPC must not serialise the
        // queue.
        if let Some((companion, parcel_ids)) = announce {
            if let Err(error) = ctx
                .client
                .emit_say(companion, CompanionMessage::MultiPickup { parcel_ids })
                .await
            {
                warn!(error = %error, "pickup announcement failed");
            }
        }
    }

    /// Pop the queue head when the agent is released and work exists.
    async fn pop_ready(&self) -> Option<Intention> {
        let mut core = self.inner.lock().await;
        if !core.initialized || core.queue.is_empty() {
            return None;
        }
        let intention = core.queue.remove(0);
        core.current_stop = Some(intention.stop_token());
        Some(intention)
    }

    // -------------------------------------------------------------------
    // Loop
    // -------------------------------------------------------------------

    /// Consume intentions until shut down.
    ///
    /// Failures are caught here and logged; only the shutdown token ends
    /// the loop. The explicit yield keeps the sensor and timer tasks fed
    /// on a busy queue and on an idle one.
    pub async fn run_loop(&self, ctx: &AgentContext, shutdown: StopToken) {
        info!("agent loop started");
        while !shutdown.is_stopped() {
            if let Some(mut intention) = self.pop_ready().await {
                let predicate = intention.predicate().clone();
                match intention.achieve(ctx).await {
                    Ok(outcome) => debug!(%predicate, outcome, "intention resolved"),
                    Err(AgentError::Stopped) => debug!(%predicate, "intention stopped"),
                    Err(error) => warn!(%predicate, error = %error, "intention failed"),
                }
                self.inner.lock().await.current_stop = None;
            }
            tokio::task::yield_now().await;
        }
        info!("agent loop terminated");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relay_types::RawTile;
    use relay_world::MapRole;

    use super::*;
    use crate::client::{RecordedAction, StubTransport};

    async fn make_context(config: AgentConfig, start: Point) -> (AgentContext, StubTransport) {
        let mut raw = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                raw.push(RawTile { x, y, code: 3 });
            }
        }
        let world = WorldState::new();
        world.install_map(8, 8, &raw, MapRole::Solo).await.unwrap();

        let companion = config
            .dual_agent
            .then(|| AgentId::new("companion"));
        let agent = Agent::new(&config, companion);
        agent.set_position(start).await;

        let (client, stub) = StubTransport::spawn(start);
        let ctx = AgentContext::new(agent, world, client, Arc::new(config));
        (ctx, stub)
    }

    fn pick_up(x: u32, y: u32, id: &str) -> Predicate {
        Predicate::GoPickUp {
            x,
            y,
            parcel: ParcelId::new(id),
        }
    }

    #[tokio::test]
    async fn sort_orders_pickups_by_path_length() {
        let (ctx, _stub) = make_context(AgentConfig::default(), Point::new(0, 0)).await;

        assert!(ctx.agent.push(pick_up(5, 5, "P1"), &ctx).await);
        assert!(ctx.agent.push(pick_up(1, 0, "P2"), &ctx).await);
        assert!(
            ctx.agent
                .push(Predicate::GoDropOff { x: 3, y: 3, depot: None }, &ctx)
                .await
        );
        assert!(ctx.agent.push(Predicate::GoTo { x: 7, y: 7 }, &ctx).await);

        let queue = ctx.agent.queue_predicates().await;
        assert_eq!(
            queue,
            vec![
                pick_up(1, 0, "P2"),
                pick_up(5, 5, "P1"),
                Predicate::GoDropOff { x: 3, y: 3, depot: None },
                Predicate::GoTo { x: 7, y: 7 },
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_predicates_are_rejected() {
        let (ctx, _stub) = make_context(AgentConfig::default(), Point::new(0, 0)).await;

        assert!(ctx.agent.push(pick_up(2, 2, "P1"), &ctx).await);
        assert!(!ctx.agent.push(pick_up(2, 2, "P1"), &ctx).await);
        assert_eq!(ctx.agent.queue_predicates().await.len(), 1);
    }

    #[tokio::test]
    async fn sort_keeps_one_drop_off_and_one_goto() {
        let (ctx, _stub) = make_context(AgentConfig::default(), Point::new(0, 0)).await;

        let _ = ctx
            .agent
            .push(Predicate::GoDropOff { x: 1, y: 1, depot: None }, &ctx)
            .await;
        let _ = ctx
            .agent
            .push(Predicate::GoDropOff { x: 2, y: 2, depot: None }, &ctx)
            .await;
        let _ = ctx.agent.push(Predicate::GoTo { x: 3, y: 3 }, &ctx).await;
        let _ = ctx.agent.push(Predicate::GoTo { x: 4, y: 4 }, &ctx).await;

        let queue = ctx.agent.queue_predicates().await;
        assert_eq!(
            queue,
            vec![
                Predicate::GoDropOff { x: 1, y: 1, depot: None },
                Predicate::GoTo { x: 3, y: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn carry_saturation_filters_to_drop_offs() {
        let config = AgentConfig {
            max_carried_parcels: 2,
            ..AgentConfig::default()
        };
        let (ctx, _stub) = make_context(config, Point::new(0, 0)).await;

        ctx.agent
            .picked_up_parcel(&ParcelId::new("a"), &ctx.world)
            .await;
        ctx.agent
            .picked_up_parcel(&ParcelId::new("b"), &ctx.world)
            .await;

        let _ = ctx
            .agent
            .push(Predicate::GoDropOff { x: 0, y: 0, depot: None }, &ctx)
            .await;
        let _ = ctx.agent.push(pick_up(4, 4, "P3"), &ctx).await;

        let queue = ctx.agent.queue_predicates().await;
        assert_eq!(
            queue,
            vec![Predicate::GoDropOff { x: 0, y: 0, depot: None }]
        );
    }

    #[tokio::test]
    async fn dual_mode_announces_ordered_pickups() {
        let config = AgentConfig {
            dual_agent: true,
            is_leader: true,
            ..AgentConfig::default()
        };
        let (ctx, stub) = make_context(config, Point::new(0, 0)).await;
        ctx.agent.set_initialized().await;

        let _ = ctx.agent.push(pick_up(5, 5, "P1"), &ctx).await;
        let _ = ctx.agent.push(pick_up(1, 0, "P2"), &ctx).await;

        let recorded = stub.recorded().await;
        let last_say = recorded
            .iter()
            .rev()
            .find_map(|action| match action {
                RecordedAction::Say(to, message) => Some((to.clone(), message.clone())),
                _ => None,
            })
            .unwrap();

        assert_eq!(last_say.0, AgentId::new("companion"));
        assert_eq!(
            last_say.1,
            CompanionMessage::MultiPickup {
                parcel_ids: vec![ParcelId::new("P2"), ParcelId::new("P1")],
            }
        );
    }

    #[tokio::test]
    async fn achieve_is_idempotent_and_emits_no_extra_rpcs() {
        let (ctx, stub) = make_context(AgentConfig::default(), Point::new(2, 2)).await;

        // Parcel on the agent's own tile: no routing needed.
        let mut intention = Intention::new(pick_up(2, 2, "P1"));
        assert!(intention.achieve(&ctx).await.unwrap());
        assert!(intention.achieve(&ctx).await.unwrap());

        let pickups = stub
            .recorded()
            .await
            .iter()
            .filter(|a| matches!(a, RecordedAction::Pickup))
            .count();
        assert_eq!(pickups, 1);
    }

    #[tokio::test]
    async fn stopped_intentions_emit_no_rpcs() {
        let (ctx, stub) = make_context(AgentConfig::default(), Point::new(0, 0)).await;

        let mut intention = Intention::new(Predicate::GoTo { x: 5, y: 5 });
        intention.stop();
        assert!(matches!(
            intention.achieve(&ctx).await,
            Err(AgentError::Stopped)
        ));
        assert!(stub.recorded().await.is_empty());
    }

    #[tokio::test]
    async fn stop_reaches_a_running_sub_intention() {
        let (ctx, stub) = make_context(AgentConfig::default(), Point::new(0, 0)).await;
        // Refuse every move so the routing sub-intention keeps retrying.
        stub.fail_next_moves(u32::MAX).await;

        let mut intention = Intention::new(pick_up(6, 6, "P1"));
        let token = intention.stop_token();
        let task = tokio::spawn(async move { intention.achieve(&ctx).await });

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        token.stop();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(AgentError::Stopped)));

        // No RPC may arrive after the cancellation settles.
        let settled = stub.recorded().await.len();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(stub.recorded().await.len(), settled);
    }
}
