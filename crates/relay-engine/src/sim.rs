//! In-process simulated game transport.
//!
//! Stands in for the real game server so the core can be run and tested
//! end-to-end: it owns the authoritative grid, spawns parcels on spawn
//! tiles, validates moves, scores depot deliveries, broadcasts sensing
//! sweeps, and routes say messages between the seats. One seat per
//! worker, at most two seats.
//!
//! Sensor events go out on unbounded channels: the sim must never block
//! on a slow worker, because that worker may itself be waiting on an
//! action reply from the sim.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use relay_agent::{ActionCommand, StopToken};
use relay_types::{
    AgentId, AgentSensed, Direction, ParcelId, ParcelSensed, Point, RawGameConfig, RawTile,
    SensorEvent, TileKind, YouUpdate,
};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Definition of the simulated world, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimConfig {
    /// Display name of the world.
    #[serde(default = "default_name")]
    pub name: String,

    /// The grid as rows of tile type digits (`0` wall, `1` spawn, `2`
    /// depot, `3`-`5` plain). Row index is the `y` coordinate.
    #[serde(default = "default_rows")]
    pub rows: Vec<String>,

    /// Milliseconds between parcel spawn attempts.
    #[serde(default = "default_parcel_spawn_interval_ms")]
    pub parcel_spawn_interval_ms: u64,

    /// Average reward of a fresh parcel.
    #[serde(default = "default_parcel_reward_avg")]
    pub parcel_reward_avg: u32,

    /// Reward spread of a fresh parcel.
    #[serde(default = "default_parcel_reward_variance")]
    pub parcel_reward_variance: u32,

    /// Seconds per reward decay step; `None` disables decay.
    #[serde(default)]
    pub parcel_decay_seconds: Option<u64>,

    /// Milliseconds between sensing broadcasts.
    #[serde(default = "default_sense_interval_ms")]
    pub sense_interval_ms: u64,

    /// Maximum number of parcels lying on the ground at once.
    #[serde(default = "default_max_parcels")]
    pub max_parcels: usize,

    /// Seed for the spawner RNG.
    #[serde(default = "default_sim_seed")]
    pub seed: u64,

    /// Sensing radius (Manhattan), in tiles.
    #[serde(default = "default_observation_distance")]
    pub observation_distance: u32,
}

fn default_name() -> String {
    String::from("relay-sim")
}

fn default_rows() -> Vec<String> {
    vec![
        String::from("3333333"),
        String::from("3111333"),
        String::from("3333333"),
        String::from("3333333"),
        String::from("3333233"),
        String::from("3333333"),
        String::from("3333333"),
    ]
}

const fn default_parcel_spawn_interval_ms() -> u64 {
    1000
}

const fn default_parcel_reward_avg() -> u32 {
    30
}

const fn default_parcel_reward_variance() -> u32 {
    10
}

const fn default_sense_interval_ms() -> u64 {
    100
}

const fn default_max_parcels() -> usize {
    5
}

const fn default_sim_seed() -> u64 {
    7
}

const fn default_observation_distance() -> u32 {
    10
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            rows: default_rows(),
            parcel_spawn_interval_ms: default_parcel_spawn_interval_ms(),
            parcel_reward_avg: default_parcel_reward_avg(),
            parcel_reward_variance: default_parcel_reward_variance(),
            parcel_decay_seconds: None,
            sense_interval_ms: default_sense_interval_ms(),
            max_parcels: default_max_parcels(),
            seed: default_sim_seed(),
            observation_distance: default_observation_distance(),
        }
    }
}

impl SimConfig {
    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Yaml`] on malformed YAML.
    pub fn parse(yaml: &str) -> Result<Self, EngineError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Load a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] or [`EngineError::Yaml`].
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

// ---------------------------------------------------------------------------
// Sim state
// ---------------------------------------------------------------------------

/// A parcel lying on the ground.
#[derive(Debug, Clone)]
struct SimParcel {
    id: ParcelId,
    position: Point,
    reward: i64,
    spawned: Instant,
}

/// One connected worker's seat.
#[derive(Debug)]
struct Seat {
    id: AgentId,
    name: String,
    position: Point,
    score: u64,
    carrying: Vec<SimParcel>,
    events: mpsc::UnboundedSender<SensorEvent>,
}

/// The simulated game.
#[derive(Debug)]
pub struct GameSim {
    config: SimConfig,
    width: u32,
    height: u32,
    tiles: Vec<RawTile>,
    kinds: BTreeMap<Point, TileKind>,
    spawn_tiles: Vec<Point>,
    parcels: Vec<SimParcel>,
    seats: Vec<Seat>,
    actions: Vec<mpsc::Receiver<ActionCommand>>,
    rng: StdRng,
    next_parcel: u64,
    scores: watch::Sender<Vec<u64>>,
}

impl GameSim {
    /// Build the simulated world from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SimWorld`] for an empty or ragged grid or
    /// an unknown tile digit.
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        let height = u32::try_from(config.rows.len()).map_err(|_overflow| EngineError::SimWorld {
            reason: String::from("grid too tall"),
        })?;
        let first = config.rows.first().ok_or_else(|| EngineError::SimWorld {
            reason: String::from("grid has no rows"),
        })?;
        let width = u32::try_from(first.len()).map_err(|_overflow| EngineError::SimWorld {
            reason: String::from("grid too wide"),
        })?;
        if width == 0 {
            return Err(EngineError::SimWorld {
                reason: String::from("grid rows are empty"),
            });
        }

        let mut tiles = Vec::new();
        let mut kinds = BTreeMap::new();
        let mut spawn_tiles = Vec::new();
        for (y, row) in config.rows.iter().enumerate() {
            if row.len() != first.len() {
                return Err(EngineError::SimWorld {
                    reason: format!("row {y} has length {}, expected {}", row.len(), first.len()),
                });
            }
            let y = u32::try_from(y).map_err(|_overflow| EngineError::SimWorld {
                reason: String::from("grid too tall"),
            })?;
            for (x, digit) in row.bytes().enumerate() {
                let x = u32::try_from(x).map_err(|_overflow| EngineError::SimWorld {
                    reason: String::from("grid too wide"),
                })?;
                let code = digit.wrapping_sub(b'0');
                let kind = TileKind::from_code(code).map_err(|e| EngineError::SimWorld {
                    reason: format!("tile ({x}, {y}): {e}"),
                })?;
                tiles.push(RawTile { x, y, code });
                kinds.insert(Point::new(x, y), kind);
                if kind == TileKind::Spawn {
                    spawn_tiles.push(Point::new(x, y));
                }
            }
        }

        let seed = config.seed;
        Ok(Self {
            config,
            width,
            height,
            tiles,
            kinds,
            spawn_tiles,
            parcels: Vec::new(),
            seats: Vec::new(),
            actions: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            next_parcel: 0,
            scores: watch::Sender::new(Vec::new()),
        })
    }

    /// First `count` traversable tiles, for default seat placement.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SimWorld`] when the grid has fewer
    /// traversable tiles than seats.
    pub fn suggest_starts(&self, count: usize) -> Result<Vec<Point>, EngineError> {
        let starts: Vec<Point> = self
            .kinds
            .iter()
            .filter(|(_, kind)| kind.is_traversable())
            .map(|(point, _)| *point)
            .take(count)
            .collect();
        if starts.len() < count {
            return Err(EngineError::SimWorld {
                reason: format!("world has fewer than {count} traversable tiles"),
            });
        }
        Ok(starts)
    }

    /// Connect one worker as a seat.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SimWorld`] when the start tile is not
    /// traversable, is taken, or a third seat is added.
    pub fn add_seat(
        &mut self,
        id: AgentId,
        name: &str,
        start: Point,
        events: mpsc::UnboundedSender<SensorEvent>,
        actions: mpsc::Receiver<ActionCommand>,
    ) -> Result<(), EngineError> {
        if self.seats.len() >= 2 {
            return Err(EngineError::SimWorld {
                reason: String::from("at most two seats are supported"),
            });
        }
        if !self.kinds.get(&start).copied().is_some_and(TileKind::is_traversable) {
            return Err(EngineError::SimWorld {
                reason: format!("start tile ({}, {}) is not traversable", start.x, start.y),
            });
        }
        if self.seats.iter().any(|s| s.position == start) {
            return Err(EngineError::SimWorld {
                reason: format!("start tile ({}, {}) is taken", start.x, start.y),
            });
        }

        self.seats.push(Seat {
            id,
            name: name.to_owned(),
            position: start,
            score: 0,
            carrying: Vec::new(),
            events,
        });
        self.actions.push(actions);
        self.publish_scores();
        Ok(())
    }

    /// Subscribe to the per-seat score vector.
    pub fn score_watch(&self) -> watch::Receiver<Vec<u64>> {
        self.scores.subscribe()
    }

    /// Drive the simulation until shutdown or every seat disconnects.
    pub async fn run(mut self, shutdown: StopToken) {
        info!(world = self.config.name, seats = self.seats.len(), "sim starting");
        self.send_initial();

        let mut actions = std::mem::take(&mut self.actions);
        let Some(mut first_rx) = actions.pop() else {
            warn!("sim started without seats");
            return;
        };
        // With two seats the vector held [first, second]; the pop above
        // took the last, so swap them back into seat order.
        let mut second_rx = None;
        if let Some(other) = actions.pop() {
            second_rx = Some(first_rx);
            first_rx = other;
        }

        let mut sense = tokio::time::interval(std::time::Duration::from_millis(
            self.config.sense_interval_ms.max(1),
        ));
        sense.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut spawner = tokio::time::interval(std::time::Duration::from_millis(
            self.config.parcel_spawn_interval_ms.max(1),
        ));
        spawner.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = first_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(0, command);
                }
                command = recv_opt(&mut second_rx) => {
                    let Some(command) = command else { break };
                    self.handle_command(1, command);
                }
                _ = sense.tick() => {
                    if shutdown.is_stopped() {
                        break;
                    }
                    self.prune_expired();
                    self.broadcast_sensing();
                }
                _ = spawner.tick() => {
                    self.spawn_parcel();
                }
            }
        }
        info!("sim stopped");
    }

    // -------------------------------------------------------------------
    // Event emission
    // -------------------------------------------------------------------

    /// Connection handshake per seat: connect, config, map, self.
    fn send_initial(&self) {
        let decay = self
            .config
            .parcel_decay_seconds
            .map_or_else(|| String::from("infinite"), |s| format!("{s}s"));

        for seat in &self.seats {
            let _ = seat.events.send(SensorEvent::Connected);
            let _ = seat.events.send(SensorEvent::Config(RawGameConfig {
                parcel_decaying_interval: Some(decay.clone()),
                parcels_observation_distance: Some(self.config.observation_distance),
                parcel_reward_avg: Some(self.config.parcel_reward_avg),
                parcel_reward_variance: Some(self.config.parcel_reward_variance),
            }));
            let _ = seat.events.send(SensorEvent::Map {
                width: self.width,
                height: self.height,
                tiles: self.tiles.clone(),
            });
            let _ = seat.events.send(SensorEvent::You(YouUpdate {
                id: seat.id.clone(),
                x: seat.position.x,
                y: seat.position.y,
                score: seat.score,
            }));
        }
    }

    fn send_you(&self, index: usize) {
        if let Some(seat) = self.seats.get(index) {
            let _ = seat.events.send(SensorEvent::You(YouUpdate {
                id: seat.id.clone(),
                x: seat.position.x,
                y: seat.position.y,
                score: seat.score,
            }));
        }
    }

    /// Parcel and agent sensing sweeps for every seat, limited to the
    /// observation radius.
    fn broadcast_sensing(&self) {
        let radius = self.config.observation_distance;
        for (index, seat) in self.seats.iter().enumerate() {
            let parcels: Vec<ParcelSensed> = self
                .parcels
                .iter()
                .filter(|p| p.position.manhattan_distance(seat.position) <= radius)
                .map(|p| ParcelSensed {
                    id: p.id.clone(),
                    x: p.position.x,
                    y: p.position.y,
                    reward: self.current_reward(p),
                    carried_by: None,
                })
                .collect();
            let _ = seat.events.send(SensorEvent::Parcels(parcels));

            let agents: Vec<AgentSensed> = self
                .seats
                .iter()
                .enumerate()
                .filter(|(other, s)| {
                    *other != index && s.position.manhattan_distance(seat.position) <= radius
                })
                .map(|(_, s)| AgentSensed {
                    id: s.id.clone(),
                    x: s.position.x,
                    y: s.position.y,
                })
                .collect();
            let _ = seat.events.send(SensorEvent::Agents(agents));
        }
    }

    // -------------------------------------------------------------------
    // Action handling
    // -------------------------------------------------------------------

    fn handle_command(&mut self, index: usize, command: ActionCommand) {
        match command {
            ActionCommand::Move { direction, reply } => {
                let moved = self.try_move(index, direction);
                let _ = reply.send(moved);
                if moved.is_some() {
                    self.send_you(index);
                    self.broadcast_sensing();
                }
            }
            ActionCommand::Pickup { reply } => {
                let picked = self.do_pickup(index);
                let _ = reply.send(picked);
                if picked {
                    self.broadcast_sensing();
                }
            }
            ActionCommand::Putdown { reply } => {
                let dropped = self.do_putdown(index);
                let _ = reply.send(dropped);
                self.broadcast_sensing();
            }
            ActionCommand::Say {
                recipient,
                message,
                reply,
            } => {
                let delivered = self.route_say(index, &recipient, &message);
                let _ = reply.send(delivered);
            }
        }
    }

    fn try_move(&mut self, index: usize, direction: Direction) -> Option<Point> {
        let position = self.seats.get(index)?.position;
        let target = match direction {
            Direction::Up => {
                let y = position.y.checked_add(1)?;
                (y < self.height).then(|| Point::new(position.x, y))?
            }
            Direction::Down => Point::new(position.x, position.y.checked_sub(1)?),
            Direction::Left => Point::new(position.x.checked_sub(1)?, position.y),
            Direction::Right => {
                let x = position.x.checked_add(1)?;
                (x < self.width).then(|| Point::new(x, position.y))?
            }
        };

        if !self.kinds.get(&target).copied().is_some_and(TileKind::is_traversable) {
            return None;
        }
        if self
            .seats
            .iter()
            .enumerate()
            .any(|(other, s)| other != index && s.position == target)
        {
            return None;
        }

        self.seats.get_mut(index)?.position = target;
        debug!(seat = index, tile = %target, "seat moved");
        Some(target)
    }

    fn do_pickup(&mut self, index: usize) -> bool {
        let Some(position) = self.seats.get(index).map(|s| s.position) else {
            return false;
        };
        let (mine, rest): (Vec<SimParcel>, Vec<SimParcel>) = self
            .parcels
            .drain(..)
            .partition(|p| p.position == position);
        self.parcels = rest;

        let picked = !mine.is_empty();
        if let Some(seat) = self.seats.get_mut(index) {
            seat.carrying.extend(mine);
        }
        picked
    }

    fn do_putdown(&mut self, index: usize) -> bool {
        let Some(position) = self.seats.get(index).map(|s| s.position) else {
            return false;
        };
        let carried = self
            .seats
            .get_mut(index)
            .map(|s| std::mem::take(&mut s.carrying))
            .unwrap_or_default();
        if carried.is_empty() {
            return true;
        }

        if self.kinds.get(&position).copied() == Some(TileKind::Depot) {
            let gained: u64 = carried
                .iter()
                .map(|p| u64::try_from(self.current_reward(p).max(0)).unwrap_or(0))
                .sum();
            if let Some(seat) = self.seats.get_mut(index) {
                seat.score = seat.score.saturating_add(gained);
                info!(seat = seat.name, gained, score = seat.score, "parcels delivered");
            }
            self.publish_scores();
        } else {
            for mut parcel in carried {
                parcel.position = position;
                self.parcels.push(parcel);
            }
        }
        true
    }

    fn route_say(
        &self,
        index: usize,
        recipient: &AgentId,
        message: &relay_types::CompanionMessage,
    ) -> bool {
        let Some(sender) = self.seats.get(index) else {
            return false;
        };
        let Some(target) = self.seats.iter().find(|s| &s.id == recipient) else {
            debug!(%recipient, "say to unknown agent dropped");
            return false;
        };
        let Ok(payload) = serde_json::to_value(message) else {
            return false;
        };
        target
            .events
            .send(SensorEvent::Message {
                sender: sender.id.clone(),
                sender_name: sender.name.clone(),
                payload,
            })
            .is_ok()
    }

    // -------------------------------------------------------------------
    // World upkeep
    // -------------------------------------------------------------------

    /// The parcel's reward after decay.
    fn current_reward(&self, parcel: &SimParcel) -> i64 {
        let Some(decay) = self.config.parcel_decay_seconds else {
            return parcel.reward;
        };
        if decay == 0 {
            return parcel.reward;
        }
        let steps = i64::try_from(parcel.spawned.elapsed().as_secs() / decay).unwrap_or(i64::MAX);
        parcel.reward.saturating_sub(steps)
    }

    fn prune_expired(&mut self) {
        if self.config.parcel_decay_seconds.is_none() {
            return;
        }
        let rewards: Vec<i64> = self.parcels.iter().map(|p| self.current_reward(p)).collect();
        let mut kept = Vec::with_capacity(self.parcels.len());
        for (parcel, reward) in self.parcels.drain(..).zip(rewards) {
            if reward >= 0 {
                kept.push(parcel);
            }
        }
        self.parcels = kept;
    }

    fn spawn_parcel(&mut self) {
        if self.parcels.len() >= self.config.max_parcels {
            return;
        }
        let free: Vec<Point> = self
            .spawn_tiles
            .iter()
            .copied()
            .filter(|tile| !self.parcels.iter().any(|p| p.position == *tile))
            .collect();
        let Some(position) = free.choose(&mut self.rng).copied() else {
            return;
        };

        let variance = i64::from(self.config.parcel_reward_variance);
        let offset = if variance > 0 {
            self.rng.random_range(-variance..=variance)
        } else {
            0
        };
        let reward = i64::from(self.config.parcel_reward_avg)
            .saturating_add(offset)
            .max(1);

        let id = ParcelId::new(format!("p{}", self.next_parcel));
        self.next_parcel = self.next_parcel.saturating_add(1);
        debug!(%id, %position, reward, "parcel spawned");
        self.parcels.push(SimParcel {
            id,
            position,
            reward,
            spawned: Instant::now(),
        });
    }

    fn publish_scores(&self) {
        let scores: Vec<u64> = self.seats.iter().map(|s| s.score).collect();
        // send_replace stores the value even with no subscribers yet.
        let _ = self.scores.send_replace(scores);
    }
}

/// Receive from an optional second seat; absent seats never yield.
async fn recv_opt(rx: &mut Option<mpsc::Receiver<ActionCommand>>) -> Option<ActionCommand> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
