//! The belief map: the agent's authoritative spatial model.
//!
//! [`GridMap`] stores the tiled world as a row-major array indexed
//! `y * width + x`, plus registries for depot and spawn tiles, the
//! currently believed parcels and adversary agents, and the known
//! positions of the cooperating pair.
//!
//! The map is a plain synchronous structure; the shared async handle
//! that serialises writers and snapshots readers lives one crate up.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_types::{
    AgentId, Parcel, ParcelId, Point, RawTile, Tile, TileKind, TrackedAgent,
};

use crate::error::WorldError;

/// Which seat of the deployment owns this map.
///
/// Walkability treats the *companion's* tile as blocked by default, so
/// the map needs to know which teammate-position field is the companion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapRole {
    /// Single-agent deployment; there is no companion.
    #[default]
    Solo,
    /// This map belongs to the leader; the follower is the companion.
    Leader,
    /// This map belongs to the follower; the leader is the companion.
    Follower,
}

/// The authoritative spatial model for one agent worker.
#[derive(Debug, Clone)]
pub struct GridMap {
    /// Map width in tiles.
    width: u32,
    /// Map height in tiles.
    height: u32,
    /// Row-major tile store, indexed `y * width + x`.
    tiles: Vec<Tile>,
    /// Every tile with kind [`TileKind::Depot`].
    depot_tiles: Vec<Point>,
    /// Every tile with kind [`TileKind::Spawn`].
    spawn_tiles: Vec<Point>,
    /// Believed parcels, keyed by id. Never contains carried or expired
    /// parcels.
    parcels: BTreeMap<ParcelId, Parcel>,
    /// Believed adversary agents, keyed by id. Never contains teammates.
    adversaries: BTreeMap<AgentId, TrackedAgent>,
    /// Last known leader position.
    leader_position: Option<Point>,
    /// Last known follower position.
    follower_position: Option<Point>,
    /// Which seat owns this map.
    role: MapRole,
}

impl GridMap {
    /// Build the map from the initial map broadcast.
    ///
    /// Tiles missing from the broadcast default to walls. Every spawn
    /// and depot tile is registered in the corresponding list.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownTileCode`] for an unrecognised type
    /// code and [`WorldError::OutOfBounds`] for a tile outside the
    /// announced dimensions. Both are fatal at initialisation.
    pub fn from_raw(width: u32, height: u32, raw: &[RawTile]) -> Result<Self, WorldError> {
        let cell_count = usize::try_from(u64::from(width).saturating_mul(u64::from(height)))
            .map_err(|_overflow| WorldError::IndexOverflow { x: width, y: height })?;

        let mut tiles = Vec::with_capacity(cell_count);
        for y in 0..height {
            for x in 0..width {
                tiles.push(Tile::new(x, y, TileKind::Wall));
            }
        }

        let mut map = Self {
            width,
            height,
            tiles,
            depot_tiles: Vec::new(),
            spawn_tiles: Vec::new(),
            parcels: BTreeMap::new(),
            adversaries: BTreeMap::new(),
            leader_position: None,
            follower_position: None,
            role: MapRole::Solo,
        };

        for cell in raw {
            let kind = TileKind::from_code(cell.code)?;
            map.update_tile(Tile::new(cell.x, cell.y, kind))?;
        }

        Ok(map)
    }

    /// Map width in tiles.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in tiles.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Set which seat owns this map.
    pub const fn set_role(&mut self, role: MapRole) {
        self.role = role;
    }

    // -------------------------------------------------------------------
    // Tile operations
    // -------------------------------------------------------------------

    /// Compute the row-major index for a coordinate, if in bounds.
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = u64::from(y)
            .checked_mul(u64::from(self.width))?
            .checked_add(u64::from(x))?;
        usize::try_from(index).ok()
    }

    /// The tile at a coordinate, if in bounds.
    pub fn tile_at(&self, point: Point) -> Option<Tile> {
        let index = self.index(point.x, point.y)?;
        self.tiles.get(index).copied()
    }

    /// Replace a tile by index, keeping the depot and spawn registries
    /// consistent with the new kind.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] when the tile lies outside
    /// the map.
    pub fn update_tile(&mut self, tile: Tile) -> Result<(), WorldError> {
        let index = self.index(tile.x, tile.y).ok_or(WorldError::OutOfBounds {
            x: tile.x,
            y: tile.y,
            width: self.width,
            height: self.height,
        })?;

        let point = tile.point();
        if let Some(slot) = self.tiles.get_mut(index) {
            *slot = tile;
        }

        self.depot_tiles.retain(|p| *p != point);
        self.spawn_tiles.retain(|p| *p != point);
        match tile.kind {
            TileKind::Depot => self.depot_tiles.push(point),
            TileKind::Spawn => self.spawn_tiles.push(point),
            TileKind::Wall | TileKind::Other => {}
        }

        Ok(())
    }

    /// Every depot tile on the map.
    pub fn depot_tiles(&self) -> &[Point] {
        &self.depot_tiles
    }

    /// Every spawn tile on the map.
    pub fn spawn_tiles(&self) -> &[Point] {
        &self.spawn_tiles
    }

    // -------------------------------------------------------------------
    // Parcel operations
    // -------------------------------------------------------------------

    /// Merge a sensing sweep into the believed parcels.
    ///
    /// First drops every believed parcel that has expired by `now`, then
    /// upserts the incoming parcels by id, keeping the newer timestamp.
    /// Carried and already-expired parcels are never inserted.
    pub fn update_parcels(
        &mut self,
        incoming: Vec<Parcel>,
        now: DateTime<Utc>,
        decay: Option<Duration>,
    ) {
        self.parcels.retain(|_, p| !p.is_expired(now, decay));

        for parcel in incoming {
            if parcel.carried_by.is_some() || parcel.is_expired(now, decay) {
                continue;
            }
            match self.parcels.entry(parcel.id.clone()) {
                Entry::Occupied(mut slot) => {
                    if slot.get().timestamp <= parcel.timestamp {
                        slot.insert(parcel);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(parcel);
                }
            }
        }
    }

    /// Remove a parcel that has been picked up.
    pub fn parcel_picked_up(&mut self, id: &ParcelId) {
        self.parcels.remove(id);
    }

    /// Iterate over the believed parcels.
    pub fn parcels(&self) -> impl Iterator<Item = &Parcel> {
        self.parcels.values()
    }

    /// Number of believed parcels.
    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    // -------------------------------------------------------------------
    // Agent tracking
    // -------------------------------------------------------------------

    /// Merge a sensing sweep into the believed adversaries, keeping the
    /// newer timestamp per id.
    pub fn update_adversaries(&mut self, sightings: Vec<TrackedAgent>) {
        for agent in sightings {
            match self.adversaries.entry(agent.id.clone()) {
                Entry::Occupied(mut slot) => {
                    if slot.get().timestamp <= agent.timestamp {
                        slot.insert(agent);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(agent);
                }
            }
        }
    }

    /// Iterate over the believed adversaries.
    pub fn adversaries(&self) -> impl Iterator<Item = &TrackedAgent> {
        self.adversaries.values()
    }

    /// Record the leader's position.
    pub const fn set_leader_position(&mut self, point: Point) {
        self.leader_position = Some(point);
    }

    /// Record the follower's position.
    pub const fn set_follower_position(&mut self, point: Point) {
        self.follower_position = Some(point);
    }

    /// Last known leader position.
    pub const fn leader_position(&self) -> Option<Point> {
        self.leader_position
    }

    /// Last known follower position.
    pub const fn follower_position(&self) -> Option<Point> {
        self.follower_position
    }

    /// The companion's last known position, relative to this map's seat.
    pub const fn companion_position(&self) -> Option<Point> {
        match self.role {
            MapRole::Solo => None,
            MapRole::Leader => self.follower_position,
            MapRole::Follower => self.leader_position,
        }
    }

    // -------------------------------------------------------------------
    // Walkability
    // -------------------------------------------------------------------

    /// Whether an adversary currently occupies the tile.
    pub fn is_occupied(&self, point: Point) -> bool {
        self.adversaries.values().any(|a| a.point() == point)
    }

    /// Whether an agent may step onto the tile under current perception.
    ///
    /// A tile is walkable when its kind is traversable, no adversary
    /// occupies it, and -- unless the caller opts in with `with_agents`
    /// -- it is not the companion's tile.
    pub fn is_walkable(&self, point: Point, with_agents: bool) -> bool {
        let Some(tile) = self.tile_at(point) else {
            return false;
        };
        if !tile.kind.is_traversable() || self.is_occupied(point) {
            return false;
        }
        with_agents || self.companion_position() != Some(point)
    }

    /// Snapshot of every currently walkable tile.
    pub fn walkable_tiles(&self, with_agents: bool) -> Vec<Tile> {
        self.tiles
            .iter()
            .filter(|t| self.is_walkable(t.point(), with_agents))
            .copied()
            .collect()
    }

    /// 4-connected neighbours of a tile inside the map bounds.
    ///
    /// When `walkable` is set, the result is intersected with the
    /// current walkable set (adversaries and the companion block).
    pub fn neighbor_tiles(&self, point: Point, walkable: bool) -> Vec<Tile> {
        let candidates = [
            point.x.checked_sub(1).map(|x| Point::new(x, point.y)),
            point.x.checked_add(1).map(|x| Point::new(x, point.y)),
            point.y.checked_sub(1).map(|y| Point::new(point.x, y)),
            point.y.checked_add(1).map(|y| Point::new(point.x, y)),
        ];

        candidates
            .into_iter()
            .flatten()
            .filter(|p| !walkable || self.is_walkable(*p, false))
            .filter_map(|p| self.tile_at(p))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    /// Build an all-plain map of the given dimensions.
    fn make_open_map(width: u32, height: u32) -> GridMap {
        let mut raw = Vec::new();
        for y in 0..height {
            for x in 0..width {
                raw.push(RawTile { x, y, code: 3 });
            }
        }
        GridMap::from_raw(width, height, &raw).unwrap()
    }

    fn make_parcel(id: &str, x: u32, y: u32, reward: i64, timestamp_ms: i64) -> Parcel {
        Parcel {
            id: ParcelId::new(id),
            x,
            y,
            reward,
            timestamp: Utc.timestamp_millis_opt(timestamp_ms).single().unwrap(),
            carried_by: None,
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn from_raw_registers_depots_and_spawns() {
        let raw = vec![
            RawTile { x: 0, y: 0, code: 1 },
            RawTile { x: 1, y: 0, code: 2 },
            RawTile { x: 0, y: 1, code: 0 },
            RawTile { x: 1, y: 1, code: 3 },
        ];
        let map = GridMap::from_raw(2, 2, &raw).unwrap();
        assert_eq!(map.spawn_tiles(), &[Point::new(0, 0)]);
        assert_eq!(map.depot_tiles(), &[Point::new(1, 0)]);
        assert_eq!(map.tile_at(Point::new(0, 1)).map(|t| t.kind), Some(TileKind::Wall));
    }

    #[test]
    fn from_raw_rejects_unknown_code() {
        let raw = vec![RawTile { x: 0, y: 0, code: 9 }];
        assert!(GridMap::from_raw(1, 1, &raw).is_err());
    }

    #[test]
    fn update_tile_rejects_out_of_bounds() {
        let mut map = make_open_map(3, 3);
        let result = map.update_tile(Tile::new(3, 0, TileKind::Other));
        assert!(matches!(result, Err(WorldError::OutOfBounds { .. })));
    }

    #[test]
    fn update_tile_keeps_registries_consistent() {
        let mut map = make_open_map(3, 3);
        map.update_tile(Tile::new(1, 1, TileKind::Depot)).unwrap();
        assert_eq!(map.depot_tiles(), &[Point::new(1, 1)]);

        // Re-typing the tile removes it from the depot registry.
        map.update_tile(Tile::new(1, 1, TileKind::Spawn)).unwrap();
        assert!(map.depot_tiles().is_empty());
        assert_eq!(map.spawn_tiles(), &[Point::new(1, 1)]);
    }

    #[test]
    fn expired_parcels_are_dropped() {
        let mut map = make_open_map(3, 3);
        let decay = Some(std::time::Duration::from_secs(1));

        map.update_parcels(vec![make_parcel("p1", 0, 0, 5, 0)], at(0), decay);
        assert_eq!(map.parcel_count(), 1);

        // reward 5, 6 decay steps elapsed: 5 - 6 < 0, expired.
        map.update_parcels(Vec::new(), at(6000), decay);
        assert_eq!(map.parcel_count(), 0);
    }

    #[test]
    fn parcel_upsert_keeps_newer_timestamp() {
        let mut map = make_open_map(3, 3);
        map.update_parcels(vec![make_parcel("p1", 0, 0, 5, 2000)], at(2000), None);
        // A stale sighting must not clobber the newer belief.
        map.update_parcels(vec![make_parcel("p1", 2, 2, 9, 1000)], at(2500), None);

        let parcel = map.parcels().next().unwrap();
        assert_eq!(parcel.point(), Point::new(0, 0));
        assert_eq!(parcel.reward, 5);
    }

    #[test]
    fn carried_parcels_never_enter_the_map() {
        let mut map = make_open_map(3, 3);
        let mut parcel = make_parcel("p1", 0, 0, 5, 0);
        parcel.carried_by = Some(AgentId::new("rival"));
        map.update_parcels(vec![parcel], at(0), None);
        assert_eq!(map.parcel_count(), 0);
    }

    #[test]
    fn parcel_picked_up_removes_by_id() {
        let mut map = make_open_map(3, 3);
        map.update_parcels(vec![make_parcel("p1", 0, 0, 5, 0)], at(0), None);
        map.parcel_picked_up(&ParcelId::new("p1"));
        assert_eq!(map.parcel_count(), 0);
    }

    #[test]
    fn adversary_upsert_keeps_newer_timestamp() {
        let mut map = make_open_map(3, 3);
        let fresh = TrackedAgent {
            id: AgentId::new("rival"),
            x: 1,
            y: 1,
            timestamp: at(2000),
        };
        let stale = TrackedAgent {
            id: AgentId::new("rival"),
            x: 2,
            y: 2,
            timestamp: at(1000),
        };
        map.update_adversaries(vec![fresh]);
        map.update_adversaries(vec![stale]);

        let tracked = map.adversaries().next().unwrap();
        assert_eq!(tracked.point(), Point::new(1, 1));
    }

    #[test]
    fn adversaries_block_walkability() {
        let mut map = make_open_map(3, 3);
        map.update_adversaries(vec![TrackedAgent {
            id: AgentId::new("rival"),
            x: 1,
            y: 1,
            timestamp: at(0),
        }]);
        assert!(!map.is_walkable(Point::new(1, 1), false));
        assert!(!map.is_walkable(Point::new(1, 1), true));
        assert!(map.is_walkable(Point::new(0, 0), false));
    }

    #[test]
    fn companion_blocks_unless_opted_in() {
        let mut map = make_open_map(3, 3);
        map.set_role(MapRole::Leader);
        map.set_follower_position(Point::new(2, 2));

        assert!(!map.is_walkable(Point::new(2, 2), false));
        // Opting in to with_agents makes the companion's tile walkable.
        assert!(map.is_walkable(Point::new(2, 2), true));
    }

    #[test]
    fn neighbor_tiles_respect_bounds_and_walkability() {
        let mut map = make_open_map(3, 3);
        map.update_tile(Tile::new(1, 0, TileKind::Wall)).unwrap();

        // Corner tile has two in-bounds neighbours; one is a wall.
        let neighbors = map.neighbor_tiles(Point::new(0, 0), true);
        let points: Vec<Point> = neighbors.iter().map(Tile::point).collect();
        assert_eq!(points, vec![Point::new(0, 1)]);

        // Without the walkable filter the wall is included.
        let all = map.neighbor_tiles(Point::new(0, 0), false);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn walkable_snapshot_counts() {
        let mut map = make_open_map(3, 3);
        map.update_tile(Tile::new(1, 1, TileKind::Wall)).unwrap();
        assert_eq!(map.walkable_tiles(false).len(), 8);
    }
}
