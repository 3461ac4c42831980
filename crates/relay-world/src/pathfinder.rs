//! A* pathfinding over a belief-map snapshot.
//!
//! The search is purely synchronous: it runs against whatever map
//! snapshot the caller holds, and the returned path belongs to the
//! caller. Later sensor updates may invalidate it; the execution layer
//! compensates by replanning on repeated move failures.
//!
//! Classical A* with Manhattan heuristic and unit edge cost. The open
//! set is a [`BinaryHeap`] min-heap keyed on `f`; instead of an explicit
//! closed set, a node is re-expanded only when the tentative cost
//! improves on its best known `g`. Neighbour expansion goes through the
//! walkable variant of the map's neighbour query, so tiles occupied by
//! adversaries (or the companion) are obstacles.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use relay_types::Point;

use crate::grid::GridMap;

/// Find a path from `start` to `goal` on the current map snapshot.
///
/// Returns `None` when the goal is unwalkable or unreachable. Returns an
/// **empty** path (immediate success) when the agent already stands on
/// the goal. Otherwise the path excludes `start`, ends at `goal`, and
/// every step is 4-adjacent and walkable at query time.
///
/// Ties between equal `f` scores break in heap insertion order; paths
/// need not be unique.
pub fn find_path(map: &GridMap, start: Point, goal: Point) -> Option<Vec<Point>> {
    if start == goal {
        return Some(Vec::new());
    }
    if !map.is_walkable(goal, false) {
        return None;
    }

    let heuristic = |p: Point| p.manhattan_distance(goal);

    // g-scores default to infinity for every node not yet reached.
    let mut g_score: BTreeMap<Point, u32> = BTreeMap::new();
    let mut came_from: BTreeMap<Point, Point> = BTreeMap::new();
    // Entries are (f, insertion sequence, point); Reverse turns the
    // max-heap into a min-heap and the sequence keeps ties first-in.
    let mut open: BinaryHeap<Reverse<(u32, u64, Point)>> = BinaryHeap::new();
    let mut sequence: u64 = 0;

    g_score.insert(start, 0);
    open.push(Reverse((heuristic(start), sequence, start)));

    while let Some(Reverse((f, _, current))) = open.pop() {
        if current == goal {
            return Some(reconstruct(&came_from, start, goal));
        }

        let best_g = g_score.get(&current).copied().unwrap_or(u32::MAX);
        // Stale heap entry: the node was re-queued with a better score.
        if f > best_g.saturating_add(heuristic(current)) {
            continue;
        }

        for neighbor in map.neighbor_tiles(current, true) {
            let next = neighbor.point();
            let tentative = best_g.saturating_add(1);
            let known = g_score.get(&next).copied().unwrap_or(u32::MAX);
            if tentative < known {
                g_score.insert(next, tentative);
                came_from.insert(next, current);
                sequence = sequence.saturating_add(1);
                open.push(Reverse((
                    tentative.saturating_add(heuristic(next)),
                    sequence,
                    next,
                )));
            }
        }
    }

    None
}

/// Walk the predecessor map back from the goal and reverse into a
/// forward path. The start tile itself is not part of the path.
fn reconstruct(came_from: &BTreeMap<Point, Point>, start: Point, goal: Point) -> Vec<Point> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&predecessor) = came_from.get(&current) {
        if predecessor == start {
            break;
        }
        path.push(predecessor);
        current = predecessor;
    }
    path.reverse();
    path
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use relay_types::{AgentId, RawTile, Tile, TileKind, TrackedAgent};

    use super::*;

    fn make_open_map(width: u32, height: u32) -> GridMap {
        let mut raw = Vec::new();
        for y in 0..height {
            for x in 0..width {
                raw.push(RawTile { x, y, code: 3 });
            }
        }
        GridMap::from_raw(width, height, &raw).unwrap()
    }

    #[test]
    fn straight_shot_across_open_map() {
        let map = make_open_map(5, 5);
        let path = find_path(&map, Point::new(0, 0), Point::new(2, 3)).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.last().copied(), Some(Point::new(2, 3)));
    }

    #[test]
    fn wall_column_makes_goal_unreachable() {
        let mut map = make_open_map(5, 5);
        for y in 0..5 {
            map.update_tile(Tile::new(1, y, TileKind::Wall)).unwrap();
        }
        assert!(find_path(&map, Point::new(0, 0), Point::new(2, 0)).is_none());
    }

    #[test]
    fn same_tile_yields_empty_path() {
        let map = make_open_map(5, 5);
        let path = find_path(&map, Point::new(3, 3), Point::new(3, 3));
        assert_eq!(path, Some(Vec::new()));
    }

    #[test]
    fn unwalkable_goal_yields_none() {
        let mut map = make_open_map(5, 5);
        map.update_tile(Tile::new(4, 4, TileKind::Wall)).unwrap();
        assert!(find_path(&map, Point::new(0, 0), Point::new(4, 4)).is_none());
    }

    #[test]
    fn adversaries_are_obstacles() {
        // 3x1 corridor with an adversary in the middle.
        let mut map = make_open_map(3, 1);
        map.update_adversaries(vec![TrackedAgent {
            id: AgentId::new("rival"),
            x: 1,
            y: 0,
            timestamp: Utc.timestamp_millis_opt(0).single().unwrap(),
        }]);
        assert!(find_path(&map, Point::new(0, 0), Point::new(2, 0)).is_none());
    }

    #[test]
    fn path_steps_are_adjacent_and_walkable() {
        let mut map = make_open_map(6, 6);
        // A partial wall forcing a detour.
        for y in 0..5 {
            map.update_tile(Tile::new(3, y, TileKind::Wall)).unwrap();
        }
        let start = Point::new(0, 0);
        let goal = Point::new(5, 0);
        let path = find_path(&map, start, goal).unwrap();

        assert_eq!(path.first().map(|p| p.is_adjacent(start)), Some(true));
        assert_eq!(path.last().copied(), Some(goal));
        for pair in path.windows(2) {
            if let [a, b] = pair {
                assert!(a.is_adjacent(*b));
            }
        }
        for step in &path {
            assert!(map.is_walkable(*step, false));
        }
    }

    #[test]
    fn detour_path_has_optimal_length() {
        // 5x5, wall column at x=2 except the top row: the path must go
        // up and over.
        let mut map = make_open_map(5, 5);
        for y in 0..4 {
            map.update_tile(Tile::new(2, y, TileKind::Wall)).unwrap();
        }
        let path = find_path(&map, Point::new(0, 0), Point::new(4, 0)).unwrap();
        // Right 4, up 4, down 4 in some order: 12 steps.
        assert_eq!(path.len(), 12);
    }
}
