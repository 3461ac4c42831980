//! Symbolic belief-set emission for the PDDL planning variant.
//!
//! Translates the map's current walkable topology into a flat list of
//! directional adjacency facts ready for a PDDL problem's `:init`
//! section. Tiles are named `tile<x>_<y>`; for an ordered pair of
//! adjacent walkable tiles `(a, b)`:
//!
//! - `(right a b)` -- `b` is immediately right of `a` (`b.x = a.x + 1`)
//! - `(left a b)`  -- `b` is immediately left of `a`
//! - `(above a b)` -- `b` is immediately above `a` (`b.y = a.y + 1`)
//! - `(below a b)` -- `b` is immediately below `a`

use relay_types::Point;

use crate::grid::GridMap;

/// The PDDL object name of a tile.
pub fn tile_name(point: Point) -> String {
    format!("tile{}_{}", point.x, point.y)
}

/// Emit directional adjacency facts for every walkable, non-occupied
/// tile pair on the map.
pub fn belief_set(map: &GridMap) -> Vec<String> {
    let mut facts = Vec::new();

    for tile in map.walkable_tiles(false) {
        let here = tile.point();
        for neighbor in map.neighbor_tiles(here, true) {
            let there = neighbor.point();
            let relation = if there.x > here.x {
                "right"
            } else if there.x < here.x {
                "left"
            } else if there.y > here.y {
                "above"
            } else {
                "below"
            };
            facts.push(format!(
                "({relation} {} {})",
                tile_name(here),
                tile_name(there)
            ));
        }
    }

    facts
}
