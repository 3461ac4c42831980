//! Symbolic routing: the PDDL drop-in replacement for the A* router.
//!
//! Instead of searching the grid directly, this plan renders the map's
//! belief set into a STRIPS problem, hands it to an external solver
//! through the [`PddlSolver`] trait, parses the returned step arguments
//! (`TILEX_Y`) back into a tile path, and follows it. Move failures are
//! fail-soft: the plan returns `Ok(false)` so the option generator
//! re-proposes, rather than replanning through the solver again.

use std::time::Duration;

use relay_types::{Direction, Point};
use relay_world::{GridMap, belief_set, tile_name};
use tracing::{debug, warn};

use crate::context::AgentContext;
use crate::error::PlanError;
use crate::intention::StopToken;

/// The movement domain handed to the solver alongside each problem.
pub const DOMAIN: &str = "\
(define (domain deliveroo)
  (:requirements :strips)
  (:predicates
    (on_tile ?t)
    (right ?a ?b)
    (left ?a ?b)
    (above ?a ?b)
    (below ?a ?b))
  (:action move_right
    :parameters (?from ?to)
    :precondition (and (on_tile ?from) (right ?from ?to))
    :effect (and (on_tile ?to) (not (on_tile ?from))))
  (:action move_left
    :parameters (?from ?to)
    :precondition (and (on_tile ?from) (left ?from ?to))
    :effect (and (on_tile ?to) (not (on_tile ?from))))
  (:action move_up
    :parameters (?from ?to)
    :precondition (and (on_tile ?from) (above ?from ?to))
    :effect (and (on_tile ?to) (not (on_tile ?from))))
  (:action move_down
    :parameters (?from ?to)
    :precondition (and (on_tile ?from) (below ?from ?to))
    :effect (and (on_tile ?to) (not (on_tile ?from)))))
";

/// An external solver failed or produced an unusable plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pddl solver error: {0}")]
pub struct SolverError(pub String);

/// An external PDDL planner.
///
/// The call is synchronous from the plan's point of view; an
/// implementation that shells out to a planner binary should do the
/// blocking work on a dedicated thread.
pub trait PddlSolver: Send + Sync {
    /// Solve a problem against the movement domain and return the plan
    /// steps in order, one string per step.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError`] when no plan exists or the solver failed.
    fn solve(&self, domain: &str, problem: &str) -> Result<Vec<String>, SolverError>;
}

/// Render the routing problem for the current map snapshot.
pub fn build_problem(map: &GridMap, start: Point, goal: Point) -> String {
    let objects = map
        .walkable_tiles(false)
        .iter()
        .map(|t| tile_name(t.point()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut init = belief_set(map);
    init.push(format!("(on_tile {})", tile_name(start)));

    format!(
        "(define (problem relay-route)\n  (:domain deliveroo)\n  (:objects {objects})\n  (:init {})\n  (:goal (on_tile {})))\n",
        init.join(" "),
        tile_name(goal),
    )
}

/// Parse the destination tile out of one plan step.
///
/// Steps look like `(MOVE_RIGHT TILE0_0 TILE1_0)`; the last `TILEX_Y`
/// token is the tile the step lands on.
pub fn parse_step_tile(step: &str) -> Option<Point> {
    let mut landed = None;
    for token in step.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        let lower = token.to_ascii_lowercase();
        let Some(coordinates) = lower.strip_prefix("tile") else {
            continue;
        };
        let Some((x, y)) = coordinates.split_once('_') else {
            continue;
        };
        if let (Ok(x), Ok(y)) = (x.parse::<u32>(), y.parse::<u32>()) {
            landed = Some(Point::new(x, y));
        }
    }
    landed
}

/// Parse a full solver plan into the tile path it visits.
///
/// # Errors
///
/// Returns [`SolverError`] when a step carries no destination tile.
pub fn parse_plan(steps: &[String]) -> Result<Vec<Point>, SolverError> {
    steps
        .iter()
        .map(|step| {
            parse_step_tile(step)
                .ok_or_else(|| SolverError(format!("step has no destination tile: {step}")))
        })
        .collect()
}

/// Refused moves are retried this many times before failing soft.
const MOVE_RETRIES: u32 = 2;

/// Gap between move retries.
const RETRY_GAP: Duration = Duration::from_millis(10);

/// The symbolic routing plan.
#[derive(Debug)]
pub struct GoToPddlPlan {
    stop: StopToken,
}

impl GoToPddlPlan {
    /// Create a plan instance under an intention's stop token.
    pub fn new(parent: &StopToken) -> Self {
        Self {
            stop: parent.child(),
        }
    }

    /// Solve and follow a route to the destination.
    ///
    /// Fail-soft on movement: a step that stays refused returns
    /// `Ok(false)` instead of replanning.
    pub async fn execute(&self, destination: Point, ctx: &AgentContext) -> Result<bool, PlanError> {
        let Some(solver) = ctx.solver.clone() else {
            return Err(PlanError::Solver(String::from("no solver configured")));
        };

        self.stop.ensure_active()?;
        let start = ctx.agent.current_position(&self.stop).await?;
        if start == destination {
            return Ok(true);
        }

        let problem = ctx
            .world
            .with_map_wait(|m| build_problem(m, start, destination))
            .await;

        if let Some(dump) = &ctx.config.pddl_problem_dump {
            if let Err(error) = std::fs::write(dump, &problem) {
                warn!(path = %dump.display(), error = %error, "problem dump failed");
            }
        }

        let steps = solver
            .solve(DOMAIN, &problem)
            .map_err(|e| PlanError::Solver(e.to_string()))?;
        let route = parse_plan(&steps).map_err(|e| PlanError::Solver(e.to_string()))?;
        debug!(steps = route.len(), %destination, "solver plan parsed");

        for next in route {
            self.stop.ensure_active()?;
            let position = ctx.agent.current_position(&self.stop).await?;
            if position == next {
                continue;
            }
            let Some(direction) = Direction::toward(position, next) else {
                continue;
            };
            match self.step(direction, ctx).await? {
                Some(reached) => ctx.agent.set_position(reached).await,
                None => return Ok(false),
            }
        }

        Ok(ctx.agent.current_position(&self.stop).await? == destination)
    }

    /// Issue one move RPC, retrying a refusal with a short gap.
    async fn step(
        &self,
        direction: Direction,
        ctx: &AgentContext,
    ) -> Result<Option<Point>, PlanError> {
        let mut attempts: u32 = 0;
        loop {
            self.stop.ensure_active()?;
            if let Some(position) = ctx.client.emit_move(direction).await? {
                return Ok(Some(position));
            }
            if attempts >= MOVE_RETRIES {
                return Ok(None);
            }
            attempts = attempts.saturating_add(1);
            tokio::time::sleep(RETRY_GAP).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relay_types::RawTile;

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
    fn problem_carries_start_and_goal() {
        let map = make_open_map(2, 2);
        let problem = build_problem(&map, Point::new(0, 0), Point::new(1, 1));
        assert!(problem.contains("(on_tile tile0_0)"));
        assert!(problem.contains("(:goal (on_tile tile1_1))"));
        assert!(problem.contains("tile0_1"));
    }

    #[test]
    fn step_parsing_takes_the_landing_tile() {
        assert_eq!(
            parse_step_tile("(MOVE_RIGHT TILE0_0 TILE1_0)"),
            Some(Point::new(1, 0))
        );
        assert_eq!(
            parse_step_tile("move_up tile2_3 tile2_4"),
            Some(Point::new(2, 4))
        );
        assert_eq!(parse_step_tile("(NOOP)"), None);
    }

    #[test]
    fn plan_parsing_rejects_tileless_steps() {
        let steps = vec![String::from("(MOVE_RIGHT TILE0_0 TILE1_0)"), String::from("(NOOP)")];
        assert!(parse_plan(&steps).is_err());

        let good = vec![
            String::from("(MOVE_RIGHT TILE0_0 TILE1_0)"),
            String::from("(MOVE_UP TILE1_0 TILE1_1)"),
        ];
        assert_eq!(
            parse_plan(&good).unwrap(),
            vec![Point::new(1, 0), Point::new(1, 1)]
        );
    }
}
