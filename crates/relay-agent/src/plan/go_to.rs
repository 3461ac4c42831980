//! Route with A* and follow the path step by step.

use std::time::Duration;

use relay_types::{Direction, Point};
use relay_world::find_path;
use tracing::debug;

use crate::context::AgentContext;
use crate::error::PlanError;
use crate::intention::StopToken;

/// Refused moves are retried this many times before replanning.
const MOVE_RETRIES: u32 = 2;

/// Gap between move retries.
const RETRY_GAP: Duration = Duration::from_millis(10);

/// The A* routing plan.
#[derive(Debug)]
pub struct GoToPlan {
    stop: StopToken,
}

impl GoToPlan {
    /// Create a plan instance under an intention's stop token.
    pub fn new(parent: &StopToken) -> Self {
        Self {
            stop: parent.child(),
        }
    }

    /// Walk to the destination.
    ///
    /// Succeeds immediately when already there. A missing route fails
    /// with [`PlanError::NoPathFound`]. A step that stays refused after
    /// its retries triggers a replan against the fresh map snapshot.
    pub async fn execute(&self, destination: Point, ctx: &AgentContext) -> Result<bool, PlanError> {
        loop {
            self.stop.ensure_active()?;
            let from = ctx.agent.current_position(&self.stop).await?;
            if from == destination {
                return Ok(true);
            }

            let path = ctx
                .world
                .with_map_wait(|m| find_path(m, from, destination))
                .await;
            let Some(path) = path else {
                return Err(PlanError::NoPathFound {
                    x: destination.x,
                    y: destination.y,
                });
            };
            if path.is_empty() {
                return Ok(true);
            }

            if self.follow(&path, ctx).await? {
                let position = ctx.agent.current_position(&self.stop).await?;
                if position == destination {
                    return Ok(true);
                }
            }
            debug!(%destination, "route interrupted, replanning");
        }
    }

    /// Follow a path one tile at a time. Returns `false` when a step
    /// stayed refused and the caller should replan.
    async fn follow(&self, path: &[Point], ctx: &AgentContext) -> Result<bool, PlanError> {
        for next in path {
            self.stop.ensure_active()?;
            let position = ctx.agent.current_position(&self.stop).await?;
            if position == *next {
                continue;
            }
            let Some(direction) = Direction::toward(position, *next) else {
                continue;
            };
            match self.step(direction, ctx).await? {
                Some(reached) => ctx.agent.set_position(reached).await,
                None => return Ok(false),
            }
        }
        Ok(true)
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
