//! Reach a tile and put down everything carried.

use relay_types::{Point, Predicate};
use tracing::debug;

use crate::context::AgentContext;
use crate::error::{AgentError, PlanError};
use crate::intention::{Intention, StopToken};

/// The drop-off plan. Same shape as the pickup plan: an optional
/// routing sub-intention followed by the putdown RPC.
#[derive(Debug)]
pub struct GoDropOffPlan {
    stop: StopToken,
    sub_intentions: Vec<Intention>,
}

impl GoDropOffPlan {
    /// Create a plan instance under an intention's stop token.
    pub fn new(parent: &StopToken) -> Self {
        Self {
            stop: parent.child(),
            sub_intentions: Vec::new(),
        }
    }

    /// Walk to the target tile and issue the putdown RPC. On success the
    /// agent's carry count resets to zero. The depot hint is
    /// informational only.
    pub async fn execute(
        &mut self,
        destination: Point,
        depot_hint: Option<&str>,
        ctx: &AgentContext,
    ) -> Result<bool, PlanError> {
        if let Some(hint) = depot_hint {
            debug!(depot = hint, "drop-off targeting hinted depot");
        }

        self.stop.ensure_active()?;
        let position = ctx.agent.current_position(&self.stop).await?;
        if position != destination {
            self.reach(destination, ctx).await?;
        }

        self.stop.ensure_active()?;
        let dropped = ctx.client.emit_putdown().await?;
        if dropped {
            ctx.agent.drop_all_parcels().await;
            debug!(%destination, "carried parcels dropped");
        }
        Ok(dropped)
    }

    /// Raise and await a routing sub-intention.
    async fn reach(&mut self, destination: Point, ctx: &AgentContext) -> Result<(), PlanError> {
        self.sub_intentions.push(Intention::with_parent(
            Predicate::GoTo {
                x: destination.x,
                y: destination.y,
            },
            &self.stop,
        ));
        let Some(sub) = self.sub_intentions.last_mut() else {
            return Ok(());
        };
        match Box::pin(sub.achieve(ctx)).await {
            Ok(_) => Ok(()),
            Err(AgentError::Stopped) => Err(PlanError::Stopped),
            Err(error) => Err(PlanError::SubIntention(error.to_string())),
        }
    }
}
