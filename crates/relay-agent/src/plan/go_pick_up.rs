//! Reach a parcel's tile and pick it up.

use relay_types::{ParcelId, Point, Predicate};
use tracing::debug;

use crate::context::AgentContext;
use crate::error::{AgentError, PlanError};
use crate::intention::{Intention, StopToken};

/// The pickup plan. Raises a `go_to` sub-intention when the agent is
/// not yet on the parcel's tile.
#[derive(Debug)]
pub struct GoPickUpPlan {
    stop: StopToken,
    sub_intentions: Vec<Intention>,
}

impl GoPickUpPlan {
    /// Create a plan instance under an intention's stop token.
    pub fn new(parent: &StopToken) -> Self {
        Self {
            stop: parent.child(),
            sub_intentions: Vec::new(),
        }
    }

    /// Walk to the parcel and issue the pickup RPC. On success the
    /// agent's carry count goes up and the parcel leaves the belief map.
    pub async fn execute(
        &mut self,
        destination: Point,
        parcel: &ParcelId,
        ctx: &AgentContext,
    ) -> Result<bool, PlanError> {
        self.stop.ensure_active()?;
        let position = ctx.agent.current_position(&self.stop).await?;
        if position != destination {
            self.reach(destination, ctx).await?;
        }

        self.stop.ensure_active()?;
        let picked = ctx.client.emit_pickup().await?;
        if picked {
            ctx.agent.picked_up_parcel(parcel, &ctx.world).await;
            debug!(%parcel, "parcel picked up");
        }
        Ok(picked)
    }

    /// Raise and await a routing sub-intention. The sub-intention stays
    /// on the plan instance so cancellation reaches it while running.
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
