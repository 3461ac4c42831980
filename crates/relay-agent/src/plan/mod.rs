//! The plan library.
//!
//! A plan is the capability to realise intentions of one action tag:
//! an applicability test over the predicate plus an async executor. The
//! library is an ordered list of [`PlanKind`] tags; an intention walks
//! it and runs the first applicable plan. Plan instances hold a child
//! [`StopToken`] and their sub-intentions, so cancellation cascades
//! depth-first.
//!
//! [`StopToken`]: crate::intention::StopToken

pub mod go_drop_off;
pub mod go_pick_up;
pub mod go_to;
pub mod pddl;

use relay_types::{Point, Predicate};

pub use go_drop_off::GoDropOffPlan;
pub use go_pick_up::GoPickUpPlan;
pub use go_to::GoToPlan;
pub use pddl::GoToPddlPlan;

use crate::context::AgentContext;
use crate::error::PlanError;
use crate::intention::StopToken;

/// Tag of one plan class in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Route with A* and follow the path.
    GoTo,
    /// Route with the external PDDL solver (drop-in for [`PlanKind::GoTo`]).
    GoToPddl,
    /// Reach a parcel and pick it up.
    GoPickUp,
    /// Reach a tile and put everything down.
    GoDropOff,
}

/// The plan library in resolution order.
///
/// The symbolic variant replaces the A* router when `pddl_goto` is
/// configured; everything else is unchanged.
pub const fn library(pddl_goto: bool) -> [PlanKind; 3] {
    if pddl_goto {
        [PlanKind::GoToPddl, PlanKind::GoPickUp, PlanKind::GoDropOff]
    } else {
        [PlanKind::GoTo, PlanKind::GoPickUp, PlanKind::GoDropOff]
    }
}

impl PlanKind {
    /// Whether this plan class can realise the predicate.
    pub const fn is_applicable_to(self, predicate: &Predicate) -> bool {
        match self {
            Self::GoTo | Self::GoToPddl => predicate.is_go_to(),
            Self::GoPickUp => predicate.is_pick_up(),
            Self::GoDropOff => predicate.is_drop_off(),
        }
    }

    /// Instantiate the plan and run it against the predicate.
    ///
    /// # Errors
    ///
    /// Returns the plan's own failure, or [`PlanError::NotApplicable`]
    /// when the predicate does not match this plan class.
    pub async fn execute(
        self,
        predicate: &Predicate,
        parent: &StopToken,
        ctx: &AgentContext,
    ) -> Result<bool, PlanError> {
        match (self, predicate) {
            (Self::GoTo, Predicate::GoTo { x, y }) => {
                GoToPlan::new(parent).execute(Point::new(*x, *y), ctx).await
            }
            (Self::GoToPddl, Predicate::GoTo { x, y }) => {
                GoToPddlPlan::new(parent)
                    .execute(Point::new(*x, *y), ctx)
                    .await
            }
            (Self::GoPickUp, Predicate::GoPickUp { x, y, parcel }) => {
                let mut plan = GoPickUpPlan::new(parent);
                plan.execute(Point::new(*x, *y), parcel, ctx).await
            }
            (Self::GoDropOff, Predicate::GoDropOff { x, y, depot }) => {
                let mut plan = GoDropOffPlan::new(parent);
                plan.execute(Point::new(*x, *y), depot.as_deref(), ctx).await
            }
            _ => Err(PlanError::NotApplicable),
        }
    }
}

#[cfg(test)]
mod tests {
    use relay_types::ParcelId;

    use super::*;

    #[test]
    fn library_order_is_goto_pickup_dropoff() {
        assert_eq!(
            library(false),
            [PlanKind::GoTo, PlanKind::GoPickUp, PlanKind::GoDropOff]
        );
    }

    #[test]
    fn pddl_variant_replaces_the_router() {
        assert_eq!(
            library(true),
            [PlanKind::GoToPddl, PlanKind::GoPickUp, PlanKind::GoDropOff]
        );
    }

    #[test]
    fn applicability_follows_the_action_tag() {
        let go_to = Predicate::GoTo { x: 0, y: 0 };
        let pick = Predicate::GoPickUp {
            x: 0,
            y: 0,
            parcel: ParcelId::new("p1"),
        };
        let drop = Predicate::GoDropOff { x: 0, y: 0, depot: None };

        assert!(PlanKind::GoTo.is_applicable_to(&go_to));
        assert!(PlanKind::GoToPddl.is_applicable_to(&go_to));
        assert!(!PlanKind::GoTo.is_applicable_to(&pick));
        assert!(PlanKind::GoPickUp.is_applicable_to(&pick));
        assert!(PlanKind::GoDropOff.is_applicable_to(&drop));
        assert!(!PlanKind::GoDropOff.is_applicable_to(&go_to));
    }
}
