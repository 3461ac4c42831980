//! Intentions: options the agent has committed to pursue.
//!
//! An [`Intention`] wraps a [`Predicate`] and resolves it by trying the
//! plans in the library in order. Cancellation flows through a linked
//! [`StopToken`] chain: stopping an intention stops the plan it is
//! executing, which stops that plan's sub-intentions, depth-first --
//! every descendant token sees the ancestor's flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relay_types::Predicate;
use tracing::{debug, warn};

use crate::context::AgentContext;
use crate::error::{AgentError, PlanError};
use crate::plan;

// ---------------------------------------------------------------------------
// StopToken
// ---------------------------------------------------------------------------

/// A cooperative cancellation flag with parent linkage.
///
/// A child token reports stopped when its own flag or any ancestor's
/// flag is set, so cancellation cascades through intention -> plan ->
/// sub-intention chains without bookkeeping at each level.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    parent: Option<StopToken>,
}

impl StopToken {
    /// Create a root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child token linked to this one.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Set the flag. Descendant tokens observe it immediately.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether this token or any ancestor has been stopped.
    pub fn is_stopped(&self) -> bool {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .parent
            .as_ref()
            .is_some_and(Self::is_stopped)
    }

    /// Guard for plan execution: error out before an externally visible
    /// action when stopped.
    pub fn ensure_active(&self) -> Result<(), PlanError> {
        if self.is_stopped() {
            Err(PlanError::Stopped)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Intention
// ---------------------------------------------------------------------------

/// Lifecycle state of an intention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentionState {
    /// Created, not yet achieved.
    Fresh,
    /// `achieve` is in flight.
    Running,
    /// Cancelled; terminal.
    Stopped,
    /// Achieved (successfully or not); terminal.
    Completed,
}

/// A committed option in the agent's queue.
#[derive(Debug)]
pub struct Intention {
    predicate: Predicate,
    state: IntentionState,
    stop: StopToken,
    outcome: Option<bool>,
}

impl Intention {
    /// Create a root intention.
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            state: IntentionState::Fresh,
            stop: StopToken::new(),
            outcome: None,
        }
    }

    /// Create a sub-intention whose stop token is linked to a plan's.
    pub fn with_parent(predicate: Predicate, parent: &StopToken) -> Self {
        Self {
            predicate,
            state: IntentionState::Fresh,
            stop: parent.child(),
            outcome: None,
        }
    }

    /// The predicate this intention realises.
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> IntentionState {
        self.state
    }

    /// A clone of the stop token, for external cancellation.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Cancel this intention and everything running under it.
    pub fn stop(&mut self) {
        self.state = IntentionState::Stopped;
        self.stop.stop();
    }

    /// Resolve the intention by trying each applicable plan in library
    /// order.
    ///
    /// Idempotent: a second call returns the recorded outcome without
    /// re-running any plan or emitting RPCs. A plan failure moves on to
    /// the next applicable plan; exhaustion fails with
    /// [`AgentError::NoPlan`]; a set stop token fails with
    /// [`AgentError::Stopped`].
    pub async fn achieve(&mut self, ctx: &AgentContext) -> Result<bool, AgentError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        if self.stop.is_stopped() {
            self.state = IntentionState::Stopped;
            return Err(AgentError::Stopped);
        }
        self.state = IntentionState::Running;

        for kind in plan::library(ctx.config.pddl_goto) {
            if !kind.is_applicable_to(&self.predicate) {
                continue;
            }
            debug!(predicate = %self.predicate, plan = ?kind, "trying plan");
            match kind.execute(&self.predicate, &self.stop, ctx).await {
                Ok(outcome) => {
                    self.state = IntentionState::Completed;
                    self.outcome = Some(outcome);
                    return Ok(outcome);
                }
                Err(PlanError::Stopped) => {
                    self.state = IntentionState::Stopped;
                    return Err(AgentError::Stopped);
                }
                Err(error) => {
                    warn!(
                        predicate = %self.predicate,
                        plan = ?kind,
                        error = %error,
                        "plan failed, trying next"
                    );
                }
            }
        }

        if self.stop.is_stopped() {
            self.state = IntentionState::Stopped;
            return Err(AgentError::Stopped);
        }
        Err(AgentError::NoPlan {
            predicate: self.predicate.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn child_tokens_see_ancestor_stops() {
        let root = StopToken::new();
        let child = root.child();
        let grandchild = child.child();

        assert!(!grandchild.is_stopped());
        root.stop();
        assert!(child.is_stopped());
        assert!(grandchild.is_stopped());
    }

    #[test]
    fn sibling_tokens_are_independent() {
        let root = StopToken::new();
        let a = root.child();
        let b = root.child();

        a.stop();
        assert!(a.is_stopped());
        assert!(!b.is_stopped());
        assert!(!root.is_stopped());
    }

    #[test]
    fn stopping_an_intention_is_terminal() {
        let mut intention = Intention::new(Predicate::GoTo { x: 1, y: 1 });
        assert_eq!(intention.state(), IntentionState::Fresh);
        intention.stop();
        assert_eq!(intention.state(), IntentionState::Stopped);
        assert!(intention.stop_token().is_stopped());
    }
}
