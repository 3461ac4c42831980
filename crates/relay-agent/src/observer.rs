//! The world-state observer: sensor events in, belief updates out.
//!
//! One observer task per worker consumes the transport's event channel
//! and fans each event into the belief map, the agent's own state, the
//! coordination handlers, and -- after each sensing sweep -- an option
//! generation pass. A sensor update always completes before the option
//! generation it triggers starts reading.

use std::sync::Arc;

use chrono::Utc;
use relay_types::{CompanionMessage, Point, SensorEvent};
use relay_world::MapRole;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::coordination::Coordinator;
use crate::error::AgentError;
use crate::options::OptionGenerator;

/// Translates sensor events into state updates for one worker.
pub struct Observer {
    ctx: AgentContext,
    options: Arc<OptionGenerator>,
    coordinator: Coordinator,
    /// Last own position announced to the companion.
    last_broadcast: Mutex<Option<Point>>,
}

impl Observer {
    /// Create the observer for one worker.
    pub fn new(ctx: AgentContext, options: Arc<OptionGenerator>) -> Self {
        let coordinator = Coordinator::new(ctx.clone());
        Self {
            ctx,
            options,
            coordinator,
            last_broadcast: Mutex::new(None),
        }
    }

    /// Which seat of the deployment this worker's map belongs to.
    fn map_role(&self) -> MapRole {
        if !self.ctx.config.dual_agent {
            MapRole::Solo
        } else if self.ctx.config.is_leader {
            MapRole::Leader
        } else {
            MapRole::Follower
        }
    }

    /// Drain the transport's event channel until it closes.
    ///
    /// The channel is unbounded: the transport must never block on a
    /// slow worker, because the worker may be waiting on one of its own
    /// action replies.
    ///
    /// # Errors
    ///
    /// Propagates fatal event failures: unknown tile codes at map
    /// initialisation and coordination protocol violations.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<SensorEvent>,
    ) -> Result<(), AgentError> {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await?;
        }
        info!("sensor channel closed, observer shutting down");
        Ok(())
    }

    /// Apply one sensor event.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::World`] for a bad map broadcast and
    /// [`AgentError::Protocol`] for a broken coordination assumption;
    /// both are fatal for the worker.
    pub async fn handle_event(&self, event: SensorEvent) -> Result<(), AgentError> {
        match event {
            SensorEvent::Connected => {
                info!("transport connected");
            }
            SensorEvent::Disconnected => {
                warn!("transport disconnected");
            }
            SensorEvent::Config(raw) => {
                self.ctx.world.apply_config(&raw).await;
            }
            SensorEvent::Map {
                width,
                height,
                tiles,
            } => {
                self.ctx
                    .world
                    .install_map(width, height, &tiles, self.map_role())
                    .await?;
            }
            SensorEvent::You(update) => {
                self.on_you(update).await;
            }
            SensorEvent::Parcels(sensed) => {
                self.ctx.world.apply_parcels(sensed, Utc::now()).await;
                self.options.generate().await;
            }
            SensorEvent::Agents(sensed) => {
                let snapshot = self.ctx.agent.snapshot().await;
                self.ctx
                    .world
                    .apply_agents(
                        sensed,
                        snapshot.id.as_ref(),
                        snapshot.companion.as_ref(),
                        snapshot.is_leader,
                        Utc::now(),
                    )
                    .await;
                self.options.generate().await;
            }
            SensorEvent::Message {
                sender,
                sender_name,
                payload,
            } => {
                debug!(%sender, sender_name, "say message received");
                self.coordinator.handle_message(&sender, &payload).await?;
            }
        }
        Ok(())
    }

    /// Apply a self observation and announce the new position to the
    /// companion.
    async fn on_you(&self, update: relay_types::YouUpdate) {
        let point = Point::new(update.x, update.y);
        self.ctx.agent.set_identity(update.id, update.score).await;
        self.ctx.agent.set_position(point).await;

        if !self.ctx.config.dual_agent {
            return;
        }
        self.ctx
            .world
            .set_own_position(point, self.ctx.config.is_leader)
            .await;

        let Some(companion) = self.ctx.agent.snapshot().await.companion else {
            return;
        };
        {
            let mut last = self.last_broadcast.lock().await;
            if *last == Some(point) {
                return;
            }
            *last = Some(point);
        }
        if let Err(error) = self
            .ctx
            .client
            .emit_say(
                companion,
                CompanionMessage::CompanionPosition {
                    x: point.x,
                    y: point.y,
                },
            )
            .await
        {
            warn!(error = %error, "companion position announcement failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relay_types::{AgentConfig, AgentId, ParcelId, ParcelSensed, RawTile, YouUpdate};

    use super::*;
    use crate::agent::Agent;
    use crate::client::{RecordedAction, StubTransport};
    use crate::state::WorldState;

    fn open_map_event(width: u32, height: u32) -> SensorEvent {
        let mut tiles = Vec::new();
        for y in 0..height {
            for x in 0..width {
                tiles.push(RawTile { x, y, code: 3 });
            }
        }
        SensorEvent::Map {
            width,
            height,
            tiles,
        }
    }

    async fn make_observer(config: AgentConfig) -> (Observer, StubTransport, Agent, WorldState) {
        let world = WorldState::new();
        let companion = config.dual_agent.then(|| AgentId::new("companion"));
        let agent = Agent::new(&config, companion);
        let (client, stub) = StubTransport::spawn(Point::new(0, 0));
        let ctx = AgentContext::new(
            agent.clone(),
            world.clone(),
            client,
            Arc::new(config),
        );
        let options = Arc::new(OptionGenerator::new(ctx.clone()));
        (Observer::new(ctx, options), stub, agent, world)
    }

    #[tokio::test]
    async fn map_event_populates_the_world() {
        let (observer, _stub, _agent, world) = make_observer(AgentConfig::default()).await;
        observer.handle_event(open_map_event(3, 3)).await.unwrap();
        assert!(world.is_populated().await);
    }

    #[tokio::test]
    async fn bad_map_broadcast_is_fatal() {
        let (observer, _stub, _agent, _world) = make_observer(AgentConfig::default()).await;
        let event = SensorEvent::Map {
            width: 1,
            height: 1,
            tiles: vec![RawTile { x: 0, y: 0, code: 9 }],
        };
        assert!(observer.handle_event(event).await.is_err());
    }

    #[tokio::test]
    async fn you_event_updates_identity_and_position() {
        let (observer, _stub, agent, _world) = make_observer(AgentConfig::default()).await;
        observer
            .handle_event(SensorEvent::You(YouUpdate {
                id: AgentId::new("me"),
                x: 2,
                y: 3,
                score: 7,
            }))
            .await
            .unwrap();

        let snapshot = agent.snapshot().await;
        assert_eq!(snapshot.id, Some(AgentId::new("me")));
        assert_eq!(snapshot.position, Some(Point::new(2, 3)));
    }

    #[tokio::test]
    async fn position_changes_are_announced_once() {
        let config = AgentConfig {
            dual_agent: true,
            is_leader: true,
            ..AgentConfig::default()
        };
        let (observer, stub, _agent, _world) = make_observer(config).await;
        observer.handle_event(open_map_event(3, 3)).await.unwrap();

        let you = SensorEvent::You(YouUpdate {
            id: AgentId::new("me"),
            x: 1,
            y: 1,
            score: 0,
        });
        observer.handle_event(you.clone()).await.unwrap();
        observer.handle_event(you).await.unwrap();

        let announcements = stub
            .recorded()
            .await
            .iter()
            .filter(|a| {
                matches!(
                    a,
                    RecordedAction::Say(_, CompanionMessage::CompanionPosition { .. })
                )
            })
            .count();
        assert_eq!(announcements, 1);
    }

    #[tokio::test]
    async fn parcel_sensing_triggers_option_generation() {
        let (observer, _stub, agent, _world) = make_observer(AgentConfig::default()).await;
        observer.handle_event(open_map_event(4, 4)).await.unwrap();
        observer
            .handle_event(SensorEvent::You(YouUpdate {
                id: AgentId::new("me"),
                x: 0,
                y: 0,
                score: 0,
            }))
            .await
            .unwrap();

        observer
            .handle_event(SensorEvent::Parcels(vec![ParcelSensed {
                id: ParcelId::new("P1"),
                x: 2,
                y: 2,
                reward: 10,
                carried_by: None,
            }]))
            .await
            .unwrap();

        let queue = agent.queue_predicates().await;
        assert!(queue.contains(&relay_types::Predicate::GoPickUp {
            x: 2,
            y: 2,
            parcel: ParcelId::new("P1"),
        }));
    }
}
