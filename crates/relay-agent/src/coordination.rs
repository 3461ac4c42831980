//! The multi-agent coordination protocol.
//!
//! Handlers for the companion say-channel: ignore-list propagation,
//! companion position tracking with leader-side role election,
//! hand-to-hand role commands, and delivery-tile negotiation. The
//! channel is in-order and non-lossy; a hand-to-hand command that fails
//! its reachability validation is a broken coordination assumption and
//! fatal for the worker.

use relay_types::{
    AgentId, CompanionMessage, DeliveryTileStatus, Hand2HandMode, Point,
};
use relay_world::find_path;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::error::AgentError;
use crate::options::{has_reachable_spawn, nearest_reachable_depot};

/// Dispatches companion messages into agent and map state.
pub struct Coordinator {
    ctx: AgentContext,
}

impl Coordinator {
    /// Create a coordinator for one worker.
    pub const fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Handle one say message.
    ///
    /// Messages from agents other than the companion and payloads that
    /// do not parse as companion messages are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Protocol`] when a hand-to-hand command
    /// fails its reachability validation (fatal for the worker), or
    /// [`AgentError::Client`] when the transport died mid-reply.
    pub async fn handle_message(
        &self,
        sender: &AgentId,
        payload: &serde_json::Value,
    ) -> Result<(), AgentError> {
        let snapshot = self.ctx.agent.snapshot().await;
        if let Some(companion) = &snapshot.companion {
            if companion != sender {
                debug!(%sender, "say message from a non-companion, ignoring");
                return Ok(());
            }
        }

        let message: CompanionMessage = match serde_json::from_value(payload.clone()) {
            Ok(message) => message,
            Err(error) => {
                warn!(%sender, error = %error, "unparseable companion message, skipping");
                return Ok(());
            }
        };

        match message {
            CompanionMessage::MultiPickup { parcel_ids } => {
                debug!(count = parcel_ids.len(), "companion claimed pickups");
                self.ctx.agent.set_parcels_to_ignore(parcel_ids).await;
                Ok(())
            }
            CompanionMessage::CompanionPosition { x, y } => {
                self.on_companion_position(Point::new(x, y)).await
            }
            CompanionMessage::Hand2Hand { behavior } => self.on_hand2hand(behavior).await,
            CompanionMessage::DeliveryTile {
                status: DeliveryTileStatus::Set,
                tile,
            } => self.on_delivery_tile_set(sender, tile).await,
            CompanionMessage::DeliveryTile {
                status: DeliveryTileStatus::Error,
                ..
            } => {
                info!("companion rejected the delivery tile, renegotiating");
                self.ctx.agent.set_delivery_tile(None).await;
                Ok(())
            }
        }
    }

    /// Track the companion's tile; the first reception on the leader
    /// also runs role election.
    ///
    /// Handlers run on the observer task, so they must never wait for a
    /// later event on the same channel. The transport delivers the self
    /// observation before any say message; should one arrive early
    /// anyway, the election is deferred to the next position report
    /// rather than blocking the channel.
    async fn on_companion_position(&self, point: Point) -> Result<(), AgentError> {
        let snapshot = self.ctx.agent.snapshot().await;
        self.ctx
            .world
            .set_companion_position(point, snapshot.is_leader)
            .await;

        if snapshot.is_leader {
            let Some(from) = snapshot.position else {
                debug!("own position unknown, deferring election");
                return Ok(());
            };
            if self.ctx.agent.begin_election().await {
                self.run_election(from, snapshot.companion).await?;
            }
        }
        Ok(())
    }

    /// Leader-side role election.
    ///
    /// A leader that cannot reach a depot must gather; one that cannot
    /// reach a spawn must deliver; otherwise both agents keep default
    /// behavior. The loop is released regardless of the outcome.
    async fn run_election(&self, from: Point, companion: Option<AgentId>) -> Result<(), AgentError> {
        let Some(companion) = companion else {
            warn!("election triggered without a companion id");
            self.ctx.agent.set_initialized().await;
            return Ok(());
        };

        let reachable_depot = nearest_reachable_depot(&self.ctx.world, from).await;
        let can_gather = has_reachable_spawn(&self.ctx.world, from).await;

        if reachable_depot.is_none() {
            info!("no reachable depot, commanding companion to deliver");
            self.ctx
                .client
                .emit_say(
                    companion,
                    CompanionMessage::Hand2Hand {
                        behavior: Hand2HandMode::Deliver,
                    },
                )
                .await?;
            self.ctx.agent.set_mode(Hand2HandMode::Gather).await;
        } else if can_gather {
            info!("both roles reachable, keeping default behavior");
            self.ctx
                .client
                .emit_say(
                    companion,
                    CompanionMessage::Hand2Hand {
                        behavior: Hand2HandMode::None,
                    },
                )
                .await?;
        } else {
            info!("no reachable spawn, commanding companion to gather");
            self.ctx
                .client
                .emit_say(
                    companion,
                    CompanionMessage::Hand2Hand {
                        behavior: Hand2HandMode::Gather,
                    },
                )
                .await?;
            self.ctx.agent.set_mode(Hand2HandMode::Deliver).await;
            if let Some(depot) = reachable_depot {
                self.ctx.agent.set_depot(depot).await;
            }
        }

        self.ctx.agent.set_initialized().await;
        Ok(())
    }

    /// Follower-side role command.
    async fn on_hand2hand(&self, behavior: Hand2HandMode) -> Result<(), AgentError> {
        let Some(from) = self.ctx.agent.snapshot().await.position else {
            warn!("hand-to-hand command before self observation, dropping");
            return Ok(());
        };

        match behavior {
            Hand2HandMode::Deliver => {
                let Some(depot) = nearest_reachable_depot(&self.ctx.world, from).await else {
                    return Err(AgentError::Protocol {
                        reason: String::from("commanded to deliver with no reachable depot"),
                    });
                };
                self.ctx.agent.set_mode(Hand2HandMode::Deliver).await;
                self.ctx.agent.set_depot(depot).await;
            }
            Hand2HandMode::Gather => {
                if !has_reachable_spawn(&self.ctx.world, from).await {
                    return Err(AgentError::Protocol {
                        reason: String::from("commanded to gather with no reachable spawn"),
                    });
                }
                self.ctx.agent.set_mode(Hand2HandMode::Gather).await;
            }
            Hand2HandMode::None => {
                debug!("companion keeps default behavior");
            }
        }

        self.ctx.agent.set_initialized().await;
        Ok(())
    }

    /// Gatherer-side delivery-tile proposal: validate reachability
    /// before recording, reject otherwise.
    async fn on_delivery_tile_set(
        &self,
        sender: &AgentId,
        tile: Option<Point>,
    ) -> Result<(), AgentError> {
        let Some(tile) = tile else {
            warn!("delivery tile proposal without a tile, ignoring");
            return Ok(());
        };

        let Some(from) = self.ctx.agent.snapshot().await.position else {
            warn!("delivery tile proposal before self observation, dropping");
            return Ok(());
        };

        let reachable = self
            .ctx
            .world
            .with_map(|m| find_path(m, from, tile).is_some())
            .await
            .unwrap_or(false);

        if reachable {
            info!(%tile, "delivery tile recorded");
            self.ctx.agent.set_delivery_tile(Some(tile)).await;
        } else {
            warn!(%tile, "proposed delivery tile unreachable, rejecting");
            self.ctx
                .client
                .emit_say(
                    sender.clone(),
                    CompanionMessage::DeliveryTile {
                        status: DeliveryTileStatus::Error,
                        tile: None,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use relay_types::{AgentConfig, ParcelId, RawTile};
    use relay_world::MapRole;

    use super::*;
    use crate::agent::Agent;
    use crate::client::{RecordedAction, StubTransport};
    use crate::state::WorldState;

    async fn make_world(rows: &[&str], role: MapRole) -> WorldState {
        let mut raw = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, code) in row.bytes().enumerate() {
                raw.push(RawTile {
                    x: u32::try_from(x).unwrap(),
                    y: u32::try_from(y).unwrap(),
                    code: code - b'0',
                });
            }
        }
        let width = u32::try_from(rows.first().map_or(0, |r| r.len())).unwrap();
        let height = u32::try_from(rows.len()).unwrap();
        let world = WorldState::new();
        world.install_map(width, height, &raw, role).await.unwrap();
        world
    }

    async fn make_coordinator(
        is_leader: bool,
        world: WorldState,
        start: Point,
    ) -> (Coordinator, StubTransport, Agent) {
        let config = AgentConfig {
            dual_agent: true,
            is_leader,
            ..AgentConfig::default()
        };
        let agent = Agent::new(&config, Some(AgentId::new("companion")));
        agent.set_position(start).await;
        let (client, stub) = StubTransport::spawn(start);
        let ctx =
            crate::context::AgentContext::new(agent.clone(), world, client, Arc::new(config));
        (Coordinator::new(ctx), stub, agent)
    }

    fn message_json(message: &CompanionMessage) -> serde_json::Value {
        serde_json::to_value(message).unwrap()
    }

    #[tokio::test]
    async fn multi_pickup_replaces_the_ignore_list() {
        let world = make_world(&["3333"], MapRole::Follower).await;
        let (coordinator, _stub, agent) =
            make_coordinator(false, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::MultiPickup {
            parcel_ids: vec![ParcelId::new("P2"), ParcelId::new("P1")],
        });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        let ignored = agent.snapshot().await.parcels_to_ignore;
        assert!(ignored.contains(&ParcelId::new("P1")));
        assert!(ignored.contains(&ParcelId::new("P2")));
        assert_eq!(ignored.len(), 2);
    }

    #[tokio::test]
    async fn leader_with_no_depot_elects_itself_gatherer() {
        // Leader at x=0: spawn reachable, the depot is walled off.
        let world = make_world(&["13032"], MapRole::Leader).await;
        let (coordinator, stub, agent) =
            make_coordinator(true, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::CompanionPosition { x: 4, y: 0 });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        let snapshot = agent.snapshot().await;
        assert_eq!(snapshot.mode, Hand2HandMode::Gather);
        assert!(snapshot.initialized);

        let said = stub.recorded().await.into_iter().find_map(|a| match a {
            RecordedAction::Say(_, message) => Some(message),
            _ => None,
        });
        assert_eq!(
            said,
            Some(CompanionMessage::Hand2Hand {
                behavior: Hand2HandMode::Deliver,
            })
        );
    }

    #[tokio::test]
    async fn capable_leader_keeps_default_behavior() {
        // Two rows: the companion's tile blocks nothing permanently.
        let world = make_world(&["13332", "33333"], MapRole::Leader).await;
        let (coordinator, stub, agent) =
            make_coordinator(true, world, Point::new(1, 0)).await;

        let message = message_json(&CompanionMessage::CompanionPosition { x: 3, y: 0 });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        let snapshot = agent.snapshot().await;
        assert_eq!(snapshot.mode, Hand2HandMode::None);
        assert!(snapshot.initialized);

        let said = stub.recorded().await.into_iter().find_map(|a| match a {
            RecordedAction::Say(_, message) => Some(message),
            _ => None,
        });
        assert_eq!(
            said,
            Some(CompanionMessage::Hand2Hand {
                behavior: Hand2HandMode::None,
            })
        );
    }

    #[tokio::test]
    async fn election_runs_only_once() {
        let world = make_world(&["13032"], MapRole::Leader).await;
        let (coordinator, stub, _agent) =
            make_coordinator(true, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::CompanionPosition { x: 4, y: 0 });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        let says = stub
            .recorded()
            .await
            .iter()
            .filter(|a| matches!(a, RecordedAction::Say(_, _)))
            .count();
        assert_eq!(says, 1);
    }

    #[tokio::test]
    async fn follower_accepts_a_deliver_command() {
        let world = make_world(&["3332"], MapRole::Follower).await;
        let (coordinator, _stub, agent) =
            make_coordinator(false, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::Hand2Hand {
            behavior: Hand2HandMode::Deliver,
        });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        let snapshot = agent.snapshot().await;
        assert_eq!(snapshot.mode, Hand2HandMode::Deliver);
        assert_eq!(snapshot.depot, Some(Point::new(3, 0)));
        assert!(snapshot.initialized);
    }

    #[tokio::test]
    async fn deliver_command_without_a_depot_is_fatal() {
        let world = make_world(&["3333"], MapRole::Follower).await;
        let (coordinator, _stub, _agent) =
            make_coordinator(false, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::Hand2Hand {
            behavior: Hand2HandMode::Deliver,
        });
        let result = coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await;
        assert!(matches!(result, Err(AgentError::Protocol { .. })));
    }

    #[tokio::test]
    async fn unreachable_delivery_tile_is_rejected() {
        // The proposed tile sits behind a wall from the gatherer.
        let world = make_world(&["33033"], MapRole::Leader).await;
        let (coordinator, stub, agent) =
            make_coordinator(true, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::DeliveryTile {
            status: DeliveryTileStatus::Set,
            tile: Some(Point::new(4, 0)),
        });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        assert_eq!(agent.snapshot().await.delivery_tile, None);
        let said = stub.recorded().await.into_iter().find_map(|a| match a {
            RecordedAction::Say(_, message) => Some(message),
            _ => None,
        });
        assert_eq!(
            said,
            Some(CompanionMessage::DeliveryTile {
                status: DeliveryTileStatus::Error,
                tile: None,
            })
        );
    }

    #[tokio::test]
    async fn delivery_tile_error_forces_renegotiation() {
        let world = make_world(&["3333"], MapRole::Follower).await;
        let (coordinator, _stub, agent) =
            make_coordinator(false, world, Point::new(0, 0)).await;
        agent.set_delivery_tile(Some(Point::new(2, 0))).await;

        let message = message_json(&CompanionMessage::DeliveryTile {
            status: DeliveryTileStatus::Error,
            tile: None,
        });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        assert_eq!(agent.snapshot().await.delivery_tile, None);
    }

    #[tokio::test]
    async fn reachable_delivery_tile_is_recorded() {
        let world = make_world(&["3333"], MapRole::Leader).await;
        let (coordinator, _stub, agent) =
            make_coordinator(true, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::DeliveryTile {
            status: DeliveryTileStatus::Set,
            tile: Some(Point::new(2, 0)),
        });
        coordinator
            .handle_message(&AgentId::new("companion"), &message)
            .await
            .unwrap();

        assert_eq!(agent.snapshot().await.delivery_tile, Some(Point::new(2, 0)));
    }

    #[tokio::test]
    async fn non_companion_messages_are_dropped() {
        let world = make_world(&["3333"], MapRole::Follower).await;
        let (coordinator, _stub, agent) =
            make_coordinator(false, world, Point::new(0, 0)).await;

        let message = message_json(&CompanionMessage::MultiPickup {
            parcel_ids: vec![ParcelId::new("P1")],
        });
        coordinator
            .handle_message(&AgentId::new("stranger"), &message)
            .await
            .unwrap();

        assert!(agent.snapshot().await.parcels_to_ignore.is_empty());
    }
}
