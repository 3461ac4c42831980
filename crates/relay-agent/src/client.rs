//! Channel-based adapter over the game transport.
//!
//! The core never talks to a socket. Actions leave through a
//! [`GameHandle`] as [`ActionCommand`] records with `oneshot` reply
//! slots; sensor events arrive on a plain `mpsc` channel of
//! [`SensorEvent`]. Whatever owns the other ends -- the real network
//! client, the in-process simulator, or a test script -- is the
//! transport.
//!
//! [`SensorEvent`]: relay_types::SensorEvent

use std::sync::Arc;

use relay_types::{AgentId, CompanionMessage, Direction, Point};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::error::ClientError;

/// An action RPC issued by the core, with its reply slot.
#[derive(Debug)]
pub enum ActionCommand {
    /// Move one tile in a cardinal direction. The reply carries the new
    /// position on success and `None` when the move was refused.
    Move {
        /// Requested direction.
        direction: Direction,
        /// Reply slot.
        reply: oneshot::Sender<Option<Point>>,
    },
    /// Pick up every parcel on the current tile.
    Pickup {
        /// Reply slot: whether anything was picked up.
        reply: oneshot::Sender<bool>,
    },
    /// Put down every carried parcel on the current tile.
    Putdown {
        /// Reply slot: whether the putdown was accepted.
        reply: oneshot::Sender<bool>,
    },
    /// Send a coordination message to another agent.
    Say {
        /// Receiving agent.
        recipient: AgentId,
        /// Message payload.
        message: CompanionMessage,
        /// Reply slot: whether the message was accepted for delivery.
        reply: oneshot::Sender<bool>,
    },
}

/// The core's handle on the game transport's action channel.
#[derive(Debug, Clone)]
pub struct GameHandle {
    actions: mpsc::Sender<ActionCommand>,
}

impl GameHandle {
    /// Wrap an existing action sender.
    pub const fn new(actions: mpsc::Sender<ActionCommand>) -> Self {
        Self { actions }
    }

    /// Create a handle together with the receiver the transport drives.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ActionCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    async fn send(&self, command: ActionCommand) -> Result<(), ClientError> {
        self.actions.send(command).await.map_err(|_closed| ClientError)
    }

    /// Issue a move RPC. Returns the new position on success, `None`
    /// when the transport refused the move (blocked tile, desync).
    pub async fn emit_move(&self, direction: Direction) -> Result<Option<Point>, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(ActionCommand::Move { direction, reply }).await?;
        response.await.map_err(|_closed| ClientError)
    }

    /// Issue a pickup RPC.
    pub async fn emit_pickup(&self) -> Result<bool, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(ActionCommand::Pickup { reply }).await?;
        response.await.map_err(|_closed| ClientError)
    }

    /// Issue a putdown RPC.
    pub async fn emit_putdown(&self) -> Result<bool, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(ActionCommand::Putdown { reply }).await?;
        response.await.map_err(|_closed| ClientError)
    }

    /// Send a coordination message to another agent.
    pub async fn emit_say(
        &self,
        recipient: AgentId,
        message: CompanionMessage,
    ) -> Result<bool, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(ActionCommand::Say {
            recipient,
            message,
            reply,
        })
        .await?;
        response.await.map_err(|_closed| ClientError)
    }
}

/// What a [`StubTransport`] observed, without the reply plumbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedAction {
    /// A move RPC in the given direction.
    Move(Direction),
    /// A pickup RPC.
    Pickup,
    /// A putdown RPC.
    Putdown,
    /// A say RPC to the given recipient.
    Say(AgentId, CompanionMessage),
}

/// A permissive in-memory transport for tests.
///
/// Every move succeeds (unless a failure budget is armed), pickups and
/// putdowns succeed, and says are accepted; everything is recorded so
/// tests can assert on the exact RPC sequence.
#[derive(Debug, Clone)]
pub struct StubTransport {
    position: Arc<Mutex<Point>>,
    log: Arc<Mutex<Vec<RecordedAction>>>,
    failing_moves: Arc<Mutex<u32>>,
}

impl StubTransport {
    /// Spawn a stub transport task and return the core-side handle plus
    /// the stub for inspection.
    pub fn spawn(start: Point) -> (GameHandle, Self) {
        let (handle, mut actions) = GameHandle::channel(16);
        let stub = Self {
            position: Arc::new(Mutex::new(start)),
            log: Arc::new(Mutex::new(Vec::new())),
            failing_moves: Arc::new(Mutex::new(0)),
        };

        let driver = stub.clone();
        tokio::spawn(async move {
            while let Some(command) = actions.recv().await {
                driver.handle(command).await;
            }
        });

        (handle, stub)
    }

    /// Make the next `count` move RPCs fail.
    pub async fn fail_next_moves(&self, count: u32) {
        *self.failing_moves.lock().await = count;
    }

    /// The actions observed so far.
    pub async fn recorded(&self) -> Vec<RecordedAction> {
        self.log.lock().await.clone()
    }

    /// The transport's current idea of the agent position.
    pub async fn position(&self) -> Point {
        *self.position.lock().await
    }

    async fn handle(&self, command: ActionCommand) {
        match command {
            ActionCommand::Move { direction, reply } => {
                self.log.lock().await.push(RecordedAction::Move(direction));

                let mut failing = self.failing_moves.lock().await;
                if *failing > 0 {
                    *failing = failing.saturating_sub(1);
                    let _ = reply.send(None);
                    return;
                }
                drop(failing);

                let mut position = self.position.lock().await;
                let moved = match direction {
                    Direction::Up => Point::new(position.x, position.y.saturating_add(1)),
                    Direction::Down => Point::new(position.x, position.y.saturating_sub(1)),
                    Direction::Left => Point::new(position.x.saturating_sub(1), position.y),
                    Direction::Right => Point::new(position.x.saturating_add(1), position.y),
                };
                *position = moved;
                let _ = reply.send(Some(moved));
            }
            ActionCommand::Pickup { reply } => {
                self.log.lock().await.push(RecordedAction::Pickup);
                let _ = reply.send(true);
            }
            ActionCommand::Putdown { reply } => {
                self.log.lock().await.push(RecordedAction::Putdown);
                let _ = reply.send(true);
            }
            ActionCommand::Say {
                recipient,
                message,
                reply,
            } => {
                self.log
                    .lock()
                    .await
                    .push(RecordedAction::Say(recipient, message));
                let _ = reply.send(true);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moves_update_the_stub_position() {
        let (handle, stub) = StubTransport::spawn(Point::new(1, 1));

        let new_position = handle.emit_move(Direction::Right).await.unwrap();
        assert_eq!(new_position, Some(Point::new(2, 1)));
        assert_eq!(stub.position().await, Point::new(2, 1));
    }

    #[tokio::test]
    async fn armed_failures_refuse_moves() {
        let (handle, stub) = StubTransport::spawn(Point::new(1, 1));
        stub.fail_next_moves(1).await;

        assert_eq!(handle.emit_move(Direction::Up).await.unwrap(), None);
        assert_eq!(
            handle.emit_move(Direction::Up).await.unwrap(),
            Some(Point::new(1, 2))
        );
    }

    #[tokio::test]
    async fn all_rpcs_are_recorded() {
        let (handle, stub) = StubTransport::spawn(Point::new(0, 0));

        let _ = handle.emit_pickup().await.unwrap();
        let _ = handle.emit_putdown().await.unwrap();
        let _ = handle
            .emit_say(
                AgentId::new("peer"),
                CompanionMessage::CompanionPosition { x: 0, y: 0 },
            )
            .await
            .unwrap();

        let recorded = stub.recorded().await;
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded.first(), Some(&RecordedAction::Pickup));
    }

    #[tokio::test]
    async fn dropped_transport_surfaces_client_error() {
        let (handle, actions) = GameHandle::channel(1);
        drop(actions);
        assert!(handle.emit_pickup().await.is_err());
    }
}
