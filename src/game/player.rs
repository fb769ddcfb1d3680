//! Player Entity
//!
//! The unit of state tracked by the session engine: lifecycle state,
//! ball token, pending handoff payload, and the bounded outbound queue
//! drained by the connection's writer pump.

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::network::protocol::{Handoff, ServerMessage};

/// Player lifecycle state. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// On the wait queue, or between structures on the way there.
    Waiting,
    /// Seated on the court.
    Playing,
    /// Connection is gone. Terminal: no transition ever leaves Dead.
    Dead,
    /// Reported a lost point; cycled back to the queue on the next tick.
    Lost,
}

/// Court seat assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left seat. Serves are always aimed here.
    Left,
    /// Right seat. Mirrors relayed angles client-side.
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("LEFT"),
            Side::Right => f.write_str("RIGHT"),
        }
    }
}

/// The mutable cell shared between a player's connection pumps and the
/// session driver tick. One lock, never held across an await.
#[derive(Debug)]
struct PlayerCell {
    state: PlayerState,
    side: Option<Side>,
    has_ball: bool,
    pending_handoff: Option<String>,
}

/// A connected player.
///
/// Held by reference (`Arc`) from whichever structure currently tracks
/// it: the wait queue, a court seat, or only its own connection pumps
/// once everything else has let go.
pub struct Player {
    /// Identifier for log correlation.
    pub id: Uuid,
    /// When the connection was registered. Diagnostic only.
    pub joined_at: Instant,
    cell: Mutex<PlayerCell>,
    /// Outbound queue; taken (dropped) on close, which makes the
    /// writer pump emit a Close frame and exit.
    outbound: Mutex<Option<mpsc::Sender<ServerMessage>>>,
}

impl Player {
    /// Create a player in waiting state around its outbound queue.
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            joined_at: Instant::now(),
            cell: Mutex::new(PlayerCell {
                state: PlayerState::Waiting,
                side: None,
                has_ball: false,
                pending_handoff: None,
            }),
            outbound: Mutex::new(Some(outbound)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlayerState {
        self.cell.lock().unwrap().state
    }

    /// Assigned seat, while playing.
    pub fn side(&self) -> Option<Side> {
        self.cell.lock().unwrap().side
    }

    /// Whether this player holds the ball token.
    pub fn has_ball(&self) -> bool {
        self.cell.lock().unwrap().has_ball
    }

    /// Pending raw handoff payload, if any.
    pub fn pending_handoff(&self) -> Option<String> {
        self.cell.lock().unwrap().pending_handoff.clone()
    }

    /// Mark the connection dead. Monotonic: both pumps may call this,
    /// in any order, and nothing ever un-sets it.
    pub fn mark_dead(&self) {
        self.cell.lock().unwrap().state = PlayerState::Dead;
    }

    /// Record a client-reported lost point. Clears the ball token: the
    /// client relinquishes ball state before reporting the loss.
    pub fn mark_lost(&self) {
        let mut cell = self.cell.lock().unwrap();
        if cell.state == PlayerState::Dead {
            return;
        }
        cell.state = PlayerState::Lost;
        cell.has_ball = false;
    }

    /// Return the player to waiting state ahead of re-enqueueing.
    pub fn reset_waiting(&self) {
        let mut cell = self.cell.lock().unwrap();
        if cell.state == PlayerState::Dead {
            return;
        }
        cell.state = PlayerState::Waiting;
        cell.side = None;
    }

    /// Seat the player: set side, enter playing state, and tell the
    /// client which paddle it drives.
    pub fn begin_play(&self, side: Side) {
        {
            let mut cell = self.cell.lock().unwrap();
            if cell.state != PlayerState::Dead {
                cell.state = PlayerState::Playing;
                cell.side = Some(side);
            }
        }
        self.send(ServerMessage::Play(side));
    }

    /// Store a raw net-exchange payload for the session driver to
    /// relay on its next tick.
    pub fn store_handoff(&self, raw: String) {
        self.cell.lock().unwrap().pending_handoff = Some(raw);
    }

    /// Take the pending exchange if this player holds the ball.
    ///
    /// Taking is atomic with giving up the ball token, so the payload
    /// and the holder role leave together whether the relay then
    /// succeeds or the payload turns out malformed.
    pub fn take_exchange(&self) -> Option<String> {
        let mut cell = self.cell.lock().unwrap();
        if !cell.has_ball {
            return None;
        }
        let raw = cell.pending_handoff.take()?;
        cell.has_ball = false;
        Some(raw)
    }

    /// Put the ball in play for this client: grant the ball token and
    /// queue a `B` message with the crossing parameters.
    pub fn send_ball_in(&self, handoff: Handoff) {
        self.cell.lock().unwrap().has_ball = true;
        self.send(ServerMessage::BallIn(handoff));
    }

    /// Queue an outbound protocol message.
    ///
    /// Best effort: a full queue drops the message (the client is
    /// stalled and the writer pump's deadline will catch up with it),
    /// and a closed queue swallows it silently.
    pub fn send(&self, message: ServerMessage) {
        let outbound = self.outbound.lock().unwrap();
        let Some(tx) = outbound.as_ref() else {
            return;
        };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                debug!(player = %self.id, %msg, "outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Close the connection by dropping the outbound queue.
    ///
    /// Safe to call any number of times from any component; only the
    /// first call does anything.
    pub fn close(&self) {
        if self.outbound.lock().unwrap().take().is_some() {
            debug!(player = %self.id, "connection closed");
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().unwrap().is_none()
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.lock().unwrap();
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("state", &cell.state)
            .field("side", &cell.side)
            .field("has_ball", &cell.has_ball)
            .finish()
    }
}
