//! Wait Queue
//!
//! Bounded FIFO of players not currently seated on the court, plus the
//! reaper task that sweeps out dead entries. Bounding the queue keeps
//! abandoned connections from growing memory without limit; FIFO order
//! seats the earliest waiter first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::game::player::{Player, PlayerState};
use crate::REAP_PERIOD;

/// Wait queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue already holds its configured maximum.
    #[error("too many players waiting")]
    CapacityExceeded,

    /// Only players in waiting state may be enqueued.
    #[error("player must be in waiting state")]
    InvalidState,
}

/// Bounded FIFO of waiting players.
///
/// Enqueue, dequeue and the reaper sweep all serialize on one lock.
pub struct WaitQueue {
    players: Mutex<VecDeque<Arc<Player>>>,
    capacity: usize,
}

impl WaitQueue {
    /// Create a queue holding at most `capacity` players.
    pub fn new(capacity: usize) -> Self {
        Self {
            players: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append a waiting player.
    ///
    /// Fails with [`QueueError::CapacityExceeded`] when the queue is
    /// full and [`QueueError::InvalidState`] when the player is not in
    /// waiting state; the queue is unchanged on failure.
    pub fn enqueue(&self, player: Arc<Player>) -> Result<(), QueueError> {
        let mut players = self.players.lock().unwrap();

        if players.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded);
        }
        if player.state() != PlayerState::Waiting {
            return Err(QueueError::InvalidState);
        }

        players.push_back(player);
        Ok(())
    }

    /// Remove and return the earliest-enqueued player, if any.
    pub fn dequeue(&self) -> Option<Arc<Player>> {
        self.players.lock().unwrap().pop_front()
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.players.lock().unwrap().len()
    }

    /// Whether the queue holds no players.
    pub fn is_empty(&self) -> bool {
        self.players.lock().unwrap().is_empty()
    }

    /// Sweep out every dead entry, closing its connection. Live
    /// entries keep their relative order.
    pub fn reap_dead(&self) {
        let mut players = self.players.lock().unwrap();
        debug!(waiting = players.len(), "sweeping wait queue");

        players.retain(|player| {
            if player.state() == PlayerState::Dead {
                player.close();
                info!(player = %player.id, "reaped dead player from wait queue");
                false
            } else {
                true
            }
        });
    }

    /// Spawn the background reaper, sweeping on a fixed period.
    ///
    /// Sweeping on a timer rather than only on queue traffic bounds
    /// how long a dead entry can occupy a slot in a quiet queue.
    pub fn spawn_reaper(queue: Arc<WaitQueue>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep = interval(REAP_PERIOD);
            loop {
                sweep.tick().await;
                queue.reap_dead();
            }
        })
    }
}
