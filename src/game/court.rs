//! Court and Session Driver
//!
//! The two-seat court and the fixed-period tick that performs every
//! cross-player state transition. The tick task is the only mutator of
//! court state, which confines the race surface to the per-player
//! cells and the wait queue lock.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::player::{Player, PlayerState, Side};
use crate::game::queue::WaitQueue;
use crate::network::protocol::Handoff;

/// Vertical band a serve may start in.
const SERVE_Y_RANGE: Range<i32> = 100..900;
/// Serve angle band in degrees, from the left player's perspective.
/// Forward-biased: every angle in it travels toward the left seat.
const SERVE_ANGLE_RANGE: Range<i32> = 135..225;
/// Serve speed band.
const SERVE_SPEED_RANGE: Range<i32> = 2..6;

/// The two-seat game session.
///
/// Seats hold references only; a seated player is otherwise tracked by
/// nothing else, per the one-structure-per-player invariant.
pub struct Court {
    left: Option<Arc<Player>>,
    right: Option<Arc<Player>>,
    rng: StdRng,
}

impl Court {
    /// Create an empty court.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty court with a caller-supplied serve RNG.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            left: None,
            right: None,
            rng,
        }
    }

    /// Execute one tick: evict losers, relay the handoff, refill open
    /// seats from the wait queue, then guarantee a ball is in play.
    ///
    /// The order is load-bearing. Eviction precedes refill so a freed
    /// seat is reusable the same tick; refill precedes the serve
    /// guarantee so a freshly completed pair gets a ball immediately.
    pub fn run_tick(&mut self, queue: &WaitQueue) {
        self.evict_losers(queue);
        self.relay_handoff();
        self.refill_seats(queue);
        self.ensure_ball();
    }

    /// Move players who reported a lost point back to the wait queue.
    fn evict_losers(&mut self, queue: &WaitQueue) {
        for slot in [&mut self.left, &mut self.right] {
            let Some(player) = slot else { continue };
            if player.state() != PlayerState::Lost {
                continue;
            }

            player.reset_waiting();
            if let Err(e) = queue.enqueue(Arc::clone(player)) {
                // Dropped, not resurrected: the player's own pumps
                // will mark it dead on their next deadline.
                warn!(player = %player.id, error = %e, "could not return loser to wait queue");
            } else {
                debug!(player = %player.id, "loser returned to wait queue");
            }
            *slot = None;
        }
    }

    /// Relay the ball holder's pending exchange to the opponent.
    ///
    /// At most one relay happens per tick; only one seat can hold the
    /// ball. A payload that fails to decode costs the sender its
    /// ball-holder role and nothing else: the serve guarantee rearms
    /// the rally rather than the whole session going down with one
    /// misbehaving client.
    fn relay_handoff(&mut self) {
        let (Some(left), Some(right)) = (self.left.as_ref(), self.right.as_ref()) else {
            return;
        };

        for (sender, receiver) in [(left, right), (right, left)] {
            let Some(raw) = sender.take_exchange() else {
                continue;
            };

            match Handoff::decode(&raw) {
                Ok(handoff) => {
                    debug!(from = %sender.id, to = %receiver.id, ?handoff, "relaying net exchange");
                    receiver.send_ball_in(handoff);
                }
                Err(e) => {
                    warn!(player = %sender.id, error = %e, payload = %raw, "dropping malformed net exchange");
                }
            }
            break;
        }
    }

    /// Fill empty or dead seats from the front of the wait queue.
    fn refill_seats(&mut self, queue: &WaitQueue) {
        for (slot, side) in [(&mut self.left, Side::Left), (&mut self.right, Side::Right)] {
            if let Some(player) = slot {
                if player.state() != PlayerState::Dead {
                    continue;
                }
                // Close is idempotent with the reaper and the pumps.
                player.close();
                debug!(player = %player.id, %side, "removing dead player from court");
                *slot = None;
            }

            let Some(player) = queue.dequeue() else { continue };
            info!(player = %player.id, %side, "seating player from wait queue");
            player.begin_play(side);
            *slot = Some(player);
        }
    }

    /// Serve a fresh ball when both seats are filled and nobody holds
    /// the ball token. Always serves toward the left seat.
    fn ensure_ball(&mut self) {
        let (Some(left), Some(right)) = (self.left.as_ref(), self.right.as_ref()) else {
            return;
        };
        if left.has_ball() || right.has_ball() {
            return;
        }

        let serve = draw_serve(&mut self.rng);
        info!(player = %left.id, ?serve, "serving ball to left player");
        left.send_ball_in(serve);
    }
}

/// Draw fresh serve parameters uniformly from the fixed bands.
fn draw_serve(rng: &mut impl Rng) -> Handoff {
    Handoff {
        y_pos: rng.gen_range(SERVE_Y_RANGE),
        angle: rng.gen_range(SERVE_ANGLE_RANGE),
        speed: rng.gen_range(SERVE_SPEED_RANGE),
    }
}

impl Default for Court {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a [`Court`] against its [`WaitQueue`] on a fixed period.
///
/// Constructed once at startup and handed to a task of its own; there
/// is no global court.
pub struct SessionDriver {
    court: Court,
    queue: Arc<WaitQueue>,
    tick_period: Duration,
}

impl SessionDriver {
    /// Create a driver around an empty court.
    pub fn new(queue: Arc<WaitQueue>, tick_period: Duration) -> Self {
        Self {
            court: Court::new(),
            queue,
            tick_period,
        }
    }

    /// Run the tick loop until the task is dropped.
    pub async fn run(mut self) {
        let mut ticks = interval(self.tick_period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticks.tick().await;
            self.court.run_tick(&self.queue);
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::ServerMessage;
    use crate::OUTBOUND_QUEUE_DEPTH;
    use tokio::sync::mpsc;

    fn test_player() -> (Arc<Player>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (Arc::new(Player::new(tx)), rx)
    }

    fn test_court() -> Court {
        Court::with_rng(StdRng::seed_from_u64(7))
    }

    /// Two players enqueued, seated, and served. Returns both with
    /// their outbound receivers drained past the seat assignments and
    /// the opening serve, plus that serve's parameters.
    fn rally_in_progress(
        court: &mut Court,
        queue: &WaitQueue,
    ) -> (
        (Arc<Player>, mpsc::Receiver<ServerMessage>),
        (Arc<Player>, mpsc::Receiver<ServerMessage>),
        Handoff,
    ) {
        let (a, mut rx_a) = test_player();
        let (b, mut rx_b) = test_player();
        queue.enqueue(Arc::clone(&a)).unwrap();
        queue.enqueue(Arc::clone(&b)).unwrap();

        court.run_tick(queue);

        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Play(Side::Left));
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Play(Side::Right));
        let ServerMessage::BallIn(serve) = rx_a.try_recv().unwrap() else {
            panic!("expected the seating tick to serve to the left player");
        };
        ((a, rx_a), (b, rx_b), serve)
    }

    #[test]
    fn seats_earliest_waiters_in_order() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_a), (right, _rx_b), _serve) = rally_in_progress(&mut court, &queue);

        assert_eq!(left.state(), PlayerState::Playing);
        assert_eq!(left.side(), Some(Side::Left));
        assert_eq!(right.state(), PlayerState::Playing);
        assert_eq!(right.side(), Some(Side::Right));
        assert!(queue.is_empty());
    }

    #[test]
    fn serves_to_left_player_once_paired() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        // The seating tick also serves: neither freshly seated player
        // held the ball after refill.
        let ((left, _rx_left), (right, mut rx_right), serve) =
            rally_in_progress(&mut court, &queue);

        assert!(SERVE_Y_RANGE.contains(&serve.y_pos));
        assert!(SERVE_ANGLE_RANGE.contains(&serve.angle));
        assert!(SERVE_SPEED_RANGE.contains(&serve.speed));

        assert!(left.has_ball());
        assert!(!right.has_ball());
        assert!(rx_right.try_recv().is_err());
    }

    #[test]
    fn serve_parameters_stay_in_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let serve = draw_serve(&mut rng);
            assert!((100..=899).contains(&serve.y_pos));
            assert!((135..=224).contains(&serve.angle));
            assert!((2..=5).contains(&serve.speed));
        }
    }

    #[test]
    fn relays_handoff_to_opponent() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_left), (right, mut rx_right), _serve) = rally_in_progress(&mut court, &queue);

        left.store_handoff("N,300,30,5".to_string());
        court.run_tick(&queue);

        assert_eq!(
            rx_right.try_recv().unwrap(),
            ServerMessage::BallIn(Handoff { y_pos: 300, angle: 30, speed: 5 })
        );
        assert!(right.has_ball());
        assert!(!left.has_ball());
        assert!(left.pending_handoff().is_none());
    }

    #[test]
    fn ball_token_is_a_singleton() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_left), (right, _rx_right), _serve) = rally_in_progress(&mut court, &queue);

        assert!(!(left.has_ball() && right.has_ball()));

        left.store_handoff("N,500,200,4".to_string());
        court.run_tick(&queue);
        assert!(!(left.has_ball() && right.has_ball()));

        right.store_handoff("N,250,160,3".to_string());
        court.run_tick(&queue);
        assert!(!(left.has_ball() && right.has_ball()));
        assert!(left.has_ball());
    }

    #[test]
    fn no_relay_without_ball_token() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, mut rx_left), (right, _rx_right), _serve) = rally_in_progress(&mut court, &queue);

        // Left holds the ball; a payload from the right is not relayed.
        right.store_handoff("N,300,30,5".to_string());
        court.run_tick(&queue);

        assert!(rx_left.try_recv().is_err());
        assert!(right.pending_handoff().is_some());
        assert!(left.has_ball());
    }

    #[test]
    fn malformed_handoff_costs_ball_role_only() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, mut rx_left), (right, mut rx_right), _serve) = rally_in_progress(&mut court, &queue);

        left.store_handoff("N,garbage,30,5".to_string());
        court.run_tick(&queue);

        // Nothing reached the opponent, and the rally rearmed: the
        // same tick's serve guarantee handed left a fresh ball.
        assert!(rx_right.try_recv().is_err());
        assert!(!right.has_ball());
        assert!(matches!(rx_left.try_recv(), Ok(ServerMessage::BallIn(_))));
        assert!(left.has_ball());
        assert!(left.pending_handoff().is_none());
    }

    #[test]
    fn loser_cycles_back_to_queue() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_left), (right, _rx_right), _serve) = rally_in_progress(&mut court, &queue);

        let (waiter, mut rx_waiter) = test_player();
        queue.enqueue(Arc::clone(&waiter)).unwrap();

        left.mark_lost();
        court.run_tick(&queue);

        // The earliest waiter takes the freed seat; the loser waits.
        assert_eq!(waiter.state(), PlayerState::Playing);
        assert_eq!(waiter.side(), Some(Side::Left));
        assert_eq!(rx_waiter.try_recv().unwrap(), ServerMessage::Play(Side::Left));
        assert_eq!(left.state(), PlayerState::Waiting);
        assert_eq!(queue.dequeue().unwrap().id, left.id);
        assert_eq!(right.state(), PlayerState::Playing);
    }

    #[test]
    fn loser_reseats_same_tick_when_queue_is_empty() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_left), _b, _serve) = rally_in_progress(&mut court, &queue);

        left.mark_lost();
        court.run_tick(&queue);

        // Eviction precedes refill, so with nobody else waiting the
        // loser walks straight back onto the court.
        assert_eq!(left.state(), PlayerState::Playing);
        assert_eq!(left.side(), Some(Side::Left));
        assert!(queue.is_empty());
    }

    #[test]
    fn loser_is_dropped_when_queue_is_full() {
        let mut court = test_court();
        let queue = WaitQueue::new(0);

        let (left, _rx_left) = test_player();
        left.begin_play(Side::Left);
        court.left = Some(Arc::clone(&left));

        left.mark_lost();
        court.run_tick(&queue);

        // Logged and dropped: not seated, not queued, not resurrected.
        assert!(court.left.is_none());
        assert!(queue.is_empty());
        assert_eq!(left.state(), PlayerState::Waiting);
    }

    #[test]
    fn dead_player_is_replaced_and_closed_once() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let ((left, _rx_left), _b, _serve) = rally_in_progress(&mut court, &queue);

        let (replacement, _rx_r) = test_player();
        queue.enqueue(Arc::clone(&replacement)).unwrap();

        left.mark_dead();
        court.run_tick(&queue);

        assert!(left.is_closed());
        assert_eq!(replacement.state(), PlayerState::Playing);
        assert_eq!(replacement.side(), Some(Side::Left));

        // A racing reaper or pump closing again is harmless.
        left.close();
        assert!(left.is_closed());
    }

    #[test]
    fn empty_court_tick_is_a_no_op() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        court.run_tick(&queue);
        assert!(court.left.is_none());
        assert!(court.right.is_none());
    }

    #[test]
    fn lone_player_waits_for_an_opponent() {
        let mut court = test_court();
        let queue = WaitQueue::new(8);
        let (only, mut rx) = test_player();
        queue.enqueue(Arc::clone(&only)).unwrap();

        court.run_tick(&queue);

        assert_eq!(only.state(), PlayerState::Playing);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Play(Side::Left));
        // No opponent: no serve.
        assert!(rx.try_recv().is_err());
        assert!(!only.has_ball());
    }
}
