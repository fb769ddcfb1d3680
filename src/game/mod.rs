//! Session Engine
//!
//! Everything that decides who plays, who waits, and who holds the
//! ball. Transport-agnostic: the only connection-facing surface is
//! each player's outbound message queue.
//!
//! ## Module Structure
//!
//! - `player`: player entity, lifecycle state machine, ball token
//! - `queue`: bounded FIFO of waiting players + reaper
//! - `court`: the two-seat court and the session driver tick

pub mod court;
pub mod player;
pub mod queue;

// Re-export key types
pub use court::{Court, SessionDriver};
pub use player::{Player, PlayerState, Side};
pub use queue::{QueueError, WaitQueue};
