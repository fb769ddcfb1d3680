//! # Rally Game Server
//!
//! Session engine for a two-player real-time ball-exchange game played
//! over persistent WebSocket connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RALLY SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Session engine (transport-agnostic)       │
//! │  ├── player.rs   - Player lifecycle, ball token, outbox      │
//! │  ├── queue.rs    - Bounded wait queue + dead-player reaper   │
//! │  └── court.rs    - Two-seat court + session driver tick      │
//! │                                                              │
//! │  network/        - Transport layer                           │
//! │  ├── protocol.rs - Text wire codec (L/N/P/B frames)          │
//! │  └── server.rs   - Accept loop, upgrade, connection pumps    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session model
//!
//! Clients land on the wait queue after the WebSocket handshake. A
//! fixed-period session driver tick seats the two earliest waiters on
//! the court, relays ball handoffs between them, recycles losers back
//! to the queue, and guarantees a ball is always in play. The server
//! simulates nothing: ball movement happens on the clients, and the
//! engine only relays crossing coordinates while enforcing that
//! exactly one side holds the ball token at any instant.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::court::{Court, SessionDriver};
pub use game::player::{Player, PlayerState, Side};
pub use game::queue::{QueueError, WaitQueue};
pub use network::protocol::{ClientMessage, Handoff, ProtocolError, ServerMessage};
pub use network::server::{GameServer, ServerConfig, ServerError};

use std::time::Duration;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Period of the session driver tick
pub const TICK_PERIOD: Duration = Duration::from_millis(500);

/// Period of the wait-queue reaper sweep
pub const REAP_PERIOD: Duration = Duration::from_secs(1);

/// Keep-alive ping interval
pub const PING_PERIOD: Duration = Duration::from_secs(2);

/// Read inactivity deadline; refreshed by every inbound frame
pub const PONG_WAIT: Duration = Duration::from_secs(3);

/// Upper bound on a single outbound write
pub const WRITE_WAIT: Duration = Duration::from_secs(2);

/// Default wait-queue capacity
pub const WAIT_QUEUE_CAPACITY: usize = 64;

/// Depth of each player's outbound message queue
pub const OUTBOUND_QUEUE_DEPTH: usize = 8;

/// Largest inbound frame accepted from a client (bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024;
