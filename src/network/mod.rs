//! Network Layer
//!
//! WebSocket transport for the session engine: the text wire codec and
//! the accept loop with its per-connection reader/writer pumps.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, Handoff, ProtocolError, ServerMessage};
pub use server::{add_player, GameServer, ServerConfig, ServerError};
