//! Protocol Messages
//!
//! Wire format for client-server exchange over WebSocket. Frames are
//! plain text, comma-separated fields behind a case-sensitive leading
//! token - small enough to eyeball in a browser console.

use std::fmt;
use std::str::Split;

use crate::game::player::Side;

/// Wire decode failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The leading token is not one this server speaks.
    #[error("unsupported message {frame:?}")]
    UnknownToken {
        /// The full offending frame.
        frame: String,
    },

    /// A required field is absent.
    #[error("missing field in {frame:?}")]
    MissingField {
        /// The full offending frame.
        frame: String,
    },

    /// A numeric field failed to parse.
    #[error("bad numeric field {field:?} in {frame:?}")]
    BadNumber {
        /// The field that failed to parse.
        field: String,
        /// The full offending frame.
        frame: String,
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `L` - the player lost the point.
    Lost,

    /// `N,yPos,angle,speed` - the ball crossed to the server side.
    ///
    /// Carries the frame verbatim: the payload is decoded by the
    /// session driver at relay time, not at read time.
    NetExchange(String),
}

impl ClientMessage {
    /// Classify an inbound frame by its leading token.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        match frame.split(',').next() {
            Some("L") => Ok(ClientMessage::Lost),
            Some("N") => Ok(ClientMessage::NetExchange(frame.to_string())),
            _ => Err(ProtocolError::UnknownToken {
                frame: frame.to_string(),
            }),
        }
    }
}

/// Decoded handoff payload: where and how the ball crossed the net.
///
/// The angle is in degrees and always expressed from the LEFT player's
/// perspective; the right-side client mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    /// Vertical position at the crossing.
    pub y_pos: i32,
    /// Travel angle in degrees.
    pub angle: i32,
    /// Speed in client units.
    pub speed: i32,
}

impl Handoff {
    /// Decode an `N,yPos,angle,speed` payload. Fields beyond the
    /// third are ignored.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let mut parts = raw.split(',');
        if parts.next() != Some("N") {
            return Err(ProtocolError::UnknownToken {
                frame: raw.to_string(),
            });
        }

        let y_pos = next_int(&mut parts, raw)?;
        let angle = next_int(&mut parts, raw)?;
        let speed = next_int(&mut parts, raw)?;

        Ok(Self { y_pos, angle, speed })
    }
}

fn next_int(parts: &mut Split<'_, char>, frame: &str) -> Result<i32, ProtocolError> {
    let field = parts.next().ok_or_else(|| ProtocolError::MissingField {
        frame: frame.to_string(),
    })?;
    field.parse().map_err(|_| ProtocolError::BadNumber {
        field: field.to_string(),
        frame: frame.to_string(),
    })
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `P,<SIDE>` - assigns the player's seat.
    Play(Side),

    /// `B,yPos,angle,speed` - ball enters play for this client.
    BallIn(Handoff),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Play(side) => write!(f, "P,{side}"),
            ServerMessage::BallIn(h) => write!(f, "B,{},{},{}", h.y_pos, h.angle, h.speed),
        }
    }
}
