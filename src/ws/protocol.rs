//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::player::Team;
use crate::game::GameStatus;

/// Messages sent from client to server
///
/// Joining and leaving are implied by the WebSocket connection itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// New position on the ground plane
    Move {
        x: f32,
        z: f32,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Parse and validate a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let msg: ClientMsg = serde_json::from_str(text)?;
        if let ClientMsg::Move { x, z } = msg {
            if !x.is_finite() || !z.is_finite() {
                return Err(ProtocolError::NonFiniteCoordinate);
            }
        }
        Ok(msg)
    }
}

/// Client message rejection reasons
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Move coordinates must be finite")]
    NonFiniteCoordinate,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: Uuid,
        server_time: u64,
    },

    /// Player joined the room
    PlayerJoined {
        player: PlayerSnapshot,
    },

    /// Player left the room
    PlayerLeft {
        session_id: Uuid,
    },

    /// Authoritative game state (sent whenever it changes)
    State {
        /// Increments with every published state
        revision: u64,
        players: Vec<PlayerSnapshot>,
        time_remaining: u32,
        game_status: GameStatus,
        winner_message: String,
    },

    /// Humans converted during one collision pass, in infection order
    Infected {
        session_ids: Vec<Uuid>,
    },

    /// Countdown has begun
    TimerStarted {
        time_remaining: u32,
    },

    /// Game reached a terminal status (sent once per game)
    GameOver {
        status: GameStatus,
        message: String,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub session_id: Uuid,
    pub x: f32,
    pub z: f32,
    pub team: Team,
}
