//! Snapshot building and change detection

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::room::GameState;
use super::win::GameStatus;

/// Builds `State` messages, suppressing ones identical to the last published
pub struct SnapshotBuilder {
    /// Revision of the last published snapshot
    revision: u64,
    /// Last published snapshot for change detection
    last_snapshot: Option<SnapshotData>,
}

#[derive(Debug, Clone, PartialEq)]
struct SnapshotData {
    players: Vec<PlayerSnapshot>,
    time_remaining: u32,
    game_status: GameStatus,
    winner_message: String,
}

impl SnapshotData {
    fn capture(state: &GameState) -> Self {
        let mut players: Vec<_> = state.players.values().collect();
        players.sort_by_key(|p| p.join_seq);

        Self {
            players: players.into_iter().map(|p| p.snapshot()).collect(),
            time_remaining: state.time_remaining,
            game_status: state.game_status,
            winner_message: state.winner_message.clone(),
        }
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            revision: 0,
            last_snapshot: None,
        }
    }

    /// Build a state message if anything changed since the last one
    pub fn build_if_changed(&mut self, state: &GameState) -> Option<ServerMsg> {
        let data = SnapshotData::capture(state);
        if self.last_snapshot.as_ref() == Some(&data) {
            return None;
        }

        self.revision += 1;
        self.last_snapshot = Some(data.clone());

        Some(ServerMsg::State {
            revision: self.revision,
            players: data.players,
            time_remaining: data.time_remaining,
            game_status: data.game_status,
            winner_message: data.winner_message,
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
