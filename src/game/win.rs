//! Win condition evaluation

use serde::{Deserialize, Serialize};

use super::player::PlayerRecord;

pub const ZOMBIES_WIN_MESSAGE: &str = "Zombies win! Everyone has been infected.";
pub const HUMANS_WIN_MESSAGE: &str = "Humans win! They survived until time ran out.";

/// Game status; terminal once it leaves `Playing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Playing,
    HumansWin,
    ZombiesWin,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Playing
    }

    /// Text shown to players when the game ends (empty while playing)
    pub fn winner_message(self) -> &'static str {
        match self {
            Self::Playing => "",
            Self::HumansWin => HUMANS_WIN_MESSAGE,
            Self::ZombiesWin => ZOMBIES_WIN_MESSAGE,
        }
    }
}

/// Decides the outcome of a game from its current state
pub struct WinEvaluator;

impl WinEvaluator {
    /// Rules, first match wins:
    /// 1. a terminal `current` is returned unchanged
    /// 2. no players: still playing
    /// 3. no humans: zombies win
    /// 4. clock at zero with a human left: humans win
    /// 5. otherwise still playing
    pub fn evaluate<'a, I>(players: I, time_remaining: u32, current: GameStatus) -> GameStatus
    where
        I: IntoIterator<Item = &'a PlayerRecord>,
    {
        if current.is_terminal() {
            return current;
        }

        let mut total = 0usize;
        let mut humans = 0usize;
        for player in players {
            total += 1;
            if player.is_human() {
                humans += 1;
            }
        }

        if total == 0 {
            GameStatus::Playing
        } else if humans == 0 {
            GameStatus::ZombiesWin
        } else if time_remaining == 0 {
            GameStatus::HumansWin
        } else {
            GameStatus::Playing
        }
    }
}
