//! Authoritative room controller
//!
//! `GameRoom` is the only writer of a room's `GameState`. Every operation is
//! synchronous; the runner task serializes calls into it. Outbound traffic
//! goes through a `SyncChannel`, so the room can be driven directly in tests.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::ws::protocol::ServerMsg;

use super::collision::CollisionEngine;
use super::player::{PlayerRecord, SpawnArea, Team};
use super::snapshot::SnapshotBuilder;
use super::timer::TimerController;
use super::win::{GameStatus, WinEvaluator};

/// Outbound side of the state-synchronization layer
pub trait SyncChannel: Send {
    /// Deliver a message to every client in the room
    fn publish(&self, msg: ServerMsg);
}

impl SyncChannel for broadcast::Sender<ServerMsg> {
    fn publish(&self, msg: ServerMsg) {
        // No subscribers is fine, the room keeps running
        let _ = self.send(msg);
    }
}

/// Reasons a room refuses a request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,

    #[error("Session already joined")]
    AlreadyJoined,

    #[error("Room is closed")]
    RoomClosed,
}

impl RoomError {
    /// Machine-readable code for `ServerMsg::Error`
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomFull => "room_full",
            RoomError::AlreadyJoined => "already_joined",
            RoomError::RoomClosed => "room_closed",
        }
    }
}

/// Canonical game state of one room
#[derive(Debug, Clone)]
pub struct GameState {
    pub players: HashMap<Uuid, PlayerRecord>,
    pub time_remaining: u32,
    pub game_status: GameStatus,
    pub winner_message: String,
}

impl GameState {
    pub fn new(round_duration_secs: u32) -> Self {
        Self {
            players: HashMap::new(),
            time_remaining: round_duration_secs,
            game_status: GameStatus::Playing,
            winner_message: String::new(),
        }
    }

    pub fn human_count(&self) -> usize {
        self.players.values().filter(|p| p.is_human()).count()
    }

    pub fn zombie_count(&self) -> usize {
        self.players.values().filter(|p| p.is_zombie()).count()
    }
}

/// The authoritative game room
pub struct GameRoom<S: SyncChannel> {
    id: Uuid,
    config: RoomConfig,
    state: GameState,
    timer: TimerController,
    rng: ChaCha8Rng,
    next_join_seq: u64,
    snapshots: SnapshotBuilder,
    sync: S,
}

impl<S: SyncChannel> GameRoom<S> {
    pub fn new(config: RoomConfig, sync: S) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let id = Uuid::new_v4();
        info!(room_id = %id, seed, "Room created");

        Self {
            id,
            state: GameState::new(config.round_duration_secs),
            config,
            timer: TimerController::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_join_seq: 0,
            snapshots: SnapshotBuilder::new(),
            sync,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn timer_mut(&mut self) -> &mut TimerController {
        &mut self.timer
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Add a player. The first player in an empty room is human, all later
    /// joiners are zombies. The countdown starts once two players are present.
    pub fn on_join(&mut self, session_id: Uuid) -> Result<Team, RoomError> {
        if self.state.players.contains_key(&session_id) {
            warn!(room_id = %self.id, session_id = %session_id, "Session already in room");
            return Err(RoomError::AlreadyJoined);
        }

        if self.state.players.len() >= self.config.max_players {
            warn!(room_id = %self.id, session_id = %session_id, "Room full, join refused");
            return Err(RoomError::RoomFull);
        }

        let team = Team::for_joiner(self.state.players.len());
        let area = SpawnArea::for_team(team);
        let (x, z) = area.sample(&mut self.rng);
        debug_assert!(area.contains(x, z));
        let player = PlayerRecord::new(session_id, team, x, z, self.next_join_seq);
        self.next_join_seq += 1;

        let snapshot = player.snapshot();
        self.state.players.insert(session_id, player);

        info!(
            room_id = %self.id,
            session_id = %session_id,
            team = ?team,
            player_count = self.state.players.len(),
            "Player joined room"
        );
        self.sync.publish(ServerMsg::PlayerJoined { player: snapshot });

        if self.state.players.len() >= 2
            && self.state.game_status == GameStatus::Playing
            && self.timer.start()
        {
            info!(
                room_id = %self.id,
                time_remaining = self.state.time_remaining,
                "Countdown started"
            );
            self.sync.publish(ServerMsg::TimerStarted {
                time_remaining: self.state.time_remaining,
            });
        }

        self.evaluate_win();
        self.publish_state();
        Ok(team)
    }

    /// Remove a player. Unknown sessions are ignored. An emptied room is
    /// reset so the next join starts a fresh game.
    pub fn on_leave(&mut self, session_id: Uuid) -> bool {
        if self.state.players.remove(&session_id).is_none() {
            debug!(room_id = %self.id, session_id = %session_id, "Leave for unknown session ignored");
            return false;
        }

        info!(
            room_id = %self.id,
            session_id = %session_id,
            player_count = self.state.players.len(),
            "Player left room"
        );
        self.sync.publish(ServerMsg::PlayerLeft { session_id });

        if self.state.players.is_empty() {
            self.reset();
        } else {
            self.evaluate_win();
        }

        self.publish_state();
        true
    }

    /// Apply a client position verbatim, then resolve infections and the
    /// win condition. Moves for unknown sessions are ignored.
    pub fn on_move(&mut self, session_id: Uuid, x: f32, z: f32) -> bool {
        let Some(player) = self.state.players.get_mut(&session_id) else {
            debug!(room_id = %self.id, session_id = %session_id, "Move for unknown session ignored");
            return false;
        };

        player.x = x;
        player.z = z;

        self.run_collisions();
        self.evaluate_win();
        self.publish_state();
        true
    }

    /// Periodic collision re-evaluation
    pub fn tick(&mut self) {
        self.run_collisions();
        self.evaluate_win();
        self.publish_state();
    }

    /// One countdown second elapsed
    pub fn on_timer_second(&mut self) {
        if !self.timer.is_running() {
            return;
        }

        self.state.time_remaining = TimerController::countdown(self.state.time_remaining);
        debug!(room_id = %self.id, time_remaining = self.state.time_remaining, "Countdown");

        self.evaluate_win();
        self.publish_state();
    }

    fn run_collisions(&mut self) {
        // Infection is frozen once the game is decided
        if self.state.game_status.is_terminal() {
            return;
        }

        let infected =
            CollisionEngine::evaluate(self.state.players.values(), self.config.infection_radius);
        if infected.is_empty() {
            return;
        }

        for session_id in &infected {
            if let Some(player) = self.state.players.get_mut(session_id) {
                player.infect();
            }
        }

        info!(
            room_id = %self.id,
            infected = infected.len(),
            humans_left = self.state.human_count(),
            zombies = self.state.zombie_count(),
            "Humans infected"
        );
        self.sync.publish(ServerMsg::Infected {
            session_ids: infected,
        });
    }

    fn evaluate_win(&mut self) {
        let current = self.state.game_status;
        let next = WinEvaluator::evaluate(
            self.state.players.values(),
            self.state.time_remaining,
            current,
        );
        if next == current || !next.is_terminal() {
            return;
        }

        self.state.game_status = next;
        self.state.winner_message = next.winner_message().to_string();
        self.timer.stop();

        info!(
            room_id = %self.id,
            status = ?next,
            time_remaining = self.state.time_remaining,
            "Game over"
        );
        self.sync.publish(ServerMsg::GameOver {
            status: next,
            message: self.state.winner_message.clone(),
        });
    }

    fn reset(&mut self) {
        self.timer.stop();
        self.state = GameState::new(self.config.round_duration_secs);
        info!(room_id = %self.id, "Room empty, game reset");
    }

    fn publish_state(&mut self) {
        if let Some(msg) = self.snapshots.build_if_changed(&self.state) {
            self.sync.publish(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::win::{HUMANS_WIN_MESSAGE, ZOMBIES_WIN_MESSAGE};
    use std::sync::{Arc, Mutex};

    /// Records everything the room publishes
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ServerMsg>>>);

    impl SyncChannel for Recorder {
        fn publish(&self, msg: ServerMsg) {
            self.0.lock().unwrap().push(msg);
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<ServerMsg> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }

        fn game_overs(&self) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|m| matches!(m, ServerMsg::GameOver { .. }))
                .count()
        }
    }

    fn room() -> (GameRoom<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let config = RoomConfig {
            seed: Some(1234),
            ..RoomConfig::default()
        };
        (GameRoom::new(config, recorder.clone()), recorder)
    }

    /// Two players parked in opposite corners, out of infection range
    fn two_player_room() -> (GameRoom<Recorder>, Recorder, Uuid, Uuid) {
        let (mut room, recorder) = room();
        let human = Uuid::new_v4();
        let zombie = Uuid::new_v4();
        room.on_join(human).unwrap();
        room.on_join(zombie).unwrap();
        room.on_move(human, 5.0, 4.0);
        room.on_move(zombie, -5.0, -4.0);
        recorder.take();
        (room, recorder, human, zombie)
    }

    #[tokio::test]
    async fn test_first_joiner_is_human_rest_are_zombies() {
        let (mut room, _) = room();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let teams: Vec<Team> = ids.iter().map(|id| room.on_join(*id).unwrap()).collect();
        assert_eq!(teams, vec![Team::Human, Team::Zombie, Team::Zombie, Team::Zombie]);

        for id in &ids {
            let player = &room.state().players[id];
            assert!(SpawnArea::for_team(player.team).contains(player.x, player.z));
        }
    }

    #[tokio::test]
    async fn test_timer_starts_with_second_player() {
        let (mut room, recorder) = room();
        room.on_join(Uuid::new_v4()).unwrap();
        assert!(!room.is_timer_running());
        assert_eq!(room.state().time_remaining, 300);
        assert_eq!(room.state().game_status, GameStatus::Playing);

        room.on_join(Uuid::new_v4()).unwrap();
        assert!(room.is_timer_running());
        assert!(recorder
            .take()
            .iter()
            .any(|m| matches!(m, ServerMsg::TimerStarted { time_remaining: 300 })));
    }

    #[tokio::test]
    async fn test_duplicate_join_and_full_room_are_refused() {
        let recorder = Recorder::default();
        let config = RoomConfig {
            max_players: 2,
            seed: Some(9),
            ..RoomConfig::default()
        };
        let mut room = GameRoom::new(config, recorder);

        let a = Uuid::new_v4();
        room.on_join(a).unwrap();
        assert_eq!(room.on_join(a), Err(RoomError::AlreadyJoined));
        room.on_join(Uuid::new_v4()).unwrap();
        assert_eq!(room.on_join(Uuid::new_v4()), Err(RoomError::RoomFull));
        assert_eq!(room.state().players.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sessions_are_ignored() {
        let (mut room, recorder, _, _) = two_player_room();
        assert!(!room.on_move(Uuid::new_v4(), 0.0, 0.0));
        assert!(!room.on_leave(Uuid::new_v4()));
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_move_is_applied_verbatim() {
        let (mut room, _, human, _) = two_player_room();
        assert!(room.on_move(human, 42.0, -17.5));
        let player = &room.state().players[&human];
        assert_eq!((player.x, player.z), (42.0, -17.5));
    }

    #[tokio::test]
    async fn test_move_into_range_ends_game_for_zombies() {
        let (mut room, recorder, human, zombie) = two_player_room();
        assert!(room.is_timer_running());

        room.on_move(human, 2.0, 0.0);
        assert_eq!(room.state().game_status, GameStatus::Playing);
        room.on_move(zombie, -1.0, 0.0);

        let state = room.state();
        assert_eq!(state.players[&human].team, Team::Zombie);
        assert_eq!(state.human_count(), 0);
        assert_eq!(state.game_status, GameStatus::ZombiesWin);
        assert_eq!(state.winner_message, ZOMBIES_WIN_MESSAGE);
        assert!(!room.is_timer_running());

        let sent = recorder.take();
        assert!(sent.contains(&ServerMsg::Infected {
            session_ids: vec![human]
        }));
        let game_over = ServerMsg::GameOver {
            status: GameStatus::ZombiesWin,
            message: ZOMBIES_WIN_MESSAGE.to_string(),
        };
        assert_eq!(sent.iter().filter(|m| **m == game_over).count(), 1);
    }

    #[tokio::test]
    async fn test_tick_catches_stationary_overlap() {
        let (mut room, _, human, zombie) = two_player_room();
        // Place both without going through on_move
        room.state.players.get_mut(&human).unwrap().x = 1.0;
        room.state.players.get_mut(&zombie).unwrap().x = -1.0;
        room.state.players.get_mut(&human).unwrap().z = 0.0;
        room.state.players.get_mut(&zombie).unwrap().z = 0.0;

        room.tick();
        assert_eq!(room.state().game_status, GameStatus::ZombiesWin);
    }

    #[tokio::test]
    async fn test_tick_without_changes_publishes_nothing() {
        let (mut room, recorder, _, _) = two_player_room();
        room.tick();
        room.tick();
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_game_over_is_broadcast_once() {
        let (mut room, recorder, human, zombie) = two_player_room();
        room.on_move(human, 0.0, 0.0);
        room.on_move(zombie, 0.5, 0.0);
        for _ in 0..10 {
            room.tick();
            room.on_move(zombie, 1.0, 1.0);
        }
        assert_eq!(recorder.game_overs(), 1);
    }

    #[tokio::test]
    async fn test_countdown_to_zero_means_humans_win() {
        let (mut room, recorder, _, _) = two_player_room();
        for _ in 0..299 {
            room.on_timer_second();
        }
        assert_eq!(room.state().time_remaining, 1);
        assert_eq!(room.state().game_status, GameStatus::Playing);

        room.on_timer_second();
        let state = room.state();
        assert_eq!(state.time_remaining, 0);
        assert_eq!(state.game_status, GameStatus::HumansWin);
        assert_eq!(state.winner_message, HUMANS_WIN_MESSAGE);
        assert!(!room.is_timer_running());

        // Stopped timer ignores stray callbacks
        room.on_timer_second();
        assert_eq!(room.state().time_remaining, 0);
        assert_eq!(recorder.game_overs(), 1);
    }

    #[tokio::test]
    async fn test_countdown_needs_running_timer() {
        let (mut room, _) = room();
        room.on_join(Uuid::new_v4()).unwrap();
        room.on_timer_second();
        assert_eq!(room.state().time_remaining, 300);
    }

    #[tokio::test]
    async fn test_human_leaving_hands_win_to_zombies() {
        let (mut room, _, human, zombie) = two_player_room();
        room.on_leave(human);
        assert_eq!(room.state().game_status, GameStatus::ZombiesWin);
        assert_eq!(room.state().players[&zombie].team, Team::Zombie);
    }

    #[tokio::test]
    async fn test_last_leave_resets_finished_game() {
        let (mut room, _, human, zombie) = two_player_room();
        room.on_move(human, 0.0, 0.0);
        room.on_move(zombie, 0.0, 1.0);
        for _ in 0..5 {
            room.on_timer_second();
        }
        assert_eq!(room.state().game_status, GameStatus::ZombiesWin);

        room.on_leave(human);
        room.on_leave(zombie);

        let state = room.state();
        assert!(state.players.is_empty());
        assert_eq!(state.time_remaining, 300);
        assert_eq!(state.game_status, GameStatus::Playing);
        assert!(state.winner_message.is_empty());
        assert!(!room.is_timer_running());

        // Fresh game: first joiner is human again
        assert_eq!(room.on_join(Uuid::new_v4()), Ok(Team::Human));
    }

    #[tokio::test]
    async fn test_leave_keeps_surviving_teams() {
        let (mut room, _, human, zombie) = two_player_room();
        let third = Uuid::new_v4();
        room.on_join(third).unwrap();
        room.on_move(third, -5.0, 4.0);

        room.on_leave(zombie);
        assert_eq!(room.state().players[&human].team, Team::Human);
        assert_eq!(room.state().players[&third].team, Team::Zombie);
        assert_eq!(room.state().game_status, GameStatus::Playing);
        assert!(room.is_timer_running());
    }

    #[tokio::test]
    async fn test_state_published_after_each_mutation() {
        let (mut room, recorder, human, _) = two_player_room();
        room.on_move(human, 4.0, 3.0);
        let sent = recorder.take();
        match sent.last() {
            Some(ServerMsg::State { players, .. }) => {
                let me = players.iter().find(|p| p.session_id == human).unwrap();
                assert_eq!((me.x, me.z), (4.0, 3.0));
            }
            other => panic!("expected state, got {:?}", other),
        }
    }
}
