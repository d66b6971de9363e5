//! Room task: serializes inputs, the collision tick and the countdown

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::ws::protocol::ServerMsg;

use super::player::Team;
use super::room::{GameRoom, RoomError, SyncChannel};
use super::win::GameStatus;

/// Inputs delivered to the room task
#[derive(Debug)]
pub enum RoomInput {
    Join {
        session_id: Uuid,
        reply: oneshot::Sender<Result<Team, RoomError>>,
    },
    Leave {
        session_id: Uuid,
    },
    Move {
        session_id: Uuid,
        x: f32,
        z: f32,
    },
}

/// Latest room figures, for health checks
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSummary {
    pub players: usize,
    pub time_remaining: u32,
    pub game_status: GameStatus,
    pub timer_running: bool,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    input_tx: mpsc::Sender<RoomInput>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    summary_rx: watch::Receiver<RoomSummary>,
}

impl RoomHandle {
    /// Join the room, returning the assigned team
    pub async fn join(&self, session_id: Uuid) -> Result<Team, RoomError> {
        let (reply, reply_rx) = oneshot::channel();
        self.input_tx
            .send(RoomInput::Join { session_id, reply })
            .await
            .map_err(|_| RoomError::RoomClosed)?;
        reply_rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn leave(&self, session_id: Uuid) -> Result<(), RoomError> {
        self.input_tx
            .send(RoomInput::Leave { session_id })
            .await
            .map_err(|_| RoomError::RoomClosed)
    }

    pub async fn move_to(&self, session_id: Uuid, x: f32, z: f32) -> Result<(), RoomError> {
        self.input_tx
            .send(RoomInput::Move { session_id, x, z })
            .await
            .map_err(|_| RoomError::RoomClosed)
    }

    /// Receive everything the room broadcasts from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary_rx.borrow().clone()
    }
}

/// Owns a `GameRoom` and drives it from a single task
pub struct RoomRunner {
    room: GameRoom<broadcast::Sender<ServerMsg>>,
    input_rx: mpsc::Receiver<RoomInput>,
    summary_tx: watch::Sender<RoomSummary>,
    config: RoomConfig,
}

impl RoomRunner {
    pub fn new(config: RoomConfig) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(256);

        let room = GameRoom::new(config.clone(), broadcast_tx.clone());
        let (summary_tx, summary_rx) = watch::channel(summarize(&room));

        let handle = RoomHandle {
            id: room.id(),
            input_tx,
            broadcast_tx,
            summary_rx,
        };

        let runner = Self {
            room,
            input_rx,
            summary_tx,
            config,
        };

        (runner, handle)
    }

    /// Run until every `RoomHandle` is dropped
    pub async fn run(mut self) {
        let room_id = self.room.id();
        info!(room_id = %room_id, "Room loop started");

        let mut collision_tick = interval(self.config.collision_tick);
        collision_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                input = self.input_rx.recv() => {
                    let Some(input) = input else { break };
                    self.guarded("input", |room| dispatch(room, input));
                }
                _ = collision_tick.tick() => {
                    self.guarded("collision_tick", |room| room.tick());
                }
                _ = self.room.timer_mut().next_second() => {
                    self.guarded("countdown", |room| room.on_timer_second());
                }
            }

            let summary = summarize(&self.room);
            self.summary_tx.send_if_modified(|current| {
                if *current == summary {
                    false
                } else {
                    *current = summary;
                    true
                }
            });
        }

        // Cancel the countdown before the room is dropped
        self.room.timer_mut().stop();
        info!(room_id = %room_id, "Room loop stopped");
    }

    /// Run one room callback. A panic is logged and the loop keeps its schedule.
    fn guarded<F>(&mut self, callback: &'static str, f: F)
    where
        F: FnOnce(&mut GameRoom<broadcast::Sender<ServerMsg>>),
    {
        let room = &mut self.room;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(room))) {
            error!(
                room_id = %self.room.id(),
                callback,
                panic = panic_message(payload.as_ref()),
                "Room callback panicked"
            );
        }
    }
}

/// Spawn a room task
pub fn spawn_room(config: RoomConfig) -> (RoomHandle, JoinHandle<()>) {
    let (runner, handle) = RoomRunner::new(config);
    let task = tokio::spawn(runner.run());
    (handle, task)
}

fn dispatch<S: SyncChannel>(room: &mut GameRoom<S>, input: RoomInput) {
    match input {
        RoomInput::Join { session_id, reply } => {
            // Requester may have disconnected already
            let _ = reply.send(room.on_join(session_id));
        }
        RoomInput::Leave { session_id } => {
            room.on_leave(session_id);
        }
        RoomInput::Move { session_id, x, z } => {
            room.on_move(session_id, x, z);
        }
    }
}

fn summarize<S: SyncChannel>(room: &GameRoom<S>) -> RoomSummary {
    let state = room.state();
    RoomSummary {
        players: state.players.len(),
        time_remaining: state.time_remaining,
        game_status: state.game_status,
        timer_running: room.is_timer_running(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
