//! Game simulation modules

pub mod collision;
pub mod player;
pub mod room;
pub mod runner;
pub mod snapshot;
pub mod timer;
pub mod win;

pub use runner::{spawn_room, RoomHandle};
pub use win::GameStatus;
