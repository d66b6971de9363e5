//! Player records and spawn rules

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::PlayerSnapshot;

/// Half the side length of the square ground plane
pub const ARENA_HALF_EXTENT: f32 = 5.0;

/// Which side a player is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Human,
    Zombie,
}

impl Team {
    /// First player into an empty room is human, everyone after is a zombie
    pub fn for_joiner(players_already_present: usize) -> Self {
        if players_already_present == 0 {
            Self::Human
        } else {
            Self::Zombie
        }
    }
}

/// Rectangle on the ground plane where a team spawns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnArea {
    pub x_min: f32,
    pub x_max: f32,
    pub z_min: f32,
    pub z_max: f32,
}

impl SpawnArea {
    /// Humans start on the +x half, zombies on the -x half
    pub fn for_team(team: Team) -> Self {
        match team {
            Team::Human => Self {
                x_min: 1.0,
                x_max: ARENA_HALF_EXTENT,
                z_min: -(ARENA_HALF_EXTENT - 1.0),
                z_max: ARENA_HALF_EXTENT - 1.0,
            },
            Team::Zombie => Self {
                x_min: -ARENA_HALF_EXTENT,
                x_max: -1.0,
                z_min: -(ARENA_HALF_EXTENT - 1.0),
                z_max: ARENA_HALF_EXTENT - 1.0,
            },
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> (f32, f32) {
        let x = rng.gen_range(self.x_min..=self.x_max);
        let z = rng.gen_range(self.z_min..=self.z_max);
        (x, z)
    }

    pub fn contains(&self, x: f32, z: f32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.z_min..=self.z_max).contains(&z)
    }
}

/// Player state in a room (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub session_id: Uuid,
    pub x: f32,
    pub z: f32,
    pub team: Team,
    /// Position in the room's join order; collision passes iterate by this
    pub join_seq: u64,
}

impl PlayerRecord {
    pub fn new(session_id: Uuid, team: Team, x: f32, z: f32, join_seq: u64) -> Self {
        Self {
            session_id,
            x,
            z,
            team,
            join_seq,
        }
    }

    pub fn is_human(&self) -> bool {
        self.team == Team::Human
    }

    pub fn is_zombie(&self) -> bool {
        self.team == Team::Zombie
    }

    /// Turn a human into a zombie. Returns false if already a zombie.
    pub fn infect(&mut self) -> bool {
        if self.is_zombie() {
            return false;
        }
        self.team = Team::Zombie;
        true
    }

    pub fn distance_to(&self, other: &PlayerRecord) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            session_id: self.session_id,
            x: self.x,
            z: self.z,
            team: self.team,
        }
    }
}
