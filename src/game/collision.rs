//! Proximity infection between zombies and humans

use uuid::Uuid;

use super::player::PlayerRecord;

/// Default infection distance in ground-plane units
pub const INFECTION_RADIUS: f32 = 5.0;

/// Collision system for zombie/human proximity
pub struct CollisionEngine;

impl CollisionEngine {
    /// Compute which humans become zombies this pass.
    ///
    /// Zombies and humans are each visited in join order. A human infected
    /// during the pass is appended to the zombie list and can infect further
    /// humans in the same pass, so chains resolve within one tick. Distance
    /// must be strictly below `radius`.
    ///
    /// Returns the newly infected session ids in infection order. Does not
    /// modify `players`.
    pub fn evaluate<'a, I>(players: I, radius: f32) -> Vec<Uuid>
    where
        I: IntoIterator<Item = &'a PlayerRecord>,
    {
        let mut ordered: Vec<&PlayerRecord> = players.into_iter().collect();
        if ordered.len() < 2 {
            return Vec::new();
        }
        ordered.sort_by_key(|p| p.join_seq);

        let (mut zombies, mut humans): (Vec<&PlayerRecord>, Vec<&PlayerRecord>) =
            ordered.into_iter().partition(|p| p.is_zombie());
        if zombies.is_empty() || humans.is_empty() {
            return Vec::new();
        }

        let mut infected = Vec::new();
        let mut next = 0;
        while next < zombies.len() && !humans.is_empty() {
            let zombie = zombies[next];
            next += 1;

            let mut idx = 0;
            while idx < humans.len() {
                if zombie.distance_to(humans[idx]) < radius {
                    let human = humans.remove(idx);
                    infected.push(human.session_id);
                    zombies.push(human);
                } else {
                    idx += 1;
                }
            }
        }

        infected
    }
}
