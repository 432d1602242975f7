use std::fmt;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::simulation::sandbox::SandboxWorld;

pub const TURNS_PER_HOUR: u64 = 60;

/// Global resource tracking the game clock. One schedule run is one turn.
#[derive(Resource, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameTime {
    pub turn: u64,
    pub day: u32,
    pub hour: u8,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            turn: 0,
            day: 1,
            hour: 8,
        }
    }
}

impl fmt::Display for GameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Day {}, {:02}:{:02} (turn {})",
            self.day,
            self.hour,
            self.turn % TURNS_PER_HOUR,
            self.turn
        )
    }
}

impl GameTime {
    pub fn advance(&mut self) {
        self.turn += 1;
        if self.turn % TURNS_PER_HOUR != 0 {
            return;
        }
        self.hour += 1;
        if self.hour >= 24 {
            self.hour = 0;
            self.day += 1;
        }
    }

    /// Rebuilds day and hour from a bare turn count (used after loading a save).
    pub fn at_turn(turn: u64) -> Self {
        let mut time = Self::default();
        let hours = turn / TURNS_PER_HOUR + u64::from(time.hour);
        time.turn = turn;
        time.hour = (hours % 24) as u8;
        time.day = 1 + (hours / 24) as u32;
        time
    }
}

/// System: advances the clock and keeps the sandbox collaborator on the same turn.
pub fn advance_time_system(mut time: ResMut<GameTime>, world: Option<ResMut<SandboxWorld>>) {
    time.advance();
    if let Some(mut world) = world {
        world.set_turn(time.turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_roll_over_into_days() {
        let mut time = GameTime::default();
        for _ in 0..(16 * TURNS_PER_HOUR) {
            time.advance();
        }
        assert_eq!(time.day, 2);
        assert_eq!(time.hour, 0);
        assert_eq!(time, GameTime::at_turn(16 * TURNS_PER_HOUR));
    }
}
