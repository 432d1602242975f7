use std::fmt;

use serde::{Deserialize, Serialize};

/// Global overmap terrain coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tripoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Tripoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev distance on the same z-level; other levels are never "near".
    pub fn square_dist(&self, other: &Tripoint) -> Option<i32> {
        if self.z != other.z {
            return None;
        }
        Some((self.x - other.x).abs().max((self.y - other.y).abs()))
    }

    pub fn within(&self, other: &Tripoint, radius: i32) -> bool {
        self.square_dist(other).map_or(false, |dist| dist <= radius)
    }
}

impl fmt::Display for Tripoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Id of a player character (mission holder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i32);

/// Id of an NPC owned by the NPC collaborator. May outlive or be outlived by missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(pub i32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonsterId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionId(pub i32);

/// Unique mission instance id, stable across save/load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(pub u32);

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A creature that just died, as reported by the combat collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creature {
    Npc {
        id: NpcId,
    },
    Monster {
        id: MonsterId,
        monster_type: String,
        /// Set when the monster was spawned for a mission.
        mission: Option<MissionId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_on_other_levels_are_never_near() {
        let a = Tripoint::new(0, 0, 0);
        let b = Tripoint::new(0, 0, -1);
        assert!(!a.within(&b, 100));
        assert!(a.within(&Tripoint::new(3, -2, 0), 3));
        assert!(!a.within(&Tripoint::new(4, 0, 0), 3));
    }
}
