pub mod world;

pub use world::{Creature, FactionId, MissionId, MonsterId, NpcId, PlayerId, Tripoint};
