pub mod behavior;
pub mod directory;
pub mod legacy;
pub mod mission;
pub mod mission_type;
pub mod mission_world;
pub mod sandbox;
pub mod time;

pub use behavior::{BehaviorTuning, EndBehavior, FailBehavior, PlaceBehavior, StartBehavior};
pub use directory::{MissionDirectory, MissionTransition};
pub use legacy::{LegacyError, LegacyReport};
pub use mission::{Mission, MissionError, MissionReward, MissionStatus, RewardKind};
pub use mission_type::{
    ConsistencyError, ConsistencyProblem, DefinitionError, LoadReport, MissionType,
    MissionTypeId, MissionTypeRegistry, MISSION_NULL,
};
pub use mission_world::{MissionWorld, NpcAttitude};
pub use sandbox::SandboxWorld;
pub use time::GameTime;
