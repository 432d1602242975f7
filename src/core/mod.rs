pub mod ecs;
pub mod serialization;
pub mod settings;
pub mod world;

pub use ecs::{create_schedule, create_world, MissionEventLog, TickSet};
pub use serialization::{MissionRecord, MissionSaveState};
pub use settings::{EngineSettings, SettingsError};
pub use world::{MissionSession, MissionSummary, Snapshot};
