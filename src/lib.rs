// Re-export core modules for use by the binary or other consumers
pub mod components;
pub mod core;
pub mod data;
pub mod simulation;
pub mod world;

// Expose the session wrapper and the types needed to drive it
pub use crate::core::serialization::MissionSaveState;
pub use crate::core::settings::EngineSettings;
pub use crate::core::world::{MissionSession, MissionSummary, Snapshot};
