pub mod repository;
pub mod sqlite;

pub use repository::MissionRepository;
pub use sqlite::{MissionDb, MissionDbError};
