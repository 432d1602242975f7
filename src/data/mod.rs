pub mod missions;

pub use missions::{
    load_mission_catalog, parse_mission_catalog, DataError, MissionCatalog, MissionGoal,
    MissionOrigin, MissionTypeDefinition,
};
