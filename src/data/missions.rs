use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MISSIONS_PATH: &str = "./assets/data/missions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionCatalog {
    pub schema_version: u32,
    pub missions: Vec<MissionTypeDefinition>,
}

/// One archetype record as it arrives from content files. Behaviors are referenced by name
/// and resolved against the compiled catalog when the registry loads the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionTypeDefinition {
    pub id: String,
    pub name: String,
    pub goal: MissionGoal,
    #[serde(default)]
    pub difficulty: i32,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub deadline_low: u64,
    #[serde(default)]
    pub deadline_high: u64,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub origins: Vec<MissionOrigin>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default = "default_item_count")]
    pub item_count: u32,
    #[serde(default)]
    pub target_npc_id: Option<i32>,
    #[serde(default)]
    pub monster_type: Option<String>,
    #[serde(default)]
    pub monster_kill_goal: Option<u32>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub recruit_class: Option<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub dialogue: BTreeMap<String, String>,
}

fn default_item_count() -> u32 {
    1
}

impl MissionTypeDefinition {
    /// Minimal record with every optional field empty; mostly useful for building content in code.
    pub fn new(id: impl Into<String>, name: impl Into<String>, goal: MissionGoal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal,
            difficulty: 0,
            value: 0,
            deadline_low: 0,
            deadline_high: 0,
            urgent: false,
            origins: Vec::new(),
            item_id: None,
            item_count: default_item_count(),
            target_npc_id: None,
            monster_type: None,
            monster_kill_goal: None,
            target_id: None,
            recruit_class: None,
            follow_up: None,
            place: None,
            start: None,
            end: None,
            fail: None,
            dialogue: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionGoal {
    Null,
    /// Reach a specific overmap tile.
    GoTo,
    /// Reach any tile of a terrain type, e.g. "hospital_entrance".
    GoToType,
    FindItem,
    /// Find an item tagged with this mission.
    FindAnyItem,
    /// Find and retrieve a friendly monster.
    FindMonster,
    FindNpc,
    Assassinate,
    KillMonster,
    KillMonsterType,
    RecruitNpc,
    RecruitNpcClass,
    ComputerToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionOrigin {
    GameStart,
    /// NPC comes up to the player when the game starts.
    OpenerNpc,
    AnyNpc,
    /// Given at the end of another mission.
    Secondary,
}

impl MissionOrigin {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "game_start" | "start" => Some(MissionOrigin::GameStart),
            "opener_npc" | "opener" => Some(MissionOrigin::OpenerNpc),
            "any_npc" | "npc" => Some(MissionOrigin::AnyNpc),
            "secondary" => Some(MissionOrigin::Secondary),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_mission_catalog(path: impl AsRef<Path>) -> Result<MissionCatalog, DataError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_mission_catalog(&raw, &path.display().to_string())
}

pub fn parse_mission_catalog(raw: &str, origin: &str) -> Result<MissionCatalog, DataError> {
    serde_json::from_str(raw).map_err(|source| DataError::Json {
        path: origin.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let raw = r#"{
            "schema_version": 1,
            "missions": [
                { "id": "MISSION_REACH_SAFETY", "name": "Reach Safety", "goal": "GO_TO_TYPE",
                  "origins": ["GAME_START"], "target_id": "shelter" }
            ]
        }"#;
        let catalog = parse_mission_catalog(raw, "inline").expect("catalog parses");
        let def = &catalog.missions[0];
        assert_eq!(def.goal, MissionGoal::GoToType);
        assert_eq!(def.item_count, 1);
        assert_eq!(def.origins, vec![MissionOrigin::GameStart]);
        assert!(def.start.is_none());
        assert!(def.dialogue.is_empty());
    }

    #[test]
    fn unknown_goal_is_a_parse_error() {
        let raw = r#"{ "schema_version": 1, "missions": [ { "id": "X", "name": "X", "goal": "DANCE" } ] }"#;
        let err = parse_mission_catalog(raw, "inline").unwrap_err();
        assert!(matches!(err, DataError::Json { .. }));
    }

    #[test]
    fn origin_names_parse_loosely() {
        assert_eq!(MissionOrigin::parse("ANY_NPC"), Some(MissionOrigin::AnyNpc));
        assert_eq!(MissionOrigin::parse("start"), Some(MissionOrigin::GameStart));
        assert_eq!(MissionOrigin::parse("nowhere"), None);
    }
}
