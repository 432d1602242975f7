use std::fs;
use std::path::Path;

use bevy_utils::tracing::warn;
use serde::{Deserialize, Serialize};

use crate::components::world::{FactionId, MissionId, NpcId, PlayerId, Tripoint};
use crate::simulation::directory::MissionDirectory;
use crate::simulation::mission::{Mission, MissionError, MissionReward, MissionStatus};
use crate::simulation::mission_type::{MissionTypeId, MissionTypeRegistry};

pub const SAVE_VERSION: u32 = 1;

/// Save state for the mission directory. Archetypes are referenced by id, never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSaveState {
    #[serde(default = "default_save_version")]
    pub version: u32,
    /// Highest mission id ever allocated.
    pub next_id: u32,
    /// Game turn the save was taken on; zero when the caller keeps no clock.
    #[serde(default)]
    pub turn: u64,
    pub missions: Vec<MissionRecord>,
}

fn default_save_version() -> u32 {
    SAVE_VERSION
}

/// Full mutable state of one mission instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub uid: MissionId,
    pub type_id: MissionTypeId,
    pub status: MissionStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub reward: MissionReward,
    #[serde(default)]
    pub target: Option<Tripoint>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default = "default_item_count")]
    pub item_count: u32,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub recruit_class: Option<String>,
    #[serde(default)]
    pub target_npc_id: Option<NpcId>,
    #[serde(default)]
    pub monster_type: Option<String>,
    #[serde(default)]
    pub monster_kill_goal: Option<u32>,
    #[serde(default)]
    pub deadline: Option<u64>,
    #[serde(default)]
    pub npc_id: Option<NpcId>,
    #[serde(default)]
    pub good_faction: Option<FactionId>,
    #[serde(default)]
    pub bad_faction: Option<FactionId>,
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub follow_up: Option<MissionTypeId>,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub offered_at: Option<Tripoint>,
}

fn default_item_count() -> u32 {
    1
}

impl From<&Mission> for MissionRecord {
    fn from(mission: &Mission) -> Self {
        Self {
            uid: mission.uid,
            type_id: mission.mission_type.id.clone(),
            status: mission.status,
            description: mission.description.clone(),
            value: mission.value,
            reward: mission.reward.clone(),
            target: mission.target,
            item_id: mission.item_id.clone(),
            item_count: mission.item_count,
            target_id: mission.target_id.clone(),
            recruit_class: mission.recruit_class.clone(),
            target_npc_id: mission.target_npc_id,
            monster_type: mission.monster_type.clone(),
            monster_kill_goal: mission.monster_kill_goal,
            deadline: mission.deadline,
            npc_id: mission.npc_id,
            good_faction: mission.good_fac_id,
            bad_faction: mission.bad_fac_id,
            step: mission.step,
            follow_up: mission.follow_up.clone(),
            player_id: mission.player_id,
            offered_at: mission.offered_at,
        }
    }
}

impl MissionRecord {
    /// Rebinds the record to its archetype. Fails when the archetype is no longer loaded.
    pub fn into_mission(self, registry: &MissionTypeRegistry) -> Result<Mission, MissionError> {
        let mission_type = registry
            .get(&self.type_id)
            .filter(|mission_type| !mission_type.id.is_null())
            .ok_or_else(|| MissionError::UnknownType(self.type_id.clone()))?;
        let mut mission = mission_type.instantiate(self.uid, self.npc_id);
        mission.status = self.status;
        mission.description = self.description;
        mission.value = self.value;
        mission.reward = self.reward;
        mission.target = self.target;
        mission.item_id = self.item_id;
        mission.item_count = self.item_count;
        mission.target_id = self.target_id;
        mission.recruit_class = self.recruit_class;
        mission.target_npc_id = self.target_npc_id;
        mission.monster_type = self.monster_type;
        mission.monster_kill_goal = self.monster_kill_goal;
        mission.deadline = self.deadline;
        mission.good_fac_id = self.good_faction;
        mission.bad_fac_id = self.bad_faction;
        mission.step = self.step;
        mission.set_follow_up(self.follow_up);
        mission.player_id = self.player_id;
        mission.offered_at = self.offered_at;
        Ok(mission)
    }
}

/// Extract a serializable snapshot of the directory.
pub fn extract_mission_state(directory: &MissionDirectory) -> MissionSaveState {
    MissionSaveState {
        version: SAVE_VERSION,
        next_id: directory.next_id(),
        turn: 0,
        missions: directory.missions().map(MissionRecord::from).collect(),
    }
}

/// Apply a saved snapshot back into the directory, replacing what it held.
/// Records whose archetype is gone are dropped with a warning.
pub fn apply_mission_state(
    state: MissionSaveState,
    directory: &mut MissionDirectory,
    registry: &MissionTypeRegistry,
) -> usize {
    if state.version > SAVE_VERSION {
        warn!(
            version = state.version,
            supported = SAVE_VERSION,
            "mission save is newer than this build"
        );
    }
    directory.clear_all();
    let mut restored = 0;
    for record in state.missions {
        let uid = record.uid;
        match record.into_mission(registry) {
            Ok(mission) => {
                directory.add_existing(mission);
                restored += 1;
            }
            Err(err) => warn!(uid = uid.0, "dropping saved mission: {}", err),
        }
    }
    // Keep ids of dropped records reserved too.
    directory.bump_to_at_least(state.next_id);
    restored
}

/// Serialize a save state into JSON for persistence.
pub fn save_state_to_json(state: &MissionSaveState) -> serde_json::Result<String> {
    serde_json::to_string_pretty(state)
}

/// Deserialize JSON back into a save state.
pub fn load_state_from_json(data: &str) -> serde_json::Result<MissionSaveState> {
    serde_json::from_str(data)
}

/// Write a save state to a file path.
pub fn save_state_to_path<P: AsRef<Path>>(state: &MissionSaveState, path: P) -> std::io::Result<()> {
    let json = save_state_to_json(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)
}

/// Read a save state from a file path.
pub fn load_state_from_path<P: AsRef<Path>>(path: P) -> std::io::Result<MissionSaveState> {
    let data = fs::read_to_string(&path)?;
    load_state_from_json(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
