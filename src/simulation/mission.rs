use std::fmt;
use std::sync::Arc;

use bevy_utils::tracing::{info, warn};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::world::{FactionId, MissionId, NpcId, PlayerId, Tripoint};
use crate::data::missions::MissionGoal;
use crate::simulation::behavior::{BehaviorTuning, StartOutcome};
use crate::simulation::mission_type::{MissionType, MissionTypeId};
use crate::simulation::mission_world::MissionWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    YetToStart,
    InProgress,
    Success,
    Failure,
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(status_to_string(*self))
    }
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Success | MissionStatus::Failure)
    }
}

pub fn status_to_string(status: MissionStatus) -> &'static str {
    match status {
        MissionStatus::YetToStart => "yet_to_start",
        MissionStatus::InProgress => "in_progress",
        MissionStatus::Success => "success",
        MissionStatus::Failure => "failure",
    }
}

pub fn status_from_string(value: &str) -> Option<MissionStatus> {
    match value {
        "yet_to_start" => Some(MissionStatus::YetToStart),
        "in_progress" => Some(MissionStatus::InProgress),
        "success" => Some(MissionStatus::Success),
        "failure" => Some(MissionStatus::Failure),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    #[default]
    None,
    Cash,
    Item,
    Skill,
}

/// Special favor an npc owes on completion, on top of the mission value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionReward {
    #[serde(default)]
    pub kind: RewardKind,
    #[serde(default)]
    pub amount: i32,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
}

/// Misuse of the mission api. Distinct from world-side absence, which is ordinary game input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissionError {
    #[error("mission {uid} is already assigned to player {holder}")]
    AlreadyAssigned { uid: MissionId, holder: PlayerId },
    #[error("mission {uid} cannot {action} while {status}")]
    InvalidState {
        uid: MissionId,
        status: MissionStatus,
        action: &'static str,
    },
    #[error("mission {uid} is not offered at {at}")]
    PlacementRejected { uid: MissionId, at: Tripoint },
    #[error("no mission with id {0}")]
    UnknownMission(MissionId),
    #[error("unknown mission type {0}")]
    UnknownType(MissionTypeId),
    #[error("mission ids are exhausted")]
    IdsExhausted,
}

/// One accepted (or offered) mission. The archetype is shared and read-only; every goal
/// parameter is copied so start routines can specialise it.
#[derive(Debug, Clone)]
pub struct Mission {
    pub(crate) mission_type: Arc<MissionType>,
    pub(crate) description: String,
    pub(crate) status: MissionStatus,
    pub(crate) value: u64,
    pub(crate) reward: MissionReward,
    pub(crate) uid: MissionId,
    pub(crate) target: Option<Tripoint>,
    pub(crate) item_id: Option<String>,
    pub(crate) item_count: u32,
    pub(crate) target_id: Option<String>,
    pub(crate) recruit_class: Option<String>,
    pub(crate) target_npc_id: Option<NpcId>,
    pub(crate) monster_type: Option<String>,
    pub(crate) monster_kill_goal: Option<u32>,
    pub(crate) deadline: Option<u64>,
    pub(crate) npc_id: Option<NpcId>,
    pub(crate) good_fac_id: Option<FactionId>,
    pub(crate) bad_fac_id: Option<FactionId>,
    pub(crate) step: u32,
    pub(crate) follow_up: Option<MissionTypeId>,
    pub(crate) player_id: Option<PlayerId>,
    /// Where a randomly offered mission was offered; placement is re-checked there on assign.
    pub(crate) offered_at: Option<Tripoint>,
}

impl Mission {
    pub fn new(mission_type: Arc<MissionType>, uid: MissionId, npc_id: Option<NpcId>) -> Self {
        Self {
            description: String::new(),
            status: MissionStatus::YetToStart,
            value: mission_type.value,
            reward: MissionReward::default(),
            uid,
            target: None,
            item_id: mission_type.item_id.clone(),
            item_count: mission_type.item_count,
            target_id: mission_type.target_id.clone(),
            recruit_class: mission_type.recruit_class.clone(),
            target_npc_id: mission_type.target_npc_id,
            monster_type: mission_type.monster_type.clone(),
            monster_kill_goal: mission_type.monster_kill_goal,
            deadline: None,
            npc_id,
            good_fac_id: None,
            bad_fac_id: None,
            step: 0,
            follow_up: mission_type.follow_up.clone(),
            player_id: None,
            offered_at: None,
            mission_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.mission_type.name
    }

    pub fn get_type(&self) -> &MissionType {
        &self.mission_type
    }

    pub fn goal(&self) -> MissionGoal {
        self.mission_type.goal
    }

    pub fn status(&self) -> MissionStatus {
        self.status
    }

    pub fn get_id(&self) -> MissionId {
        self.uid
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn get_target(&self) -> Option<Tripoint> {
        self.target
    }

    pub fn set_target(&mut self, target: Tripoint) {
        self.target = Some(target);
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn get_deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn has_follow_up(&self) -> bool {
        self.follow_up.is_some()
    }

    pub fn get_follow_up(&self) -> Option<&MissionTypeId> {
        self.follow_up.as_ref()
    }

    /// Start routines may branch a chain by picking a different follow-up.
    pub fn set_follow_up(&mut self, follow_up: Option<MissionTypeId>) {
        self.follow_up = follow_up.filter(|id| !id.is_null());
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_reward(&self) -> &MissionReward {
        &self.reward
    }

    pub fn set_reward(&mut self, reward: MissionReward) {
        self.reward = reward;
    }

    pub fn get_item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn get_item_count(&self) -> u32 {
        self.item_count
    }

    pub fn get_npc_id(&self) -> Option<NpcId> {
        self.npc_id
    }

    pub fn get_target_npc_id(&self) -> Option<NpcId> {
        self.target_npc_id
    }

    pub fn get_monster_type(&self) -> Option<&str> {
        self.monster_type.as_deref()
    }

    pub fn get_monster_kill_goal(&self) -> Option<u32> {
        self.monster_kill_goal
    }

    pub fn get_step(&self) -> u32 {
        self.step
    }

    pub fn set_factions(&mut self, good: Option<FactionId>, bad: Option<FactionId>) {
        self.good_fac_id = good;
        self.bad_fac_id = bad;
    }

    pub fn is_assigned(&self) -> bool {
        self.player_id.is_some()
    }

    pub fn get_assigned_player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn get_offered_at(&self) -> Option<Tripoint> {
        self.offered_at
    }

    pub fn get_factions(&self) -> (Option<FactionId>, Option<FactionId>) {
        (self.good_fac_id, self.bad_fac_id)
    }

    pub fn dialogue_for_topic(&self, topic: &str) -> &str {
        self.mission_type
            .dialogue
            .get(topic)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn has_failed(&self) -> bool {
        self.status == MissionStatus::Failure
    }

    pub fn in_progress(&self) -> bool {
        self.status == MissionStatus::InProgress
    }

    /// Has the holder finished the job promised to `npc`? Succeeded missions always count;
    /// running ones count once their goal is met and they are waiting to be handed in.
    pub fn is_complete(&self, npc: NpcId, world: &dyn MissionWorld) -> bool {
        if self.npc_id != Some(npc) {
            return false;
        }
        match self.status {
            MissionStatus::Success => true,
            MissionStatus::InProgress => self.goal_satisfied(world),
            _ => false,
        }
    }

    pub fn deadline_passed(&self, now: u64) -> bool {
        self.deadline.map_or(false, |deadline| now > deadline)
    }

    /// Binds the holder, rolls the deadline and runs the start routine exactly once.
    /// A start routine that cannot set the mission up sends it straight to failure.
    pub fn assign(
        &mut self,
        player: PlayerId,
        world: &mut dyn MissionWorld,
        rng: &mut dyn RngCore,
        tuning: &BehaviorTuning,
    ) -> Result<MissionStatus, MissionError> {
        if let Some(holder) = self.player_id {
            return Err(MissionError::AlreadyAssigned {
                uid: self.uid,
                holder,
            });
        }
        if self.status != MissionStatus::YetToStart {
            return Err(self.invalid("be assigned"));
        }

        self.player_id = Some(player);
        self.status = MissionStatus::InProgress;
        self.deadline = self.roll_deadline(world.current_turn(), rng);

        let start = self.mission_type.start;
        if let StartOutcome::SetupFailed(reason) = start.initialize(self, world, tuning) {
            warn!(
                uid = self.uid.0,
                mission_type = %self.mission_type.id,
                "mission setup failed: {}",
                reason
            );
            self.fail(world);
        }
        Ok(self.status)
    }

    /// Moves a running mission to failure and runs the fail routine. Terminal missions are
    /// left alone; an offer that was never accepted is retired without the routine.
    pub fn fail(&mut self, world: &mut dyn MissionWorld) -> bool {
        match self.status {
            MissionStatus::Success | MissionStatus::Failure => false,
            MissionStatus::YetToStart => {
                self.status = MissionStatus::Failure;
                true
            }
            MissionStatus::InProgress => {
                self.status = MissionStatus::Failure;
                info!(uid = self.uid.0, mission_type = %self.mission_type.id, "mission failed");
                let fail = self.mission_type.fail;
                fail.apply(self, world);
                true
            }
        }
    }

    /// Completes a running mission: takes the delivered items from the holder, runs the end
    /// routine and returns the follow-up archetype the caller should chain, if any.
    pub fn wrap_up(
        &mut self,
        world: &mut dyn MissionWorld,
    ) -> Result<Option<MissionTypeId>, MissionError> {
        if self.status != MissionStatus::InProgress {
            return Err(self.invalid("be wrapped up"));
        }
        self.status = MissionStatus::Success;

        if let Some(player) = self.player_id {
            match self.goal() {
                MissionGoal::FindItem => {
                    if let Some(item) = self.item_id.as_deref() {
                        world.remove_items(player, item, self.item_count);
                    }
                }
                MissionGoal::FindAnyItem => {
                    world.remove_mission_items(player, self.uid);
                }
                _ => {}
            }
        }

        if let Some(good) = self.good_fac_id {
            world.adjust_faction_standing(good, 1);
        }
        if let Some(bad) = self.bad_fac_id {
            world.adjust_faction_standing(bad, -1);
        }

        info!(uid = self.uid.0, mission_type = %self.mission_type.id, "mission succeeded");
        let end = self.mission_type.end;
        end.apply(self, world);
        Ok(self.follow_up.clone())
    }

    /// Records partial progress. Goals that end with a report to the giver are retargeted at
    /// the giver's current position.
    pub fn step_complete(&mut self, step: u32, world: &dyn MissionWorld) -> bool {
        if self.status != MissionStatus::InProgress {
            return false;
        }
        self.step = self.step.max(step);
        if matches!(
            self.goal(),
            MissionGoal::FindItem
                | MissionGoal::FindAnyItem
                | MissionGoal::FindMonster
                | MissionGoal::Assassinate
                | MissionGoal::KillMonster
        ) {
            if let Some(giver) = self.npc_id.and_then(|npc| world.npc_position(npc)) {
                self.target = Some(giver);
            }
        }
        true
    }

    pub(crate) fn count_kill(&mut self) {
        self.step += 1;
    }

    /// Polls the goal condition against the world. Never mutates anything.
    pub fn goal_satisfied(&self, world: &dyn MissionWorld) -> bool {
        let Some(player) = self.player_id else {
            return false;
        };
        match self.goal() {
            MissionGoal::Null => false,
            MissionGoal::GoTo => match (self.target, world.player_position(player)) {
                (Some(target), Some(at)) => target == at,
                _ => false,
            },
            MissionGoal::GoToType => {
                let Some(at) = world.player_position(player) else {
                    return false;
                };
                match (self.target, self.target_id.as_deref()) {
                    (Some(target), _) => target == at,
                    (None, Some(terrain)) => world.terrain_at(at).as_deref() == Some(terrain),
                    (None, None) => false,
                }
            }
            MissionGoal::FindItem => self
                .item_id
                .as_deref()
                .map_or(false, |item| world.item_count(player, item) >= self.item_count),
            MissionGoal::FindAnyItem => world.mission_item_count(player, self.uid) > 0,
            MissionGoal::FindMonster => world.mission_monster_near(player, self.uid),
            MissionGoal::FindNpc => match (self.target_npc_id, world.player_position(player)) {
                (Some(npc), Some(at)) => world.npc_position(npc) == Some(at),
                _ => false,
            },
            MissionGoal::Assassinate | MissionGoal::KillMonster | MissionGoal::ComputerToggle => {
                self.step >= 1
            }
            MissionGoal::KillMonsterType => self
                .monster_kill_goal
                .map_or(false, |goal| goal > 0 && self.step >= goal),
            MissionGoal::RecruitNpc => self
                .target_npc_id
                .map_or(false, |npc| world.npc_is_follower(npc)),
            MissionGoal::RecruitNpcClass => self
                .recruit_class
                .as_deref()
                .map_or(false, |class| world.follower_count_of_class(class) > 0),
        }
    }

    /// Goals that finish on their own once met, without a hand-in conversation.
    pub fn resolves_automatically(&self) -> bool {
        matches!(self.goal(), MissionGoal::GoTo | MissionGoal::GoToType) || self.npc_id.is_none()
    }

    /// Reason this mission can no longer be finished because a referenced entity is gone.
    pub(crate) fn lost_reference(&self, world: &dyn MissionWorld) -> Option<&'static str> {
        if let Some(giver) = self.npc_id {
            if !world.npc_exists(giver) {
                return Some("quest giver is gone");
            }
        }
        match self.goal() {
            MissionGoal::FindNpc | MissionGoal::RecruitNpc => match self.target_npc_id {
                Some(npc) if !world.npc_exists(npc) => Some("target npc is gone"),
                _ => None,
            },
            _ => None,
        }
    }

    fn roll_deadline(&self, now: u64, rng: &mut dyn RngCore) -> Option<u64> {
        let low = self.mission_type.deadline_low;
        let high = self.mission_type.deadline_high;
        if high == 0 {
            return None;
        }
        // A zero low bound means the window is fixed at the high bound.
        let low = if low == 0 { high } else { low.min(high) };
        Some(now + rng.gen_range(low..=high))
    }

    fn invalid(&self, action: &'static str) -> MissionError {
        MissionError::InvalidState {
            uid: self.uid,
            status: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::data::missions::MissionTypeDefinition;
    use crate::simulation::mission_type::MissionTypeRegistry;
    use crate::simulation::sandbox::SandboxWorld;

    const PLAYER: PlayerId = PlayerId(1);

    fn registry_with(defs: Vec<MissionTypeDefinition>) -> MissionTypeRegistry {
        let mut registry = MissionTypeRegistry::default();
        for def in defs {
            registry.load(def).expect("definition loads");
        }
        registry
    }

    fn bandage_def() -> MissionTypeDefinition {
        let mut def = MissionTypeDefinition::new("A", "Bandages", MissionGoal::FindItem);
        def.item_id = Some("bandage".to_string());
        def.item_count = 3;
        def.deadline_high = 500;
        def
    }

    fn mission_for(registry: &MissionTypeRegistry, id: &str, npc: Option<NpcId>) -> Mission {
        let mission_type = registry
            .get(&MissionTypeId::new(id))
            .expect("type registered")
            .clone();
        Mission::new(mission_type, MissionId(1), npc)
    }

    #[test]
    fn assign_sets_deadline_and_starts() {
        let registry = registry_with(vec![bandage_def()]);
        let mut world = SandboxWorld::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut mission = mission_for(&registry, "A", None);

        let status = mission
            .assign(PLAYER, &mut world, &mut rng, &BehaviorTuning::default())
            .expect("first assign is accepted");

        assert_eq!(status, MissionStatus::InProgress);
        assert_eq!(mission.get_deadline(), Some(500));
        assert_eq!(mission.get_assigned_player_id(), Some(PLAYER));
        assert!(mission.get_description().contains("bandage"));
    }

    #[test]
    fn second_assign_is_rejected_without_mutation() {
        let registry = registry_with(vec![bandage_def()]);
        let mut world = SandboxWorld::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut mission = mission_for(&registry, "A", None);
        let tuning = BehaviorTuning::default();
        mission
            .assign(PLAYER, &mut world, &mut rng, &tuning)
            .expect("first assign is accepted");

        let err = mission
            .assign(PlayerId(2), &mut world, &mut rng, &tuning)
            .unwrap_err();

        assert_eq!(
            err,
            MissionError::AlreadyAssigned {
                uid: MissionId(1),
                holder: PLAYER
            }
        );
        assert_eq!(mission.get_assigned_player_id(), Some(PLAYER));
        assert_eq!(mission.get_deadline(), Some(500));
    }

    #[test]
    fn wrap_up_takes_items_and_returns_follow_up() {
        let mut def = bandage_def();
        def.follow_up = Some("B".to_string());
        let registry = registry_with(vec![
            MissionTypeDefinition::new("B", "Next", MissionGoal::ComputerToggle),
            def,
        ]);
        let mut world = SandboxWorld::default();
        world.give_item(PLAYER, "bandage", 4);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut mission = mission_for(&registry, "A", Some(NpcId(5)));
        world.add_npc(NpcId(5), "NC_DOCTOR", Tripoint::new(0, 0, 0));
        mission
            .assign(PLAYER, &mut world, &mut rng, &BehaviorTuning::default())
            .expect("assign");

        assert!(mission.is_complete(NpcId(5), &world));
        assert!(!mission.is_complete(NpcId(6), &world));
        let follow_up = mission.wrap_up(&mut world).expect("wrap up");

        assert_eq!(follow_up, Some(MissionTypeId::new("B")));
        assert_eq!(mission.status(), MissionStatus::Success);
        assert_eq!(world.item_count(PLAYER, "bandage"), 1);
        assert!(mission.wrap_up(&mut world).is_err());
    }

    #[test]
    fn fail_is_idempotent_on_terminal_missions() {
        let mut def = bandage_def();
        def.fail = Some("kill_npc".to_string());
        let registry = registry_with(vec![def]);
        let mut world = SandboxWorld::default();
        world.add_npc(NpcId(3), "NC_DOCTOR", Tripoint::new(0, 0, 0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut mission = mission_for(&registry, "A", Some(NpcId(3)));
        mission
            .assign(PLAYER, &mut world, &mut rng, &BehaviorTuning::default())
            .expect("assign");

        assert!(mission.fail(&mut world));
        assert!(!world.npc_exists(NpcId(3)));
        assert!(!mission.fail(&mut world));
        assert!(!mission.step_complete(4, &world));
        assert_eq!(mission.get_step(), 0);
        assert!(mission.has_failed());
    }

    #[test]
    fn step_complete_retargets_report_back_goals_to_the_giver() {
        let registry = registry_with(vec![bandage_def()]);
        let mut world = SandboxWorld::default();
        world.add_npc(NpcId(9), "NC_DOCTOR", Tripoint::new(4, 4, 0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut mission = mission_for(&registry, "A", Some(NpcId(9)));
        mission
            .assign(PLAYER, &mut world, &mut rng, &BehaviorTuning::default())
            .expect("assign");

        assert!(mission.step_complete(2, &world));
        assert!(mission.step_complete(1, &world));
        assert_eq!(mission.get_step(), 2);
        assert_eq!(mission.get_target(), Some(Tripoint::new(4, 4, 0)));
    }

    #[test]
    fn start_routine_without_a_site_fails_the_mission() {
        let mut def = MissionTypeDefinition::new("DOG", "Rescue Dog", MissionGoal::FindMonster);
        def.start = Some("place_dog".to_string());
        def.end = Some("thankful".to_string());
        let registry = registry_with(vec![def]);
        let mut world = SandboxWorld::default();
        world.set_player_position(PLAYER, Tripoint::new(0, 0, 0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut mission = mission_for(&registry, "DOG", None);

        let status = mission
            .assign(PLAYER, &mut world, &mut rng, &BehaviorTuning::default())
            .expect("assign call itself is valid");

        assert_eq!(status, MissionStatus::Failure);
        assert!(mission.is_assigned());
    }

    #[test]
    fn missing_topics_yield_empty_dialogue() {
        let mut def = bandage_def();
        def.dialogue
            .insert("describe".to_string(), "We need bandages.".to_string());
        let registry = registry_with(vec![def]);
        let mission = mission_for(&registry, "A", None);
        assert_eq!(mission.dialogue_for_topic("describe"), "We need bandages.");
        assert_eq!(mission.dialogue_for_topic("reject"), "");
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            MissionStatus::YetToStart,
            MissionStatus::InProgress,
            MissionStatus::Success,
            MissionStatus::Failure,
        ] {
            assert_eq!(status_from_string(status_to_string(status)), Some(status));
        }
        assert_eq!(status_from_string("lost"), None);
    }
}
