use bevy_utils::tracing::debug;
use serde::{Deserialize, Serialize};

use crate::components::world::{NpcId, Tripoint};
use crate::data::missions::MissionGoal;
use crate::simulation::mission::Mission;
use crate::simulation::mission_world::{MissionWorld, NpcAttitude};

/// Radii used by placement predicates and start routines when they search the overmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorTuning {
    pub town_radius: i32,
    pub search_radius: i32,
}

impl Default for BehaviorTuning {
    fn default() -> Self {
        Self {
            town_radius: 8,
            search_radius: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceBehavior {
    #[default]
    Always,
    Never,
    NearTown,
}

impl PlaceBehavior {
    pub fn name(self) -> &'static str {
        match self {
            PlaceBehavior::Always => "always",
            PlaceBehavior::Never => "never",
            PlaceBehavior::NearTown => "near_town",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "always" => Some(PlaceBehavior::Always),
            "never" => Some(PlaceBehavior::Never),
            "near_town" => Some(PlaceBehavior::NearTown),
            _ => None,
        }
    }

    /// Whether a mission may be offered around `at`. Reads the world, never mutates it.
    pub fn accepts(self, at: Tripoint, world: &dyn MissionWorld, tuning: &BehaviorTuning) -> bool {
        match self {
            PlaceBehavior::Always => true,
            PlaceBehavior::Never => false,
            PlaceBehavior::NearTown => world.is_near_town(at, tuning.town_radius),
        }
    }
}

/// Result of the one-time start routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Setup is impossible (nowhere to place the target, the target npc is gone, ...).
    SetupFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartBehavior {
    #[default]
    Standard,
    Join,
    InfectNpc,
    PlaceDog,
    PlaceZombieMom,
    PlaceJabberwock,
    Kill100Z,
    Kill20Nightmares,
    KillHordeMaster,
    PlacePriestDiary,
    PlaceDepositBox,
    PlaceBook,
    RevealHospital,
    FindSafety,
    PointPrison,
    RecruitTracker,
}

impl StartBehavior {
    pub fn name(self) -> &'static str {
        match self {
            StartBehavior::Standard => "standard",
            StartBehavior::Join => "join",
            StartBehavior::InfectNpc => "infect_npc",
            StartBehavior::PlaceDog => "place_dog",
            StartBehavior::PlaceZombieMom => "place_zombie_mom",
            StartBehavior::PlaceJabberwock => "place_jabberwock",
            StartBehavior::Kill100Z => "kill_100_z",
            StartBehavior::Kill20Nightmares => "kill_20_nightmares",
            StartBehavior::KillHordeMaster => "kill_horde_master",
            StartBehavior::PlacePriestDiary => "place_priest_diary",
            StartBehavior::PlaceDepositBox => "place_deposit_box",
            StartBehavior::PlaceBook => "place_book",
            StartBehavior::RevealHospital => "reveal_hospital",
            StartBehavior::FindSafety => "find_safety",
            StartBehavior::PointPrison => "point_prison",
            StartBehavior::RecruitTracker => "recruit_tracker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(StartBehavior::Standard),
            "join" => Some(StartBehavior::Join),
            "infect_npc" => Some(StartBehavior::InfectNpc),
            "place_dog" => Some(StartBehavior::PlaceDog),
            "place_zombie_mom" => Some(StartBehavior::PlaceZombieMom),
            "place_jabberwock" => Some(StartBehavior::PlaceJabberwock),
            "kill_100_z" => Some(StartBehavior::Kill100Z),
            "kill_20_nightmares" => Some(StartBehavior::Kill20Nightmares),
            "kill_horde_master" => Some(StartBehavior::KillHordeMaster),
            "place_priest_diary" => Some(StartBehavior::PlacePriestDiary),
            "place_deposit_box" => Some(StartBehavior::PlaceDepositBox),
            "place_book" => Some(StartBehavior::PlaceBook),
            "reveal_hospital" => Some(StartBehavior::RevealHospital),
            "find_safety" => Some(StartBehavior::FindSafety),
            "point_prison" => Some(StartBehavior::PointPrison),
            "recruit_tracker" => Some(StartBehavior::RecruitTracker),
            _ => None,
        }
    }

    /// Goal kinds this routine knows how to set up; `None` means any goal.
    pub fn compatible_goals(self) -> Option<&'static [MissionGoal]> {
        match self {
            StartBehavior::Standard | StartBehavior::Join => None,
            StartBehavior::InfectNpc => Some(&[MissionGoal::FindItem]),
            StartBehavior::PlaceDog => Some(&[MissionGoal::FindMonster]),
            StartBehavior::PlaceZombieMom
            | StartBehavior::PlaceJabberwock
            | StartBehavior::KillHordeMaster => Some(&[MissionGoal::KillMonster]),
            StartBehavior::Kill100Z | StartBehavior::Kill20Nightmares => {
                Some(&[MissionGoal::KillMonsterType])
            }
            StartBehavior::PlacePriestDiary
            | StartBehavior::PlaceDepositBox
            | StartBehavior::PlaceBook => Some(&[MissionGoal::FindAnyItem]),
            StartBehavior::RevealHospital
            | StartBehavior::FindSafety
            | StartBehavior::PointPrison => Some(&[MissionGoal::GoTo, MissionGoal::GoToType]),
            StartBehavior::RecruitTracker => Some(&[MissionGoal::RecruitNpc]),
        }
    }

    /// Whether the routine fills in goal parameters that the archetype may leave empty.
    pub fn supplies_goal_parameters(self) -> bool {
        !matches!(self, StartBehavior::Standard | StartBehavior::Join)
    }

    /// Runs once when the mission is assigned: resolves abstract goal parameters into concrete
    /// ones and writes the description. Goal polling lives in `Mission::goal_satisfied`.
    pub fn initialize(
        self,
        mission: &mut Mission,
        world: &mut dyn MissionWorld,
        tuning: &BehaviorTuning,
    ) -> StartOutcome {
        debug!(uid = mission.uid.0, routine = self.name(), "running start routine");
        let outcome = match self {
            StartBehavior::Standard => standard(mission, world, tuning),
            StartBehavior::Join => {
                if let Some(npc) = mission.npc_id {
                    world.set_npc_attitude(npc, NpcAttitude::Follow);
                }
                standard(mission, world, tuning)
            }
            StartBehavior::InfectNpc => {
                let Some(npc) = mission.npc_id else {
                    return StartOutcome::SetupFailed("no npc to infect".to_string());
                };
                if !world.set_npc_condition(npc, "infected", true) {
                    return StartOutcome::SetupFailed(format!("npc {} is gone", npc.0));
                }
                if mission.item_id.is_none() {
                    mission.item_id = Some("antibiotics".to_string());
                }
                mission.target = world.npc_position(npc);
                StartOutcome::Started
            }
            StartBehavior::PlaceDog => spawn_near_player(mission, world, tuning, "house", "mon_dog"),
            StartBehavior::PlaceZombieMom => {
                spawn_near_player(mission, world, tuning, "house", "mon_zombie")
            }
            StartBehavior::PlaceJabberwock => {
                spawn_near_player(mission, world, tuning, "forest_thick", "mon_jabberwock")
            }
            StartBehavior::KillHordeMaster => {
                spawn_near_player(mission, world, tuning, "field", "mon_zombie_master")
            }
            StartBehavior::Kill100Z => kill_count(mission, "mon_zombie", 100),
            StartBehavior::Kill20Nightmares => kill_count(mission, "mon_charred_nightmare", 20),
            StartBehavior::PlacePriestDiary => {
                place_item_near_player(mission, world, tuning, "house", "priest_diary")
            }
            StartBehavior::PlaceDepositBox => {
                place_item_near_player(mission, world, tuning, "bank", "safe_box")
            }
            StartBehavior::PlaceBook => {
                let item = mission.item_id.clone().unwrap_or_else(|| "book".to_string());
                place_item_near_player(mission, world, tuning, "house", &item)
            }
            StartBehavior::RevealHospital => reveal_near_player(mission, world, tuning, "hospital"),
            StartBehavior::FindSafety => {
                let terrain = mission
                    .target_id
                    .clone()
                    .unwrap_or_else(|| "shelter".to_string());
                reveal_near_player(mission, world, tuning, &terrain)
            }
            StartBehavior::PointPrison => reveal_near_player(mission, world, tuning, "prison"),
            StartBehavior::RecruitTracker => {
                let Some(site) = terrain_near_player(mission, world, tuning, "cabin") else {
                    return StartOutcome::SetupFailed("no cabin nearby".to_string());
                };
                let Some(npc) = world.spawn_npc("NC_TRACKER", site) else {
                    return StartOutcome::SetupFailed("tracker could not be spawned".to_string());
                };
                mission.target_npc_id = Some(npc);
                mission.recruit_class = Some("NC_TRACKER".to_string());
                mission.target = Some(site);
                world.reveal_terrain(site, 2);
                StartOutcome::Started
            }
        };
        if outcome == StartOutcome::Started && mission.description.is_empty() {
            mission.description = describe_goal(mission);
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndBehavior {
    #[default]
    Standard,
    /// Quest giver leaves once the job is done.
    Leave,
    Thankful,
    DepositBox,
    HealInfection,
}

const DEPOSIT_BOX_VALUABLES: [&str; 4] = ["cash_card", "diamond", "gold_watch", "silver_bar"];

impl EndBehavior {
    pub fn name(self) -> &'static str {
        match self {
            EndBehavior::Standard => "standard",
            EndBehavior::Leave => "leave",
            EndBehavior::Thankful => "thankful",
            EndBehavior::DepositBox => "deposit_box",
            EndBehavior::HealInfection => "heal_infection",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(EndBehavior::Standard),
            "leave" => Some(EndBehavior::Leave),
            "thankful" => Some(EndBehavior::Thankful),
            "deposit_box" => Some(EndBehavior::DepositBox),
            "heal_infection" => Some(EndBehavior::HealInfection),
            _ => None,
        }
    }

    pub fn apply(self, mission: &Mission, world: &mut dyn MissionWorld) {
        match self {
            EndBehavior::Standard => {}
            EndBehavior::Leave => set_giver_attitude(mission, world, NpcAttitude::Leave),
            EndBehavior::Thankful => set_giver_attitude(mission, world, NpcAttitude::Friendly),
            EndBehavior::DepositBox => {
                let (Some(player), Some(npc)) = (mission.player_id, mission.npc_id) else {
                    return;
                };
                // The giver opens the box and hands one valuable back.
                world.set_npc_attitude(npc, NpcAttitude::Friendly);
                let pick = mission.uid.0 as usize % DEPOSIT_BOX_VALUABLES.len();
                world.give_item(player, DEPOSIT_BOX_VALUABLES[pick], 1);
            }
            EndBehavior::HealInfection => {
                if let Some(npc) = mission.npc_id {
                    world.set_npc_condition(npc, "infected", false);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailBehavior {
    #[default]
    Standard,
    /// The npc who assigned the mission dies.
    KillNpc,
}

impl FailBehavior {
    pub fn name(self) -> &'static str {
        match self {
            FailBehavior::Standard => "standard",
            FailBehavior::KillNpc => "kill_npc",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(FailBehavior::Standard),
            "kill_npc" => Some(FailBehavior::KillNpc),
            _ => None,
        }
    }

    pub fn apply(self, mission: &Mission, world: &mut dyn MissionWorld) {
        match self {
            FailBehavior::Standard => {}
            FailBehavior::KillNpc => {
                if let Some(npc) = mission.npc_id {
                    world.kill_npc(npc);
                }
            }
        }
    }
}

fn standard(
    mission: &mut Mission,
    world: &mut dyn MissionWorld,
    tuning: &BehaviorTuning,
) -> StartOutcome {
    match mission.goal() {
        MissionGoal::GoToType => {
            if mission.target.is_some() {
                return StartOutcome::Started;
            }
            let Some(terrain) = mission.target_id.clone() else {
                return StartOutcome::SetupFailed("no destination terrain".to_string());
            };
            match terrain_near_player(mission, world, tuning, &terrain) {
                Some(site) => {
                    mission.target = Some(site);
                    StartOutcome::Started
                }
                None => StartOutcome::SetupFailed(format!("no {} within reach", terrain)),
            }
        }
        MissionGoal::FindNpc | MissionGoal::RecruitNpc | MissionGoal::Assassinate => {
            let Some(npc) = mission.target_npc_id else {
                return StartOutcome::SetupFailed("no target npc".to_string());
            };
            if !world.npc_exists(npc) {
                return StartOutcome::SetupFailed(format!("target npc {} is gone", npc.0));
            }
            mission.target = world.npc_position(npc);
            StartOutcome::Started
        }
        _ => StartOutcome::Started,
    }
}

fn terrain_near_player(
    mission: &Mission,
    world: &dyn MissionWorld,
    tuning: &BehaviorTuning,
    terrain: &str,
) -> Option<Tripoint> {
    let origin = mission
        .player_id
        .and_then(|player| world.player_position(player))?;
    world.find_terrain_near(origin, terrain, tuning.search_radius)
}

fn spawn_near_player(
    mission: &mut Mission,
    world: &mut dyn MissionWorld,
    tuning: &BehaviorTuning,
    terrain: &str,
    monster_type: &str,
) -> StartOutcome {
    let Some(site) = terrain_near_player(mission, world, tuning, terrain) else {
        return StartOutcome::SetupFailed(format!("no {} within reach", terrain));
    };
    let monster_type = mission
        .monster_type
        .clone()
        .unwrap_or_else(|| monster_type.to_string());
    if world.spawn_monster(&monster_type, site, mission.uid).is_none() {
        return StartOutcome::SetupFailed(format!("{} could not be spawned", monster_type));
    }
    mission.monster_type = Some(monster_type);
    mission.target = Some(site);
    StartOutcome::Started
}

fn place_item_near_player(
    mission: &mut Mission,
    world: &mut dyn MissionWorld,
    tuning: &BehaviorTuning,
    terrain: &str,
    item: &str,
) -> StartOutcome {
    let Some(site) = terrain_near_player(mission, world, tuning, terrain) else {
        return StartOutcome::SetupFailed(format!("no {} within reach", terrain));
    };
    if !world.place_mission_item(item, site, mission.uid) {
        return StartOutcome::SetupFailed(format!("{} could not be placed", item));
    }
    mission.item_id = Some(item.to_string());
    mission.target = Some(site);
    StartOutcome::Started
}

fn reveal_near_player(
    mission: &mut Mission,
    world: &mut dyn MissionWorld,
    tuning: &BehaviorTuning,
    terrain: &str,
) -> StartOutcome {
    let Some(site) = terrain_near_player(mission, world, tuning, terrain) else {
        return StartOutcome::SetupFailed(format!("no {} within reach", terrain));
    };
    world.reveal_terrain(site, 3);
    mission.target_id = Some(terrain.to_string());
    mission.target = Some(site);
    StartOutcome::Started
}

fn kill_count(mission: &mut Mission, monster_type: &str, goal: u32) -> StartOutcome {
    // Only kills made after assignment count, so the counter starts fresh.
    mission.step = 0;
    if mission.monster_type.is_none() {
        mission.monster_type = Some(monster_type.to_string());
    }
    if mission.monster_kill_goal.map_or(true, |current| current == 0) {
        mission.monster_kill_goal = Some(goal);
    }
    StartOutcome::Started
}

fn set_giver_attitude(mission: &Mission, world: &mut dyn MissionWorld, attitude: NpcAttitude) {
    if let Some(npc) = mission.npc_id {
        world.set_npc_attitude(npc, attitude);
    }
}

fn describe_goal(mission: &Mission) -> String {
    let name = mission.name();
    let item = mission.item_id.as_deref().unwrap_or("item");
    let npc = |id: Option<NpcId>| id.map_or_else(|| "someone".to_string(), |n| format!("npc {}", n.0));
    match mission.goal() {
        MissionGoal::Null => name.to_string(),
        MissionGoal::GoTo | MissionGoal::GoToType => match mission.target {
            Some(target) => format!("{}: reach {}", name, target),
            None => format!("{}: reach the destination", name),
        },
        MissionGoal::FindItem => format!("{}: find {} x{}", name, item, mission.item_count),
        MissionGoal::FindAnyItem => format!("{}: recover the {}", name, item),
        MissionGoal::FindMonster => format!("{}: bring back the lost animal", name),
        MissionGoal::FindNpc => format!("{}: find {}", name, npc(mission.target_npc_id)),
        MissionGoal::Assassinate => format!("{}: kill {}", name, npc(mission.target_npc_id)),
        MissionGoal::KillMonster => format!(
            "{}: kill the {}",
            name,
            mission.monster_type.as_deref().unwrap_or("target")
        ),
        MissionGoal::KillMonsterType => format!(
            "{}: kill {} {}",
            name,
            mission.monster_kill_goal.unwrap_or(0),
            mission.monster_type.as_deref().unwrap_or("monsters")
        ),
        MissionGoal::RecruitNpc => format!("{}: recruit {}", name, npc(mission.target_npc_id)),
        MissionGoal::RecruitNpcClass => format!(
            "{}: recruit a {}",
            name,
            mission.recruit_class.as_deref().unwrap_or("survivor")
        ),
        MissionGoal::ComputerToggle => format!("{}: activate the terminal", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::components::world::{MissionId, PlayerId};
    use crate::data::missions::MissionTypeDefinition;
    use crate::simulation::mission_type::MissionType;
    use crate::simulation::sandbox::SandboxWorld;

    fn start(def: MissionTypeDefinition, world: &mut SandboxWorld) -> (Mission, StartOutcome) {
        let mission_type = Arc::new(MissionType::from_definition(def).expect("valid definition"));
        let mut mission = mission_type.instantiate(MissionId(3), None);
        mission.player_id = Some(PlayerId(1));
        let outcome = mission_type
            .start
            .initialize(&mut mission, world, &BehaviorTuning::default());
        (mission, outcome)
    }

    #[test]
    fn behavior_names_round_trip_through_the_catalog() {
        for start in [
            StartBehavior::Standard,
            StartBehavior::InfectNpc,
            StartBehavior::Kill100Z,
            StartBehavior::RecruitTracker,
        ] {
            assert_eq!(StartBehavior::from_name(start.name()), Some(start));
        }
        assert_eq!(PlaceBehavior::from_name("near_town"), Some(PlaceBehavior::NearTown));
        assert_eq!(EndBehavior::from_name("heal_infection"), Some(EndBehavior::HealInfection));
        assert_eq!(FailBehavior::from_name("kill_npc"), Some(FailBehavior::KillNpc));
        assert_eq!(FailBehavior::from_name("explode"), None);
    }

    #[test]
    fn specialised_start_routines_declare_their_goal() {
        assert_eq!(
            StartBehavior::PlaceDog.compatible_goals(),
            Some(&[MissionGoal::FindMonster][..])
        );
        assert!(StartBehavior::Standard.compatible_goals().is_none());
        assert!(StartBehavior::Kill100Z.supplies_goal_parameters());
        assert!(!StartBehavior::Join.supplies_goal_parameters());
    }

    #[test]
    fn kill_count_routines_fill_in_the_quota() {
        let mut def = MissionTypeDefinition::new("K", "Cull", MissionGoal::KillMonsterType);
        def.start = Some("kill_100_z".to_string());
        let (mission, outcome) = start(def, &mut SandboxWorld::default());

        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(mission.get_monster_type(), Some("mon_zombie"));
        assert_eq!(mission.get_monster_kill_goal(), Some(100));
        assert_eq!(mission.get_step(), 0);
        assert!(!mission.get_description().is_empty());
    }

    #[test]
    fn reveal_routines_uncover_the_nearest_site() {
        let mut world = SandboxWorld::default();
        world.set_player_position(PlayerId(1), Tripoint::new(0, 0, 0));
        world.set_terrain(Tripoint::new(6, 4, 0), "hospital");
        world.set_terrain(Tripoint::new(20, 20, 0), "hospital");
        let mut def = MissionTypeDefinition::new("H", "Hospital", MissionGoal::GoTo);
        def.start = Some("reveal_hospital".to_string());

        let (mission, outcome) = start(def, &mut world);

        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(mission.get_target(), Some(Tripoint::new(6, 4, 0)));
        assert!(world.is_revealed(Tripoint::new(6, 4, 0)));
        assert!(world.is_revealed(Tripoint::new(9, 7, 0)));
        assert!(!world.is_revealed(Tripoint::new(20, 20, 0)));
    }

    #[test]
    fn reveal_routines_fail_setup_without_a_site() {
        let mut world = SandboxWorld::default();
        world.set_player_position(PlayerId(1), Tripoint::new(0, 0, 0));
        let mut def = MissionTypeDefinition::new("P", "Prison", MissionGoal::GoTo);
        def.start = Some("point_prison".to_string());

        let (mission, outcome) = start(def, &mut world);

        assert!(matches!(outcome, StartOutcome::SetupFailed(_)));
        assert_eq!(mission.get_target(), None);
    }
}
