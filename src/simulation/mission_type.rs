use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use bevy_utils::tracing::{info, warn};
use bevy_utils::HashMap;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::world::{MissionId, NpcId, Tripoint};
use crate::data::missions::{MissionCatalog, MissionGoal, MissionOrigin, MissionTypeDefinition};
use crate::simulation::behavior::{
    BehaviorTuning, EndBehavior, FailBehavior, PlaceBehavior, StartBehavior,
};
use crate::simulation::legacy::{legacy_type_id, LEGACY_MISSION_TYPE_IDS};
use crate::simulation::mission::Mission;
use crate::simulation::mission_world::MissionWorld;

pub const MISSION_NULL: &str = "MISSION_NULL";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionTypeId(pub String);

impl MissionTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn null() -> Self {
        Self(MISSION_NULL.to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0 == MISSION_NULL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MissionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable mission archetype. Per-run state lives on `Mission`.
#[derive(Debug, Clone)]
pub struct MissionType {
    pub id: MissionTypeId,
    pub name: String,
    pub goal: MissionGoal,
    pub difficulty: i32,
    pub value: u64,
    pub deadline_low: u64,
    pub deadline_high: u64,
    pub urgent: bool,
    pub origins: Vec<MissionOrigin>,
    pub item_id: Option<String>,
    pub item_count: u32,
    pub recruit_class: Option<String>,
    pub target_npc_id: Option<NpcId>,
    pub monster_type: Option<String>,
    pub monster_kill_goal: Option<u32>,
    pub target_id: Option<String>,
    pub follow_up: Option<MissionTypeId>,
    pub place: PlaceBehavior,
    pub start: StartBehavior,
    pub end: EndBehavior,
    pub fail: FailBehavior,
    pub dialogue: BTreeMap<String, String>,
}

impl MissionType {
    fn null_type() -> Self {
        Self {
            id: MissionTypeId::null(),
            name: "Bugged mission type".to_string(),
            goal: MissionGoal::Null,
            difficulty: 0,
            value: 0,
            deadline_low: 0,
            deadline_high: 0,
            urgent: false,
            origins: Vec::new(),
            item_id: None,
            item_count: 1,
            recruit_class: None,
            target_npc_id: None,
            monster_type: None,
            monster_kill_goal: None,
            target_id: None,
            follow_up: None,
            place: PlaceBehavior::Never,
            start: StartBehavior::Standard,
            end: EndBehavior::Standard,
            fail: FailBehavior::Standard,
            dialogue: BTreeMap::new(),
        }
    }

    /// Validates a raw definition and resolves its behavior names against the catalog.
    pub fn from_definition(def: MissionTypeDefinition) -> Result<Self, DefinitionError> {
        let id = def.id.trim().to_string();
        if id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if def.deadline_low > def.deadline_high {
            return Err(DefinitionError::InvalidDeadline {
                id,
                low: def.deadline_low,
                high: def.deadline_high,
            });
        }

        let place = resolve_slot(&id, "place", def.place.as_deref(), PlaceBehavior::from_name)?;
        let start = resolve_slot(&id, "start", def.start.as_deref(), StartBehavior::from_name)?;
        let end = resolve_slot(&id, "end", def.end.as_deref(), EndBehavior::from_name)?;
        let fail = resolve_slot(&id, "fail", def.fail.as_deref(), FailBehavior::from_name)?;

        if let Some(goals) = start.compatible_goals() {
            if !goals.contains(&def.goal) {
                return Err(DefinitionError::IncompatibleStart {
                    id,
                    start: start.name(),
                    goal: def.goal,
                });
            }
        }

        let item_id = non_empty(def.item_id);
        let target_id = non_empty(def.target_id);
        let recruit_class = non_empty(def.recruit_class);
        let monster_type = non_empty(def.monster_type);
        let monster_kill_goal = def.monster_kill_goal.filter(|goal| *goal > 0);
        let target_npc_id = def.target_npc_id.filter(|npc| *npc >= 0).map(NpcId);

        if !start.supplies_goal_parameters() {
            let missing = match def.goal {
                MissionGoal::GoToType if target_id.is_none() => Some("target_id"),
                MissionGoal::FindItem if item_id.is_none() => Some("item_id"),
                MissionGoal::FindItem if def.item_count == 0 => Some("item_count"),
                MissionGoal::FindNpc | MissionGoal::Assassinate | MissionGoal::RecruitNpc
                    if target_npc_id.is_none() =>
                {
                    Some("target_npc_id")
                }
                MissionGoal::KillMonsterType if monster_type.is_none() => Some("monster_type"),
                MissionGoal::KillMonsterType if monster_kill_goal.is_none() => {
                    Some("monster_kill_goal")
                }
                MissionGoal::RecruitNpcClass if recruit_class.is_none() => Some("recruit_class"),
                _ => None,
            };
            if let Some(parameter) = missing {
                return Err(DefinitionError::MissingGoalParameter {
                    id,
                    goal: def.goal,
                    parameter,
                });
            }
        }

        let follow_up = non_empty(def.follow_up)
            .map(MissionTypeId)
            .filter(|follow_up| !follow_up.is_null());

        Ok(Self {
            id: MissionTypeId(id),
            name: def.name,
            goal: def.goal,
            difficulty: def.difficulty,
            value: def.value,
            deadline_low: def.deadline_low,
            deadline_high: def.deadline_high,
            urgent: def.urgent,
            origins: def.origins,
            item_id,
            item_count: def.item_count,
            recruit_class,
            target_npc_id,
            monster_type,
            monster_kill_goal,
            target_id,
            follow_up,
            place,
            start,
            end,
            fail,
            dialogue: def.dialogue,
        })
    }

    pub fn offered_at(&self, origin: MissionOrigin) -> bool {
        self.origins.contains(&origin)
    }

    /// Builds a fresh, unassigned instance sharing this archetype.
    pub fn instantiate(self: &Arc<Self>, uid: MissionId, npc: Option<NpcId>) -> Mission {
        Mission::new(Arc::clone(self), uid, npc)
    }
}

fn resolve_slot<T>(
    id: &str,
    slot: &'static str,
    name: Option<&str>,
    lookup: fn(&str) -> Option<T>,
) -> Result<T, DefinitionError>
where
    T: Default,
{
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        None => Ok(T::default()),
        Some(name) => lookup(name).ok_or_else(|| DefinitionError::UnknownBehavior {
            id: id.to_string(),
            slot,
            name: name.to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "null")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("mission type id cannot be empty")]
    EmptyId,
    #[error("duplicate mission type id {0}")]
    DuplicateId(String),
    #[error("mission type {id}: deadline window {low}..{high} is inverted")]
    InvalidDeadline { id: String, low: u64, high: u64 },
    #[error("mission type {id}: unknown {slot} behavior \"{name}\"")]
    UnknownBehavior {
        id: String,
        slot: &'static str,
        name: String,
    },
    #[error("mission type {id}: start behavior {start} cannot set up goal {goal:?}")]
    IncompatibleStart {
        id: String,
        start: &'static str,
        goal: MissionGoal,
    },
    #[error("mission type {id}: goal {goal:?} requires {parameter}")]
    MissingGoalParameter {
        id: String,
        goal: MissionGoal,
        parameter: &'static str,
    },
}

/// Outcome of loading a whole catalog. Offending definitions are skipped, not fatal.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub errors: Vec<DefinitionError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyProblem {
    #[error("mission type {id}: follow-up {follow_up} does not exist")]
    UnknownFollowUp {
        id: MissionTypeId,
        follow_up: MissionTypeId,
    },
    #[error("mission type {id}: recruit class {class} does not exist")]
    UnknownRecruitClass { id: MissionTypeId, class: String },
    #[error("legacy mission id {legacy} maps to {id}, which is not loaded")]
    UnresolvedLegacyId { legacy: i32, id: MissionTypeId },
}

impl ConsistencyProblem {
    /// Unresolved legacy ids only matter for old saves, so they never block content.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConsistencyProblem::UnresolvedLegacyId { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} mission type consistency problem(s): {}", .problems.len(), summarize(.problems))]
pub struct ConsistencyError {
    pub problems: Vec<ConsistencyProblem>,
}

fn summarize(problems: &[ConsistencyProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every loaded archetype, looked up by id and iterated in load order.
#[derive(Resource, Debug, Clone)]
pub struct MissionTypeRegistry {
    types: Vec<Arc<MissionType>>,
    index: HashMap<MissionTypeId, usize>,
    null_type: Arc<MissionType>,
    tuning: BehaviorTuning,
}

impl Default for MissionTypeRegistry {
    fn default() -> Self {
        Self::with_tuning(BehaviorTuning::default())
    }
}

impl MissionTypeRegistry {
    pub fn with_tuning(tuning: BehaviorTuning) -> Self {
        Self {
            types: Vec::new(),
            index: HashMap::default(),
            null_type: Arc::new(MissionType::null_type()),
            tuning,
        }
    }

    pub fn tuning(&self) -> &BehaviorTuning {
        &self.tuning
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn load(&mut self, def: MissionTypeDefinition) -> Result<(), DefinitionError> {
        let mission_type = MissionType::from_definition(def)?;
        if mission_type.id.is_null() || self.index.contains_key(&mission_type.id) {
            return Err(DefinitionError::DuplicateId(mission_type.id.0));
        }
        self.index
            .insert(mission_type.id.clone(), self.types.len());
        self.types.push(Arc::new(mission_type));
        Ok(())
    }

    pub fn load_catalog(&mut self, catalog: MissionCatalog) -> LoadReport {
        let mut report = LoadReport::default();
        for def in catalog.missions {
            match self.load(def) {
                Ok(()) => report.loaded += 1,
                Err(err) => {
                    warn!("skipping mission type: {}", err);
                    report.errors.push(err);
                }
            }
        }
        info!(
            loaded = report.loaded,
            skipped = report.errors.len(),
            "mission catalog loaded"
        );
        report
    }

    /// Exact lookup. `MISSION_NULL` always resolves to the sentinel.
    pub fn get(&self, id: &MissionTypeId) -> Option<&Arc<MissionType>> {
        if id.is_null() {
            return Some(&self.null_type);
        }
        self.index.get(id).map(|idx| &self.types[*idx])
    }

    pub fn contains(&self, id: &MissionTypeId) -> bool {
        id.is_null() || self.index.contains_key(id)
    }

    pub fn get_all(&self) -> &[Arc<MissionType>] {
        &self.types
    }

    /// Maps a frozen historical numeric id. Anything that does not resolve becomes the sentinel.
    pub fn from_legacy(&self, old_id: i32) -> MissionTypeId {
        let id = MissionTypeId::new(legacy_type_id(old_id));
        if self.contains(&id) {
            id
        } else {
            MissionTypeId::null()
        }
    }

    /// Uniform pick among archetypes offered at `origin` whose placement accepts `at`.
    /// Candidates are gathered in load order, so a seeded rng gives a reproducible pick.
    pub fn get_random_id(
        &self,
        origin: MissionOrigin,
        at: Tripoint,
        world: &dyn MissionWorld,
        rng: &mut dyn RngCore,
    ) -> MissionTypeId {
        let candidates: Vec<&MissionTypeId> = self
            .types
            .iter()
            .filter(|mission_type| mission_type.offered_at(origin))
            .filter(|mission_type| mission_type.place.accepts(at, world, &self.tuning))
            .map(|mission_type| &mission_type.id)
            .collect();
        candidates
            .choose(rng)
            .map(|id| (*id).clone())
            .unwrap_or_else(MissionTypeId::null)
    }

    /// Post-load referential checks. Returns the non-fatal warnings on success.
    pub fn check_consistency(
        &self,
        is_known_class: impl Fn(&str) -> bool,
    ) -> Result<Vec<ConsistencyProblem>, ConsistencyError> {
        let mut problems = Vec::new();
        for mission_type in &self.types {
            if let Some(follow_up) = &mission_type.follow_up {
                if !self.contains(follow_up) {
                    problems.push(ConsistencyProblem::UnknownFollowUp {
                        id: mission_type.id.clone(),
                        follow_up: follow_up.clone(),
                    });
                }
            }
            if let Some(class) = &mission_type.recruit_class {
                if !is_known_class(class) {
                    problems.push(ConsistencyProblem::UnknownRecruitClass {
                        id: mission_type.id.clone(),
                        class: class.clone(),
                    });
                }
            }
        }
        for (legacy, id) in LEGACY_MISSION_TYPE_IDS.iter().enumerate() {
            let id = MissionTypeId::new(*id);
            if !self.contains(&id) {
                problems.push(ConsistencyProblem::UnresolvedLegacyId {
                    legacy: legacy as i32,
                    id,
                });
            }
        }

        for problem in &problems {
            warn!("{}", problem);
        }
        if problems.iter().any(ConsistencyProblem::is_fatal) {
            return Err(ConsistencyError { problems });
        }
        Ok(problems)
    }

    /// Drops every archetype. Instances already holding one keep it alive until they go.
    pub fn reset(&mut self) {
        self.types.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::simulation::sandbox::SandboxWorld;

    fn offered(id: &str, origins: &[MissionOrigin], place: Option<&str>) -> MissionTypeDefinition {
        let mut def = MissionTypeDefinition::new(id, id, MissionGoal::ComputerToggle);
        def.origins = origins.to_vec();
        def.place = place.map(str::to_string);
        def
    }

    #[test]
    fn duplicate_and_malformed_definitions_are_skipped() {
        let mut bad_deadline = offered("LATE", &[], None);
        bad_deadline.deadline_low = 10;
        bad_deadline.deadline_high = 5;
        let mut bad_start = offered("DOG", &[], None);
        bad_start.start = Some("place_dog".to_string());
        let mut unknown = offered("ODD", &[], None);
        unknown.end = Some("confetti".to_string());
        let missing = MissionTypeDefinition::new("FETCH", "Fetch", MissionGoal::FindItem);

        let mut registry = MissionTypeRegistry::default();
        let report = registry.load_catalog(MissionCatalog {
            schema_version: 1,
            missions: vec![
                offered("A", &[], None),
                offered("A", &[], None),
                offered(MISSION_NULL, &[], None),
                bad_deadline,
                bad_start,
                unknown,
                missing,
            ],
        });

        assert_eq!(report.loaded, 1);
        assert_eq!(report.errors.len(), 6);
        assert!(matches!(report.errors[0], DefinitionError::DuplicateId(_)));
        assert!(matches!(
            report.errors[4],
            DefinitionError::UnknownBehavior { slot: "end", .. }
        ));
        assert!(matches!(
            report.errors[5],
            DefinitionError::MissingGoalParameter {
                parameter: "item_id",
                ..
            }
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn random_pick_respects_origin_and_placement() {
        let mut registry = MissionTypeRegistry::default();
        registry
            .load(offered("START", &[MissionOrigin::GameStart], None))
            .unwrap();
        registry
            .load(offered("NEVER", &[MissionOrigin::AnyNpc], Some("never")))
            .unwrap();
        registry
            .load(offered("TOWN", &[MissionOrigin::AnyNpc], Some("near_town")))
            .unwrap();
        let mut world = SandboxWorld::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let wild = Tripoint::new(50, 50, 0);

        for _ in 0..20 {
            let id = registry.get_random_id(MissionOrigin::GameStart, wild, &world, &mut rng);
            assert_eq!(id, MissionTypeId::new("START"));
        }
        assert!(registry
            .get_random_id(MissionOrigin::AnyNpc, wild, &world, &mut rng)
            .is_null());

        world.set_terrain(Tripoint::new(52, 50, 0), "town");
        assert_eq!(
            registry.get_random_id(MissionOrigin::AnyNpc, wild, &world, &mut rng),
            MissionTypeId::new("TOWN")
        );
        assert!(registry
            .get_random_id(MissionOrigin::Secondary, wild, &world, &mut rng)
            .is_null());
    }

    #[test]
    fn random_pick_is_reproducible_for_a_seed() {
        let mut registry = MissionTypeRegistry::default();
        for id in ["A", "B", "C", "D"] {
            registry
                .load(offered(id, &[MissionOrigin::AnyNpc], None))
                .unwrap();
        }
        let world = SandboxWorld::default();
        let at = Tripoint::new(0, 0, 0);
        let picks = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..8)
                .map(|_| registry.get_random_id(MissionOrigin::AnyNpc, at, &world, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(11), picks(11));
    }

    #[test]
    fn empty_registry_returns_the_sentinel() {
        let registry = MissionTypeRegistry::default();
        let world = SandboxWorld::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let id = registry.get_random_id(
            MissionOrigin::GameStart,
            Tripoint::new(0, 0, 0),
            &world,
            &mut rng,
        );
        assert!(id.is_null());
        assert!(registry.get(&id).is_some());
        assert!(registry.get_all().is_empty());
    }

    #[test]
    fn legacy_ids_always_resolve() {
        let mut registry = MissionTypeRegistry::default();
        registry
            .load(offered("MISSION_GET_BOOK", &[], None))
            .unwrap();
        for old_id in -5..(LEGACY_MISSION_TYPE_IDS.len() as i32 + 5) {
            let id = registry.from_legacy(old_id);
            assert!(registry.get(&id).is_some(), "legacy {} unresolved", old_id);
        }
        assert_eq!(registry.from_legacy(7), MissionTypeId::new("MISSION_GET_BOOK"));
        assert!(registry.from_legacy(1).is_null());
    }

    #[test]
    fn consistency_reports_dangling_follow_ups() {
        let mut registry = MissionTypeRegistry::default();
        let mut chained = offered("A", &[], None);
        chained.follow_up = Some("MISSING".to_string());
        let mut recruit = MissionTypeDefinition::new("R", "R", MissionGoal::RecruitNpcClass);
        recruit.recruit_class = Some("NC_GHOST".to_string());
        let mut ok = offered("B", &[], None);
        ok.follow_up = Some(MISSION_NULL.to_string());
        registry.load(chained).unwrap();
        registry.load(recruit).unwrap();
        registry.load(ok).unwrap();

        let err = registry
            .check_consistency(|class| class == "NC_TRACKER")
            .unwrap_err();
        let fatal: Vec<_> = err.problems.iter().filter(|p| p.is_fatal()).collect();
        assert_eq!(fatal.len(), 2);
        assert!(registry.get(&MissionTypeId::new("B")).unwrap().follow_up.is_none());
    }

    #[test]
    fn reset_clears_everything_but_the_sentinel() {
        let mut registry = MissionTypeRegistry::default();
        registry.load(offered("A", &[], None)).unwrap();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.get(&MissionTypeId::new("A")).is_none());
        assert!(registry.get(&MissionTypeId::null()).is_some());
        registry.load(offered("A", &[], None)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn shipped_catalog_loads_cleanly_and_covers_legacy_ids() {
        let catalog = crate::data::missions::parse_mission_catalog(
            include_str!("../../assets/data/missions.json"),
            "assets/data/missions.json",
        )
        .expect("shipped catalog parses");
        let mut registry = MissionTypeRegistry::default();
        let report = registry.load_catalog(catalog);
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(registry.len(), LEGACY_MISSION_TYPE_IDS.len() - 1);

        let warnings = registry.check_consistency(|_| true).expect("consistent");
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(registry.from_legacy(7), MissionTypeId::new("MISSION_GET_BOOK"));
    }
}
