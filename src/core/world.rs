use std::error::Error;
use std::io::BufRead;
use std::path::Path;

use bevy_ecs::prelude::*;

use crate::components::world::{Creature, MissionId, NpcId, PlayerId, Tripoint};
use crate::core::ecs::{create_schedule, create_world, MissionEventLog};
use crate::core::serialization::{load_state_from_path, save_state_to_path, MissionSaveState};
use crate::core::settings::EngineSettings;
use crate::data::missions::{load_mission_catalog, DataError, MissionCatalog, MissionOrigin};
use crate::simulation::directory::{MissionDirectory, MissionTransition};
use crate::simulation::legacy::{LegacyError, LegacyReport};
use crate::simulation::mission::{MissionError, MissionStatus};
use crate::simulation::mission_type::{
    ConsistencyError, ConsistencyProblem, LoadReport, MissionTypeId, MissionTypeRegistry,
};
use crate::simulation::sandbox::SandboxWorld;
use crate::simulation::time::GameTime;
use crate::world::MissionRepository;

/// Data snapshot returned to the console after each tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub time_str: String,
    pub events: Vec<String>,
    pub active: Vec<MissionSummary>,
}

#[derive(Debug, Clone)]
pub struct MissionSummary {
    pub uid: MissionId,
    pub name: String,
    pub status: MissionStatus,
    pub target: Option<Tripoint>,
    pub deadline: Option<u64>,
}

/// One independent engine: its own archetypes, instances, clock and collaborator.
/// Two sessions in one process never share state.
pub struct MissionSession {
    world: World,
    schedule: Schedule,
    settings: EngineSettings,
}

impl MissionSession {
    /// Create a session, loading the catalog named in the settings.
    pub fn new(settings: EngineSettings) -> Self {
        let world = create_world(&settings);
        let schedule = create_schedule();
        Self {
            world,
            schedule,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MissionTypeRegistry {
        self.world.resource::<MissionTypeRegistry>()
    }

    pub fn directory(&self) -> &MissionDirectory {
        self.world.resource::<MissionDirectory>()
    }

    pub fn sandbox(&self) -> &SandboxWorld {
        self.world.resource::<SandboxWorld>()
    }

    pub fn sandbox_mut(&mut self) -> Mut<'_, SandboxWorld> {
        self.world.resource_mut::<SandboxWorld>()
    }

    pub fn time(&self) -> &GameTime {
        self.world.resource::<GameTime>()
    }

    /// Adds every valid definition in the catalog to this session's registry.
    pub fn load_catalog(&mut self, catalog: MissionCatalog) -> LoadReport {
        self.world
            .resource_mut::<MissionTypeRegistry>()
            .load_catalog(catalog)
    }

    pub fn load_catalog_from_path(&mut self, path: impl AsRef<Path>) -> Result<LoadReport, DataError> {
        let catalog = load_mission_catalog(path)?;
        Ok(self.load_catalog(catalog))
    }

    pub fn check_consistency(&self) -> Result<Vec<ConsistencyProblem>, ConsistencyError> {
        self.registry()
            .check_consistency(|class| self.settings.is_known_class(class))
    }

    /// Clears instances and archetypes.
    pub fn reset(&mut self) {
        self.clear_instances();
        self.world.resource_mut::<MissionTypeRegistry>().reset();
    }

    pub fn clear_instances(&mut self) {
        self.world.resource_mut::<MissionDirectory>().clear_all();
        self.world.resource_mut::<MissionEventLog>().0.clear();
    }

    /// Run one game turn and return a snapshot for rendering.
    pub fn tick(&mut self) -> Snapshot {
        self.schedule.run(&mut self.world);
        let events = std::mem::take(&mut self.world.resource_mut::<MissionEventLog>().0);
        Snapshot::capture(&self.world, events)
    }

    pub fn reserve_new(
        &mut self,
        type_id: &MissionTypeId,
        npc: Option<NpcId>,
    ) -> Result<MissionId, MissionError> {
        self.with_missions(|registry, directory, _| {
            directory
                .reserve_new(registry, type_id, npc)
                .map(|mission| mission.get_id())
        })
    }

    pub fn reserve_random(
        &mut self,
        origin: MissionOrigin,
        at: Tripoint,
        npc: Option<NpcId>,
    ) -> Option<MissionId> {
        self.with_missions(|registry, directory, sandbox| {
            directory
                .reserve_random(registry, origin, at, npc, sandbox)
                .map(|mission| mission.get_id())
        })
    }

    pub fn assign(&mut self, id: MissionId, player: PlayerId) -> Result<MissionStatus, MissionError> {
        self.with_missions(|_, directory, sandbox| directory.assign(id, player, sandbox))
    }

    pub fn fail(&mut self, id: MissionId) -> Result<bool, MissionError> {
        self.with_missions(|_, directory, sandbox| directory.fail(id, sandbox))
    }

    pub fn step_complete(&mut self, id: MissionId, step: u32) -> Result<bool, MissionError> {
        self.with_missions(|_, directory, sandbox| directory.step_complete(id, step, sandbox))
    }

    pub fn wrap_up(&mut self, id: MissionId) -> Result<Option<MissionId>, MissionError> {
        self.with_missions(|registry, directory, sandbox| directory.wrap_up(id, registry, sandbox))
    }

    pub fn on_creature_death(&mut self, creature: &Creature) -> Vec<MissionTransition> {
        self.with_missions(|registry, directory, sandbox| {
            directory.on_creature_death(registry, creature, sandbox)
        })
    }

    /// Extract a serializable save state, stamped with the current turn.
    pub fn save_state(&self) -> MissionSaveState {
        let mut state = self.directory().serialize_all();
        state.turn = self.time().turn;
        state
    }

    /// Apply a saved state back into the live session. Returns how many missions were restored.
    pub fn load_state(&mut self, state: MissionSaveState) -> usize {
        let turn = state.turn;
        let restored = self.with_missions(|registry, directory, _| {
            directory.unserialize_all(state, registry)
        });
        self.world.insert_resource(GameTime::at_turn(turn));
        self.sandbox_mut().set_turn(turn);
        self.world.resource_mut::<MissionEventLog>().0.clear();
        restored
    }

    /// Save state directly to a file path.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        save_state_to_path(&self.save_state(), path)
    }

    /// Load state directly from a file path.
    pub fn load_from_path<P: AsRef<Path>>(&mut self, path: P) -> std::io::Result<usize> {
        let state = load_state_from_path(path)?;
        Ok(self.load_state(state))
    }

    pub fn save_to_db(
        &self,
        repository: &mut dyn MissionRepository,
    ) -> Result<(), Box<dyn Error>> {
        repository.save_state(&self.save_state())
    }

    /// `None` when the repository holds no save yet.
    pub fn load_from_db(
        &mut self,
        repository: &dyn MissionRepository,
    ) -> Result<Option<usize>, Box<dyn Error>> {
        Ok(repository.load_state()?.map(|state| self.load_state(state)))
    }

    /// Replaces the instances with missions migrated from a legacy stream.
    pub fn load_legacy<R: BufRead>(&mut self, reader: R) -> Result<LegacyReport, LegacyError> {
        let player = self.settings.legacy_player_id;
        self.with_missions(|registry, directory, _| {
            directory.unserialize_legacy(reader, registry, player)
        })
    }

    fn with_missions<R>(
        &mut self,
        f: impl FnOnce(&MissionTypeRegistry, &mut MissionDirectory, &mut SandboxWorld) -> R,
    ) -> R {
        self.world
            .resource_scope(|world, registry: Mut<MissionTypeRegistry>| {
                world.resource_scope(|world, mut directory: Mut<MissionDirectory>| {
                    let mut sandbox = world.resource_mut::<SandboxWorld>();
                    f(&*registry, &mut *directory, &mut *sandbox)
                })
            })
    }
}

impl Snapshot {
    fn capture(world: &World, events: Vec<String>) -> Self {
        let time_str = world.resource::<GameTime>().to_string();
        let active = world
            .resource::<MissionDirectory>()
            .get_all_active()
            .into_iter()
            .map(|mission| MissionSummary {
                uid: mission.get_id(),
                name: mission.name().to_string(),
                status: mission.status(),
                target: mission.get_target(),
                deadline: mission.get_deadline(),
            })
            .collect();

        Snapshot {
            time_str,
            events,
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::missions::{parse_mission_catalog, MissionGoal, MissionTypeDefinition};
    use crate::world::MissionDb;

    fn settings() -> EngineSettings {
        EngineSettings {
            catalog_path: "./does/not/exist.json".into(),
            seed: 11,
            ..EngineSettings::default()
        }
    }

    fn fresh_session() -> MissionSession {
        let mut session = MissionSession::new(settings());
        let mut fetch = MissionTypeDefinition::new("FETCH", "Fetch", MissionGoal::FindItem);
        fetch.item_id = Some("rope".to_string());
        fetch.deadline_high = 30;
        fetch.follow_up = Some("TALK".to_string());
        let talk = MissionTypeDefinition::new("TALK", "Talk", MissionGoal::ComputerToggle);
        let report = session.load_catalog(MissionCatalog {
            schema_version: 1,
            missions: vec![fetch, talk],
        });
        assert!(report.is_clean());
        session
            .sandbox_mut()
            .add_npc(NpcId(2), "NC_TRADER", Tripoint::new(4, 4, 0));
        session
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut first = fresh_session();
        let second = MissionSession::new(settings());

        first
            .reserve_new(&MissionTypeId::new("FETCH"), Some(NpcId(2)))
            .expect("reserve");
        assert_eq!(first.directory().len(), 1);
        assert_eq!(first.registry().len(), 2);
        assert!(second.directory().is_empty());
        assert!(second.registry().is_empty());
    }

    #[test]
    fn wrap_up_chains_the_follow_up_through_the_session() {
        let mut session = fresh_session();
        let uid = session
            .reserve_new(&MissionTypeId::new("FETCH"), Some(NpcId(2)))
            .expect("reserve");
        session.assign(uid, PlayerId(1)).expect("assign");
        let follow_up = session.wrap_up(uid).expect("wrap").expect("chained");

        let chained = session.directory().find(follow_up).expect("follow-up");
        assert_eq!(chained.get_type().id, MissionTypeId::new("TALK"));
        assert_eq!(chained.get_assigned_player_id(), Some(PlayerId(1)));
        assert_eq!(chained.get_npc_id(), Some(NpcId(2)));
        assert!(matches!(
            session.wrap_up(uid),
            Err(MissionError::InvalidState { .. })
        ));
    }

    #[test]
    fn json_state_restores_missions_and_clock() {
        let mut session = fresh_session();
        let uid = session
            .reserve_new(&MissionTypeId::new("FETCH"), Some(NpcId(2)))
            .expect("reserve");
        session.assign(uid, PlayerId(1)).expect("assign");
        for _ in 0..5 {
            session.tick();
        }
        let state = session.save_state();
        assert_eq!(state.turn, 5);

        let mut restored = fresh_session();
        assert_eq!(restored.load_state(state.clone()), 1);
        assert_eq!(restored.time().turn, 5);
        assert_eq!(restored.save_state(), state);
    }

    #[test]
    fn deadline_failures_show_up_in_tick_events() {
        let mut session = fresh_session();
        let uid = session
            .reserve_new(&MissionTypeId::new("FETCH"), Some(NpcId(2)))
            .expect("reserve");
        session.assign(uid, PlayerId(1)).expect("assign");

        let mut events = Vec::new();
        for _ in 0..32 {
            let snapshot = session.tick();
            events.extend(snapshot.events);
        }
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("deadline passed"));
        assert!(session.directory().get_all_active().is_empty());
    }

    #[test]
    fn database_round_trip_through_the_repository_trait() {
        let mut session = fresh_session();
        let uid = session
            .reserve_new(&MissionTypeId::new("FETCH"), Some(NpcId(2)))
            .expect("reserve");
        session.assign(uid, PlayerId(1)).expect("assign");
        session.tick();

        let mut db = MissionDb::open_in_memory().expect("db");
        let mut empty = fresh_session();
        assert_eq!(empty.load_from_db(&db).expect("load"), None);

        session.save_to_db(&mut db).expect("save");
        assert_eq!(empty.load_from_db(&db).expect("load"), Some(1));
        assert_eq!(empty.save_state(), session.save_state());
    }

    #[test]
    fn legacy_saves_bind_to_the_configured_player() {
        let mut session = MissionSession::new(EngineSettings {
            legacy_player_id: PlayerId(7),
            ..settings()
        });
        let catalog = parse_mission_catalog(
            r#"{ "schema_version": 1, "missions": [
                { "id": "MISSION_GET_BOOK", "name": "Library", "goal": "FIND_ITEM", "item_id": "book" }
            ] }"#,
            "inline",
        )
        .expect("catalog");
        session.load_catalog(catalog);

        let stream = "1\n7 Find me a book <> 0 150 1 50 NULL NULL 12 40 -20 book 1 9000 3 -1 -1 0 -1 -1\n";
        let report = session.load_legacy(Cursor::new(stream)).expect("legacy");
        assert_eq!(report.loaded, 1);
        let mission = session.directory().find(MissionId(12)).expect("migrated");
        assert_eq!(mission.get_assigned_player_id(), Some(PlayerId(7)));

        let next = session
            .reserve_new(&MissionTypeId::new("MISSION_GET_BOOK"), None)
            .expect("reserve");
        assert_eq!(next, MissionId(13));
    }

    #[test]
    fn reset_drops_archetypes_and_instances() {
        let mut session = fresh_session();
        session
            .reserve_new(&MissionTypeId::new("TALK"), None)
            .expect("reserve");
        session.reset();
        assert!(session.registry().is_empty());
        assert!(session.directory().is_empty());
        assert!(matches!(
            session.reserve_new(&MissionTypeId::new("TALK"), None),
            Err(MissionError::UnknownType(_))
        ));
    }
}
