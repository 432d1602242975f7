use bevy_ecs::prelude::*;
use bevy_ecs::schedule::SystemSet;
use bevy_utils::tracing::warn;

use crate::core::settings::EngineSettings;
use crate::data::missions::load_mission_catalog;
use crate::simulation::directory::{MissionDirectory, MissionTransition};
use crate::simulation::mission_type::MissionTypeRegistry;
use crate::simulation::sandbox::SandboxWorld;
use crate::simulation::time::{advance_time_system, GameTime};

/// Canonical tick ordering for the simulation.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum TickSet {
    Simulation,
    Time,
}

/// Human-readable lines describing the transitions applied this tick.
#[derive(Resource, Default, Debug)]
pub struct MissionEventLog(pub Vec<String>);

impl MissionEventLog {
    pub fn record(&mut self, transition: &MissionTransition) {
        self.0.push(format!(
            "{} [{}] -> {} ({})",
            transition.uid, transition.type_id, transition.status, transition.reason
        ));
    }
}

/// Build the ECS world with baseline resources.
pub fn create_world(settings: &EngineSettings) -> World {
    let mut world = World::new();
    world.insert_resource(GameTime::default());
    world.insert_resource(load_registry(settings));
    world.insert_resource(MissionDirectory::with_seed(settings.seed).with_tuning(settings.tuning()));
    world.insert_resource(MissionEventLog::default());
    world.insert_resource(SandboxWorld::default());
    world
}

/// Build the system schedule in the canonical order.
pub fn create_schedule() -> Schedule {
    let mut schedule = Schedule::default();

    schedule.configure_sets((TickSet::Simulation, TickSet::Time).chain());

    schedule.add_systems((
        mission_sweep_system.in_set(TickSet::Simulation),
        advance_time_system.in_set(TickSet::Time),
    ));

    schedule
}

/// System: once-per-turn sweep over running missions.
pub fn mission_sweep_system(
    registry: Res<MissionTypeRegistry>,
    mut directory: ResMut<MissionDirectory>,
    mut sandbox: ResMut<SandboxWorld>,
    mut log: ResMut<MissionEventLog>,
) {
    for transition in directory.process_all(&registry, &mut *sandbox) {
        log.record(&transition);
    }
}

fn load_registry(settings: &EngineSettings) -> MissionTypeRegistry {
    let mut registry = MissionTypeRegistry::with_tuning(settings.tuning());
    match load_mission_catalog(&settings.catalog_path) {
        Ok(catalog) => {
            registry.load_catalog(catalog);
        }
        Err(err) => warn!("failed to load mission catalog: {}", err),
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::world::{NpcId, PlayerId, Tripoint};
    use crate::data::missions::{MissionGoal, MissionTypeDefinition};
    use crate::simulation::mission::MissionStatus;
    use crate::simulation::mission_type::MissionTypeId;

    fn settings() -> EngineSettings {
        EngineSettings {
            catalog_path: "./does/not/exist.json".into(),
            ..EngineSettings::default()
        }
    }

    #[test]
    fn missing_catalog_leaves_an_empty_registry() {
        let world = create_world(&settings());
        assert!(world.resource::<MissionTypeRegistry>().is_empty());
        assert!(world.resource::<MissionDirectory>().is_empty());
        assert_eq!(world.resource::<GameTime>().turn, 0);
    }

    #[test]
    fn schedule_sweeps_then_advances_time() {
        let mut world = create_world(&settings());
        let mut def = MissionTypeDefinition::new("RUN", "Errand", MissionGoal::FindItem);
        def.item_id = Some("lighter".to_string());
        def.deadline_high = 1;
        world
            .resource_mut::<MissionTypeRegistry>()
            .load(def)
            .expect("valid");
        world
            .resource_mut::<SandboxWorld>()
            .add_npc(NpcId(1), "NC_NONE", Tripoint::new(0, 0, 0));

        world.resource_scope(|world, registry: Mut<MissionTypeRegistry>| {
            world.resource_scope(|world, mut directory: Mut<MissionDirectory>| {
                let mut sandbox = world.resource_mut::<SandboxWorld>();
                let uid = directory
                    .reserve_new(&registry, &MissionTypeId::new("RUN"), Some(NpcId(1)))
                    .expect("reserve")
                    .get_id();
                directory
                    .assign(uid, PlayerId(1), &mut *sandbox)
                    .expect("assign");
            });
        });

        let mut schedule = create_schedule();
        schedule.run(&mut world);
        schedule.run(&mut world);
        assert!(world.resource::<MissionEventLog>().0.is_empty());
        assert_eq!(world.resource::<GameTime>().turn, 2);

        schedule.run(&mut world);
        let log = &world.resource::<MissionEventLog>().0;
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("deadline passed"));
        let directory = world.resource::<MissionDirectory>();
        let mission = directory.missions().next().expect("mission");
        assert_eq!(mission.status(), MissionStatus::Failure);
    }
}
