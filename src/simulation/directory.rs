use std::io::BufRead;

use bevy_ecs::prelude::*;
use bevy_utils::tracing::{debug, info, warn};
use bevy_utils::hashbrown::hash_map::Entry;
use bevy_utils::HashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::components::world::{Creature, MissionId, NpcId, PlayerId, Tripoint};
use crate::core::serialization::{apply_mission_state, extract_mission_state, MissionSaveState};
use crate::data::missions::{MissionGoal, MissionOrigin};
use crate::simulation::behavior::BehaviorTuning;
use crate::simulation::legacy::{self, LegacyError, LegacyReport};
use crate::simulation::mission::{Mission, MissionError, MissionStatus};
use crate::simulation::mission_type::{MissionTypeId, MissionTypeRegistry};
use crate::simulation::mission_world::MissionWorld;

/// A status change applied by a sweep or a death callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionTransition {
    pub uid: MissionId,
    pub type_id: MissionTypeId,
    pub status: MissionStatus,
    pub reason: &'static str,
}

impl MissionTransition {
    fn of(mission: &Mission, reason: &'static str) -> Self {
        Self {
            uid: mission.get_id(),
            type_id: mission.get_type().id.clone(),
            status: mission.status(),
            reason,
        }
    }
}

/// Follow-up waiting to be created once the current sweep has let go of the collection.
struct PendingFollowUp {
    parent: MissionId,
    type_id: MissionTypeId,
    player: PlayerId,
    npc: Option<NpcId>,
}

enum DeathEffect {
    Unrelated,
    Complete(&'static str),
    CountKill,
    Fail(&'static str),
}

/// Owns every live mission instance. Lookups are by id; sweeps walk creation order.
#[derive(Resource, Debug, Clone)]
pub struct MissionDirectory {
    missions: HashMap<MissionId, Mission>,
    order: Vec<MissionId>,
    next_id: u32,
    rng: ChaCha8Rng,
    tuning: BehaviorTuning,
}

impl Default for MissionDirectory {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl MissionDirectory {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            missions: HashMap::default(),
            order: Vec::new(),
            next_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tuning: BehaviorTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: BehaviorTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Highest id handed out so far.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn bump_to_at_least(&mut self, id: u32) {
        self.next_id = self.next_id.max(id);
    }

    fn allocate_id(&mut self) -> Result<MissionId, MissionError> {
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(MissionError::IdsExhausted)?;
        Ok(MissionId(self.next_id))
    }

    fn insert(&mut self, mission: Mission) -> &mut Mission {
        let uid = mission.get_id();
        match self.missions.entry(uid) {
            Entry::Occupied(mut slot) => {
                slot.insert(mission);
                slot.into_mut()
            }
            Entry::Vacant(slot) => {
                self.order.push(uid);
                slot.insert(mission)
            }
        }
    }

    pub fn reserve_new(
        &mut self,
        registry: &MissionTypeRegistry,
        type_id: &MissionTypeId,
        npc: Option<NpcId>,
    ) -> Result<&mut Mission, MissionError> {
        let mission_type = registry
            .get(type_id)
            .filter(|mission_type| !mission_type.id.is_null())
            .cloned()
            .ok_or_else(|| MissionError::UnknownType(type_id.clone()))?;
        let uid = self.allocate_id()?;
        debug!(uid = uid.0, mission_type = %type_id, "mission reserved");
        Ok(self.insert(mission_type.instantiate(uid, npc)))
    }

    /// Offers a random archetype for `origin` around `at`. `None` when nothing matches.
    pub fn reserve_random(
        &mut self,
        registry: &MissionTypeRegistry,
        origin: MissionOrigin,
        at: Tripoint,
        npc: Option<NpcId>,
        world: &dyn MissionWorld,
    ) -> Option<&mut Mission> {
        let type_id = registry.get_random_id(origin, at, world, &mut self.rng);
        if type_id.is_null() {
            debug!(?origin, %at, "no mission type offered here");
            return None;
        }
        let mission = self.reserve_new(registry, &type_id, npc).ok()?;
        mission.offered_at = Some(at);
        Some(mission)
    }

    pub fn find(&self, id: MissionId) -> Option<&Mission> {
        self.missions.get(&id)
    }

    pub fn find_mut(&mut self, id: MissionId) -> Option<&mut Mission> {
        self.missions.get_mut(&id)
    }

    /// Resolves every known id, silently skipping the rest.
    pub fn find_many(&self, ids: &[MissionId]) -> Vec<&Mission> {
        ids.iter().filter_map(|id| self.missions.get(id)).collect()
    }

    pub fn to_uid_vector(missions: &[&Mission]) -> Vec<MissionId> {
        missions.iter().map(|mission| mission.get_id()).collect()
    }

    /// Every instance in creation order.
    pub fn missions(&self) -> impl Iterator<Item = &Mission> {
        self.order.iter().filter_map(|id| self.missions.get(id))
    }

    pub fn get_all_active(&self) -> Vec<&Mission> {
        self.missions().filter(|mission| mission.in_progress()).collect()
    }

    /// Registers an instance built elsewhere (load paths). Replaces one with the same id.
    pub fn add_existing(&mut self, mission: Mission) {
        self.bump_to_at_least(mission.get_id().0);
        if self.missions.contains_key(&mission.get_id()) {
            warn!(uid = mission.get_id().0, "replacing mission with the same id");
        }
        self.insert(mission);
    }

    pub fn assign(
        &mut self,
        id: MissionId,
        player: PlayerId,
        world: &mut dyn MissionWorld,
    ) -> Result<MissionStatus, MissionError> {
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        if !mission.is_assigned() && mission.status() == MissionStatus::YetToStart {
            if let Some(at) = mission.offered_at {
                if !mission.get_type().place.accepts(at, world, &self.tuning) {
                    return Err(MissionError::PlacementRejected { uid: id, at });
                }
            }
        }
        let status = mission.assign(player, world, &mut self.rng, &self.tuning)?;
        debug!(uid = id.0, player = player.0, %status, "mission assigned");
        Ok(status)
    }

    pub fn fail(&mut self, id: MissionId, world: &mut dyn MissionWorld) -> Result<bool, MissionError> {
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        Ok(mission.fail(world))
    }

    pub fn step_complete(
        &mut self,
        id: MissionId,
        step: u32,
        world: &dyn MissionWorld,
    ) -> Result<bool, MissionError> {
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        Ok(mission.step_complete(step, world))
    }

    /// Completes a running mission and, when it chains, starts the follow-up for the same
    /// holder and giver. Returns the follow-up's id.
    pub fn wrap_up(
        &mut self,
        id: MissionId,
        registry: &MissionTypeRegistry,
        world: &mut dyn MissionWorld,
    ) -> Result<Option<MissionId>, MissionError> {
        let mission = self
            .missions
            .get_mut(&id)
            .ok_or(MissionError::UnknownMission(id))?;
        let pending = complete(mission, world)?;
        Ok(pending.and_then(|pending| self.start_follow_up(registry, pending, world)))
    }

    /// Once-per-turn sweep over running missions: deadlines, lost references, and goals that
    /// finish without a hand-in. Follow-ups are created after the sweep.
    pub fn process_all(
        &mut self,
        registry: &MissionTypeRegistry,
        world: &mut dyn MissionWorld,
    ) -> Vec<MissionTransition> {
        let now = world.current_turn();
        let mut transitions = Vec::new();
        let mut pending = Vec::new();

        for uid in &self.order {
            let Some(mission) = self.missions.get_mut(uid) else {
                continue;
            };
            if !mission.in_progress() {
                continue;
            }
            if mission.deadline_passed(now) {
                mission.fail(world);
                transitions.push(MissionTransition::of(mission, "deadline passed"));
            } else if let Some(reason) = mission.lost_reference(world) {
                mission.fail(world);
                transitions.push(MissionTransition::of(mission, reason));
            } else if mission.resolves_automatically() && mission.goal_satisfied(world) {
                if let Ok(follow_up) = complete(mission, world) {
                    pending.extend(follow_up);
                    transitions.push(MissionTransition::of(mission, "goal reached"));
                }
            }
        }

        log_transitions(&transitions);
        for follow_up in pending {
            self.start_follow_up(registry, follow_up, world);
        }
        transitions
    }

    /// Death callback for every creature, mission-related or not.
    pub fn on_creature_death(
        &mut self,
        registry: &MissionTypeRegistry,
        creature: &Creature,
        world: &mut dyn MissionWorld,
    ) -> Vec<MissionTransition> {
        let mut transitions = Vec::new();
        let mut pending = Vec::new();

        for uid in &self.order {
            let Some(mission) = self.missions.get_mut(uid) else {
                continue;
            };
            if !mission.in_progress() {
                continue;
            }
            match death_effect(mission, creature) {
                DeathEffect::Unrelated => {}
                DeathEffect::Complete(reason) => {
                    mission.step_complete(1, world);
                    if let Ok(follow_up) = complete(mission, world) {
                        pending.extend(follow_up);
                        transitions.push(MissionTransition::of(mission, reason));
                    }
                }
                DeathEffect::CountKill => {
                    mission.count_kill();
                    if mission.resolves_automatically() && mission.goal_satisfied(world) {
                        if let Ok(follow_up) = complete(mission, world) {
                            pending.extend(follow_up);
                            transitions.push(MissionTransition::of(mission, "kill count reached"));
                        }
                    }
                }
                DeathEffect::Fail(reason) => {
                    mission.fail(world);
                    transitions.push(MissionTransition::of(mission, reason));
                }
            }
        }

        log_transitions(&transitions);
        for follow_up in pending {
            self.start_follow_up(registry, follow_up, world);
        }
        transitions
    }

    /// Drops every instance. Ids keep counting up so none is reused in this run.
    pub fn clear_all(&mut self) {
        self.missions.clear();
        self.order.clear();
    }

    pub fn serialize_all(&self) -> MissionSaveState {
        extract_mission_state(self)
    }

    /// Replaces the directory contents with a save. Returns how many missions were restored.
    pub fn unserialize_all(&mut self, state: MissionSaveState, registry: &MissionTypeRegistry) -> usize {
        apply_mission_state(state, self, registry)
    }

    /// Replaces the directory contents with missions migrated from the legacy stream format.
    pub fn unserialize_legacy<R: BufRead>(
        &mut self,
        reader: R,
        registry: &MissionTypeRegistry,
        legacy_player_id: PlayerId,
    ) -> Result<LegacyReport, LegacyError> {
        let (missions, report) = legacy::unserialize_legacy(reader, registry, legacy_player_id)?;
        self.clear_all();
        for mission in missions {
            self.add_existing(mission);
        }
        Ok(report)
    }

    fn start_follow_up(
        &mut self,
        registry: &MissionTypeRegistry,
        pending: PendingFollowUp,
        world: &mut dyn MissionWorld,
    ) -> Option<MissionId> {
        let Some(mission_type) = registry
            .get(&pending.type_id)
            .filter(|mission_type| !mission_type.id.is_null())
            .cloned()
        else {
            warn!(
                parent = pending.parent.0,
                follow_up = %pending.type_id,
                "follow-up mission type is not loaded"
            );
            return None;
        };

        let uid = match self.allocate_id() {
            Ok(uid) => uid,
            Err(err) => {
                warn!(parent = pending.parent.0, "follow-up not created: {}", err);
                return None;
            }
        };
        let mut mission = mission_type.instantiate(uid, pending.npc);
        match mission.assign(pending.player, world, &mut self.rng, &self.tuning) {
            Ok(status) => info!(
                parent = pending.parent.0,
                uid = uid.0,
                mission_type = %pending.type_id,
                %status,
                "follow-up mission started"
            ),
            Err(err) => warn!(parent = pending.parent.0, "follow-up not assigned: {}", err),
        }
        self.insert(mission);
        Some(uid)
    }
}

/// Wraps up and captures what the follow-up needs, so it can be created later.
fn complete(
    mission: &mut Mission,
    world: &mut dyn MissionWorld,
) -> Result<Option<PendingFollowUp>, MissionError> {
    let follow_up = mission.wrap_up(world)?;
    Ok(follow_up.and_then(|type_id| {
        Some(PendingFollowUp {
            parent: mission.get_id(),
            type_id,
            player: mission.get_assigned_player_id()?,
            npc: mission.get_npc_id(),
        })
    }))
}

fn death_effect(mission: &Mission, creature: &Creature) -> DeathEffect {
    match creature {
        Creature::Npc { id } => {
            let id = Some(*id);
            match mission.goal() {
                MissionGoal::Assassinate if mission.get_target_npc_id() == id => {
                    DeathEffect::Complete("target assassinated")
                }
                _ if mission.get_npc_id() == id => DeathEffect::Fail("quest giver died"),
                MissionGoal::FindNpc | MissionGoal::RecruitNpc
                    if mission.get_target_npc_id() == id =>
                {
                    DeathEffect::Fail("target npc died")
                }
                _ => DeathEffect::Unrelated,
            }
        }
        Creature::Monster {
            monster_type,
            mission: spawned_for,
            ..
        } => {
            let ours = *spawned_for == Some(mission.get_id());
            match mission.goal() {
                MissionGoal::KillMonster if ours => DeathEffect::Complete("target monster killed"),
                MissionGoal::FindMonster if ours => DeathEffect::Fail("lost animal died"),
                MissionGoal::KillMonsterType
                    if mission.get_monster_type() == Some(monster_type.as_str()) =>
                {
                    DeathEffect::CountKill
                }
                _ => DeathEffect::Unrelated,
            }
        }
    }
}

fn log_transitions(transitions: &[MissionTransition]) {
    for transition in transitions {
        info!(
            uid = transition.uid.0,
            mission_type = %transition.type_id,
            status = %transition.status,
            "{}",
            transition.reason
        );
    }
}
