use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use bevy_utils::tracing::debug;
use bevy_utils::HashMap;

use crate::components::world::{FactionId, MissionId, MonsterId, NpcId, PlayerId, Tripoint};
use crate::simulation::mission_world::{MissionWorld, NpcAttitude};

pub const TOWN_TERRAIN: &str = "town";

#[derive(Debug, Clone)]
pub struct SandboxNpc {
    pub class: String,
    pub position: Tripoint,
    pub attitude: NpcAttitude,
    pub conditions: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SandboxMonster {
    pub id: MonsterId,
    pub monster_type: String,
    pub position: Tripoint,
    pub mission: Option<MissionId>,
}

#[derive(Debug, Clone)]
struct PlacedItem {
    item: String,
    at: Tripoint,
    mission: MissionId,
}

/// Self-contained stand-in for the npc, item, monster and overmap systems. Drives the debug
/// console and the engine tests.
#[derive(Resource, Debug, Clone, Default)]
pub struct SandboxWorld {
    turn: u64,
    players: HashMap<PlayerId, Tripoint>,
    terrain: HashMap<Tripoint, String>,
    revealed: BTreeSet<(i32, i32, i32)>,
    npcs: BTreeMap<NpcId, SandboxNpc>,
    next_npc: i32,
    inventories: HashMap<PlayerId, BTreeMap<String, u32>>,
    carried_mission_items: HashMap<(PlayerId, MissionId), u32>,
    placed_items: Vec<PlacedItem>,
    monsters: Vec<SandboxMonster>,
    next_monster: i32,
    standings: HashMap<FactionId, i32>,
}

impl SandboxWorld {
    pub fn set_turn(&mut self, turn: u64) {
        self.turn = turn;
    }

    pub fn set_player_position(&mut self, player: PlayerId, at: Tripoint) {
        self.players.insert(player, at);
    }

    pub fn set_terrain(&mut self, at: Tripoint, terrain: &str) {
        self.terrain.insert(at, terrain.to_string());
    }

    pub fn is_revealed(&self, at: Tripoint) -> bool {
        self.revealed.contains(&(at.x, at.y, at.z))
    }

    pub fn add_npc(&mut self, id: NpcId, class: &str, at: Tripoint) {
        self.npcs.insert(
            id,
            SandboxNpc {
                class: class.to_string(),
                position: at,
                attitude: NpcAttitude::Friendly,
                conditions: BTreeSet::new(),
            },
        );
    }

    pub fn npc(&self, id: NpcId) -> Option<&SandboxNpc> {
        self.npcs.get(&id)
    }

    pub fn npcs(&self) -> impl Iterator<Item = (&NpcId, &SandboxNpc)> {
        self.npcs.iter()
    }

    pub fn move_npc(&mut self, id: NpcId, at: Tripoint) -> bool {
        match self.npcs.get_mut(&id) {
            Some(npc) => {
                npc.position = at;
                true
            }
            None => false,
        }
    }

    pub fn monsters(&self) -> &[SandboxMonster] {
        &self.monsters
    }

    /// Removes a monster as if it died, returning it so the caller can report the death.
    pub fn take_monster(&mut self, id: MonsterId) -> Option<SandboxMonster> {
        let idx = self.monsters.iter().position(|monster| monster.id == id)?;
        Some(self.monsters.remove(idx))
    }

    /// Moves every item placed for `mission` within reach of the player into their inventory.
    pub fn pick_up_mission_items(&mut self, player: PlayerId, mission: MissionId) -> u32 {
        let Some(at) = self.players.get(&player).copied() else {
            return 0;
        };
        let (reached, kept): (Vec<_>, Vec<_>) = self
            .placed_items
            .drain(..)
            .partition(|placed| placed.mission == mission && placed.at.within(&at, 1));
        self.placed_items = kept;
        for placed in &reached {
            debug!(item = %placed.item, mission = mission.0, "picked up mission item");
        }
        let picked = reached.len() as u32;
        if picked > 0 {
            *self
                .carried_mission_items
                .entry((player, mission))
                .or_insert(0) += picked;
        }
        picked
    }

    pub fn standing(&self, faction: FactionId) -> i32 {
        self.standings.get(&faction).copied().unwrap_or(0)
    }

    pub fn inventory(&self, player: PlayerId) -> Vec<(String, u32)> {
        self.inventories
            .get(&player)
            .map(|items| {
                items
                    .iter()
                    .map(|(item, count)| (item.clone(), *count))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn allocate_npc_id(&mut self) -> NpcId {
        let floor = self.npcs.keys().next_back().map_or(0, |id| id.0 + 1);
        self.next_npc = self.next_npc.max(floor).max(1000);
        let id = NpcId(self.next_npc);
        self.next_npc += 1;
        id
    }
}

impl MissionWorld for SandboxWorld {
    fn current_turn(&self) -> u64 {
        self.turn
    }

    fn player_position(&self, player: PlayerId) -> Option<Tripoint> {
        self.players.get(&player).copied()
    }

    fn terrain_at(&self, at: Tripoint) -> Option<String> {
        self.terrain.get(&at).cloned()
    }

    fn find_terrain_near(&self, origin: Tripoint, terrain: &str, radius: i32) -> Option<Tripoint> {
        self.terrain
            .iter()
            .filter(|(_, kind)| kind.as_str() == terrain)
            .filter_map(|(at, _)| {
                let dist = origin.square_dist(at)?;
                (dist <= radius).then_some((dist, at.y, at.x, *at))
            })
            .min_by_key(|(dist, y, x, _)| (*dist, *y, *x))
            .map(|(_, _, _, at)| at)
    }

    fn is_near_town(&self, at: Tripoint, radius: i32) -> bool {
        self.find_terrain_near(at, TOWN_TERRAIN, radius).is_some()
    }

    fn reveal_terrain(&mut self, at: Tripoint, radius: i32) {
        for x in (at.x - radius)..=(at.x + radius) {
            for y in (at.y - radius)..=(at.y + radius) {
                self.revealed.insert((x, y, at.z));
            }
        }
    }

    fn npc_exists(&self, npc: NpcId) -> bool {
        self.npcs.contains_key(&npc)
    }

    fn npc_position(&self, npc: NpcId) -> Option<Tripoint> {
        self.npcs.get(&npc).map(|npc| npc.position)
    }

    fn npc_is_follower(&self, npc: NpcId) -> bool {
        self.npcs
            .get(&npc)
            .map_or(false, |npc| npc.attitude == NpcAttitude::Follow)
    }

    fn follower_count_of_class(&self, class: &str) -> usize {
        self.npcs
            .values()
            .filter(|npc| npc.class == class && npc.attitude == NpcAttitude::Follow)
            .count()
    }

    fn set_npc_attitude(&mut self, npc: NpcId, attitude: NpcAttitude) -> bool {
        match self.npcs.get_mut(&npc) {
            Some(npc) => {
                npc.attitude = attitude;
                true
            }
            None => false,
        }
    }

    fn set_npc_condition(&mut self, npc: NpcId, condition: &str, active: bool) -> bool {
        let Some(npc) = self.npcs.get_mut(&npc) else {
            return false;
        };
        if active {
            npc.conditions.insert(condition.to_string());
        } else {
            npc.conditions.remove(condition);
        }
        true
    }

    fn spawn_npc(&mut self, class: &str, at: Tripoint) -> Option<NpcId> {
        let id = self.allocate_npc_id();
        self.add_npc(id, class, at);
        debug!(npc = id.0, class, "sandbox npc spawned");
        Some(id)
    }

    fn kill_npc(&mut self, npc: NpcId) -> bool {
        self.npcs.remove(&npc).is_some()
    }

    fn item_count(&self, player: PlayerId, item: &str) -> u32 {
        self.inventories
            .get(&player)
            .and_then(|items| items.get(item))
            .copied()
            .unwrap_or(0)
    }

    fn mission_item_count(&self, player: PlayerId, mission: MissionId) -> u32 {
        self.carried_mission_items
            .get(&(player, mission))
            .copied()
            .unwrap_or(0)
    }

    fn remove_items(&mut self, player: PlayerId, item: &str, count: u32) -> u32 {
        let Some(items) = self.inventories.get_mut(&player) else {
            return 0;
        };
        let Some(held) = items.get_mut(item) else {
            return 0;
        };
        let removed = (*held).min(count);
        *held -= removed;
        if *held == 0 {
            items.remove(item);
        }
        removed
    }

    fn remove_mission_items(&mut self, player: PlayerId, mission: MissionId) -> u32 {
        self.carried_mission_items
            .remove(&(player, mission))
            .unwrap_or(0)
    }

    fn give_item(&mut self, player: PlayerId, item: &str, count: u32) {
        if count == 0 {
            return;
        }
        *self
            .inventories
            .entry(player)
            .or_default()
            .entry(item.to_string())
            .or_insert(0) += count;
    }

    fn place_mission_item(&mut self, item: &str, at: Tripoint, mission: MissionId) -> bool {
        self.placed_items.push(PlacedItem {
            item: item.to_string(),
            at,
            mission,
        });
        true
    }

    fn spawn_monster(
        &mut self,
        monster_type: &str,
        at: Tripoint,
        mission: MissionId,
    ) -> Option<MonsterId> {
        self.next_monster += 1;
        let id = MonsterId(self.next_monster);
        self.monsters.push(SandboxMonster {
            id,
            monster_type: monster_type.to_string(),
            position: at,
            mission: Some(mission),
        });
        Some(id)
    }

    fn mission_monster_near(&self, player: PlayerId, mission: MissionId) -> bool {
        let Some(at) = self.players.get(&player) else {
            return false;
        };
        self.monsters
            .iter()
            .any(|monster| monster.mission == Some(mission) && monster.position.within(at, 1))
    }

    fn adjust_faction_standing(&mut self, faction: FactionId, delta: i32) {
        *self.standings.entry(faction).or_insert(0) += delta;
    }
}
