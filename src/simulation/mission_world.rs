use crate::components::world::{FactionId, MissionId, MonsterId, NpcId, PlayerId, Tripoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcAttitude {
    Follow,
    /// Neutral stranger, friendly toward the player.
    Friendly,
    Leave,
    Hostile,
}

/// Everything the mission engine needs from the systems that own NPCs, items, monsters and the
/// overmap. Lookups report absence instead of failing: the referenced entity may be gone.
pub trait MissionWorld {
    fn current_turn(&self) -> u64;

    fn player_position(&self, player: PlayerId) -> Option<Tripoint>;
    fn terrain_at(&self, at: Tripoint) -> Option<String>;
    /// Closest tile of the given terrain type within `radius` of `origin`.
    fn find_terrain_near(&self, origin: Tripoint, terrain: &str, radius: i32) -> Option<Tripoint>;
    fn is_near_town(&self, at: Tripoint, radius: i32) -> bool;
    fn reveal_terrain(&mut self, at: Tripoint, radius: i32);

    fn npc_exists(&self, npc: NpcId) -> bool;
    fn npc_position(&self, npc: NpcId) -> Option<Tripoint>;
    fn npc_is_follower(&self, npc: NpcId) -> bool;
    fn follower_count_of_class(&self, class: &str) -> usize;
    fn set_npc_attitude(&mut self, npc: NpcId, attitude: NpcAttitude) -> bool;
    fn set_npc_condition(&mut self, npc: NpcId, condition: &str, active: bool) -> bool;
    fn spawn_npc(&mut self, class: &str, at: Tripoint) -> Option<NpcId>;
    fn kill_npc(&mut self, npc: NpcId) -> bool;

    fn item_count(&self, player: PlayerId, item: &str) -> u32;
    fn mission_item_count(&self, player: PlayerId, mission: MissionId) -> u32;
    /// Returns how many items were actually removed.
    fn remove_items(&mut self, player: PlayerId, item: &str, count: u32) -> u32;
    fn remove_mission_items(&mut self, player: PlayerId, mission: MissionId) -> u32;
    fn give_item(&mut self, player: PlayerId, item: &str, count: u32);
    fn place_mission_item(&mut self, item: &str, at: Tripoint, mission: MissionId) -> bool;

    fn spawn_monster(&mut self, monster_type: &str, at: Tripoint, mission: MissionId)
        -> Option<MonsterId>;
    fn mission_monster_near(&self, player: PlayerId, mission: MissionId) -> bool;

    fn adjust_faction_standing(&mut self, faction: FactionId, delta: i32);
}
