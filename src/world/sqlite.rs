use std::path::Path;

use bevy_utils::tracing::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::components::world::{FactionId, MissionId, NpcId, PlayerId, Tripoint};
use crate::core::serialization::{apply_mission_state, extract_mission_state, MissionRecord, MissionSaveState};
use crate::simulation::directory::MissionDirectory;
use crate::simulation::mission::{
    status_from_string, status_to_string, MissionReward, MissionStatus, RewardKind,
};
use crate::simulation::mission_type::{MissionTypeId, MissionTypeRegistry};

const MISSION_SCHEMA_VERSION: i64 = 1;
const MISSION_SAVE_VERSION: i64 = 1;

const MISSION_DB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mission_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  schema_version INTEGER NOT NULL,
  save_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS mission_state (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  next_id INTEGER NOT NULL,
  turn INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS missions (
  uid INTEGER PRIMARY KEY,
  type_id TEXT NOT NULL,
  status TEXT NOT NULL,
  description TEXT NOT NULL,
  value INTEGER NOT NULL,
  reward_kind TEXT NOT NULL,
  reward_amount INTEGER NOT NULL,
  reward_item TEXT,
  reward_skill TEXT,
  target_x INTEGER,
  target_y INTEGER,
  target_z INTEGER,
  item_id TEXT,
  item_count INTEGER NOT NULL,
  target_id TEXT,
  recruit_class TEXT,
  target_npc_id INTEGER,
  monster_type TEXT,
  monster_kill_goal INTEGER,
  deadline INTEGER,
  npc_id INTEGER,
  good_faction INTEGER,
  bad_faction INTEGER,
  step INTEGER NOT NULL,
  follow_up TEXT,
  player_id INTEGER,
  offered_x INTEGER,
  offered_y INTEGER,
  offered_z INTEGER
);
"#;

const MISSION_COLUMNS: &str = "uid, type_id, status, description, value, reward_kind, reward_amount, reward_item, reward_skill, target_x, target_y, target_z, item_id, item_count, target_id, recruit_class, target_npc_id, monster_type, monster_kill_goal, deadline, npc_id, good_faction, bad_faction, step, follow_up, player_id, offered_x, offered_y, offered_z";

#[derive(Debug, Error)]
pub enum MissionDbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    InvalidData(String),
    #[error("mission_meta version mismatch (schema {schema}, save {save}, expected {expected_schema}, {expected_save})")]
    VersionMismatch {
        schema: i64,
        save: i64,
        expected_schema: i64,
        expected_save: i64,
    },
}

fn reward_kind_to_str(kind: RewardKind) -> &'static str {
    match kind {
        RewardKind::None => "NONE",
        RewardKind::Cash => "CASH",
        RewardKind::Item => "ITEM",
        RewardKind::Skill => "SKILL",
    }
}

fn reward_kind_from_str(value: &str) -> Result<RewardKind, MissionDbError> {
    match value {
        "NONE" => Ok(RewardKind::None),
        "CASH" => Ok(RewardKind::Cash),
        "ITEM" => Ok(RewardKind::Item),
        "SKILL" => Ok(RewardKind::Skill),
        _ => Err(MissionDbError::InvalidData(format!(
            "unknown reward kind {}",
            value
        ))),
    }
}

fn mission_status_from_str(value: &str) -> Result<MissionStatus, MissionDbError> {
    status_from_string(value)
        .ok_or_else(|| MissionDbError::InvalidData(format!("unknown mission status {}", value)))
}

fn point_column(point: Option<Tripoint>, axis: fn(&Tripoint) -> i32) -> Option<i64> {
    point.map(|p| axis(&p) as i64)
}

fn point_from_columns(row: &Row<'_>, first: usize) -> rusqlite::Result<Option<Tripoint>> {
    let x: Option<i64> = row.get(first)?;
    let y: Option<i64> = row.get(first + 1)?;
    let z: Option<i64> = row.get(first + 2)?;
    Ok(match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Some(Tripoint::new(x as i32, y as i32, z as i32)),
        _ => None,
    })
}

/// SQLite store for the mission directory: one row per instance plus the id counter.
pub struct MissionDb {
    conn: Connection,
}

impl MissionDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MissionDbError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, MissionDbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MissionDbError> {
        let mut db = Self { conn };
        db.conn.execute_batch(MISSION_DB_SCHEMA)?;
        db.ensure_mission_meta()?;
        Ok(db)
    }

    pub fn load_state(&self) -> Result<Option<MissionSaveState>, MissionDbError> {
        let header = self
            .conn
            .query_row(
                "SELECT next_id, turn FROM mission_state WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        let Some((next_id, turn)) = header else {
            return Ok(None);
        };

        let next_id = u32::try_from(next_id)
            .map_err(|_| MissionDbError::InvalidData(format!("next_id {} out of range", next_id)))?;

        Ok(Some(MissionSaveState {
            version: MISSION_SAVE_VERSION as u32,
            next_id,
            turn: turn as u64,
            missions: self.load_missions()?,
        }))
    }

    pub fn save_state(&mut self, state: &MissionSaveState) -> Result<(), MissionDbError> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM mission_state", [])?;
        tx.execute(
            "INSERT INTO mission_state (id, next_id, turn) VALUES (1, ?1, ?2)",
            params![state.next_id as i64, state.turn as i64],
        )?;

        tx.execute("DELETE FROM missions", [])?;
        for record in &state.missions {
            tx.execute(
                &format!(
                    "INSERT INTO missions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)",
                    MISSION_COLUMNS
                ),
                params![
                    record.uid.0 as i64,
                    record.type_id.as_str(),
                    status_to_string(record.status),
                    record.description.as_str(),
                    record.value as i64,
                    reward_kind_to_str(record.reward.kind),
                    record.reward.amount as i64,
                    record.reward.item_id.as_deref(),
                    record.reward.skill.as_deref(),
                    point_column(record.target, |p| p.x),
                    point_column(record.target, |p| p.y),
                    point_column(record.target, |p| p.z),
                    record.item_id.as_deref(),
                    record.item_count as i64,
                    record.target_id.as_deref(),
                    record.recruit_class.as_deref(),
                    record.target_npc_id.map(|npc| npc.0 as i64),
                    record.monster_type.as_deref(),
                    record.monster_kill_goal.map(|goal| goal as i64),
                    record.deadline.map(|deadline| deadline as i64),
                    record.npc_id.map(|npc| npc.0 as i64),
                    record.good_faction.map(|fac| fac.0 as i64),
                    record.bad_faction.map(|fac| fac.0 as i64),
                    record.step as i64,
                    record.follow_up.as_ref().map(|id| id.as_str()),
                    record.player_id.map(|player| player.0 as i64),
                    point_column(record.offered_at, |p| p.x),
                    point_column(record.offered_at, |p| p.y),
                    point_column(record.offered_at, |p| p.z),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn save_directory(
        &mut self,
        directory: &MissionDirectory,
        turn: u64,
    ) -> Result<(), MissionDbError> {
        let mut state = extract_mission_state(directory);
        state.turn = turn;
        self.save_state(&state)
    }

    /// Restores the directory from the database. `None` when nothing has been saved yet.
    pub fn load_directory(
        &self,
        directory: &mut MissionDirectory,
        registry: &MissionTypeRegistry,
    ) -> Result<Option<usize>, MissionDbError> {
        Ok(self
            .load_state()?
            .map(|state| apply_mission_state(state, directory, registry)))
    }

    fn ensure_mission_meta(&mut self) -> Result<(), MissionDbError> {
        let meta = self
            .conn
            .query_row(
                "SELECT schema_version, save_version FROM mission_meta WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match meta {
            Some((schema, save)) => {
                if schema != MISSION_SCHEMA_VERSION || save != MISSION_SAVE_VERSION {
                    return Err(MissionDbError::VersionMismatch {
                        schema,
                        save,
                        expected_schema: MISSION_SCHEMA_VERSION,
                        expected_save: MISSION_SAVE_VERSION,
                    });
                }
            }
            None => {
                self.conn.execute(
                    "INSERT INTO mission_meta (id, schema_version, save_version) VALUES (1, ?1, ?2)",
                    params![MISSION_SCHEMA_VERSION, MISSION_SAVE_VERSION],
                )?;
            }
        }

        Ok(())
    }

    fn load_missions(&self) -> Result<Vec<MissionRecord>, MissionDbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM missions ORDER BY uid",
            MISSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| {
            let uid: i64 = row.get(0)?;
            let status: String = row.get(2)?;
            let reward_kind: String = row.get(5)?;
            let record = MissionRecord {
                uid: MissionId(0),
                type_id: MissionTypeId(row.get(1)?),
                status: MissionStatus::YetToStart,
                description: row.get(3)?,
                value: row.get::<_, i64>(4)? as u64,
                reward: MissionReward {
                    kind: RewardKind::None,
                    amount: row.get::<_, i64>(6)? as i32,
                    item_id: row.get(7)?,
                    skill: row.get(8)?,
                },
                target: point_from_columns(row, 9)?,
                item_id: row.get(12)?,
                item_count: row.get::<_, i64>(13)? as u32,
                target_id: row.get(14)?,
                recruit_class: row.get(15)?,
                target_npc_id: row.get::<_, Option<i64>>(16)?.map(|id| NpcId(id as i32)),
                monster_type: row.get(17)?,
                monster_kill_goal: row.get::<_, Option<i64>>(18)?.map(|goal| goal as u32),
                deadline: row.get::<_, Option<i64>>(19)?.map(|deadline| deadline as u64),
                npc_id: row.get::<_, Option<i64>>(20)?.map(|id| NpcId(id as i32)),
                good_faction: row.get::<_, Option<i64>>(21)?.map(|id| FactionId(id as i32)),
                bad_faction: row.get::<_, Option<i64>>(22)?.map(|id| FactionId(id as i32)),
                step: row.get::<_, i64>(23)? as u32,
                follow_up: row.get::<_, Option<String>>(24)?.map(MissionTypeId),
                player_id: row.get::<_, Option<i64>>(25)?.map(|id| PlayerId(id as i32)),
                offered_at: point_from_columns(row, 26)?,
            };
            Ok((uid, status, reward_kind, record))
        })?;

        // A bad row costs only that mission; its id stays reserved through next_id.
        let mut out = Vec::new();
        for row in rows {
            let (uid, status, reward_kind, mut record) = row?;
            let decoded = u32::try_from(uid)
                .map_err(|_| MissionDbError::InvalidData(format!("uid {} out of range", uid)))
                .and_then(|uid| {
                    Ok((
                        uid,
                        mission_status_from_str(&status)?,
                        reward_kind_from_str(&reward_kind)?,
                    ))
                });
            match decoded {
                Ok((uid, status, kind)) => {
                    record.uid = MissionId(uid);
                    record.status = status;
                    record.reward.kind = kind;
                    out.push(record);
                }
                Err(err) => warn!(uid, "dropping saved mission: {}", err),
            }
        }
        Ok(out)
    }
}

impl crate::world::repository::MissionRepository for MissionDb {
    fn load_state(&self) -> Result<Option<MissionSaveState>, Box<dyn std::error::Error>> {
        Ok(MissionDb::load_state(self)?)
    }

    fn save_state(&mut self, state: &MissionSaveState) -> Result<(), Box<dyn std::error::Error>> {
        Ok(MissionDb::save_state(self, state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::missions::{MissionGoal, MissionTypeDefinition};
    use crate::simulation::sandbox::SandboxWorld;

    fn registry() -> MissionTypeRegistry {
        let mut registry = MissionTypeRegistry::default();
        let mut cull = MissionTypeDefinition::new("CULL", "Cull", MissionGoal::KillMonsterType);
        cull.monster_type = Some("mon_zombie".to_string());
        cull.monster_kill_goal = Some(5);
        cull.deadline_low = 100;
        cull.deadline_high = 200;
        cull.follow_up = Some("CULL".to_string());
        registry.load(cull).expect("CULL");
        registry
    }

    #[test]
    fn empty_database_has_no_state() {
        let db = MissionDb::open_in_memory().expect("db");
        assert!(db.load_state().expect("query").is_none());
    }

    #[test]
    fn directory_round_trips_through_sqlite() {
        let registry = registry();
        let mut world = SandboxWorld::default();
        world.add_npc(NpcId(2), "NC_SOLDIER", Tripoint::new(-1, 4, 0));
        let mut directory = MissionDirectory::with_seed(5);
        let uid = directory
            .reserve_new(&registry, &MissionTypeId::new("CULL"), Some(NpcId(2)))
            .expect("CULL")
            .get_id();
        directory.assign(uid, PlayerId(1), &mut world).expect("assign");
        directory.step_complete(uid, 3, &world).expect("known");
        let mission = directory.find_mut(uid).expect("CULL");
        mission.set_target(Tripoint::new(7, -3, 1));
        mission.set_reward(MissionReward {
            kind: RewardKind::Item,
            amount: 1,
            item_id: Some("rifle".to_string()),
            skill: None,
        });
        directory
            .reserve_new(&registry, &MissionTypeId::new("CULL"), None)
            .expect("offer");

        let mut db = MissionDb::open_in_memory().expect("db");
        db.save_directory(&directory, 42).expect("save");
        let state = db.load_state().expect("load").expect("saved");
        assert_eq!(state.turn, 42);

        let mut restored = MissionDirectory::default();
        let count = db
            .load_directory(&mut restored, &registry)
            .expect("load")
            .expect("saved");
        assert_eq!(count, 2);
        let mut expected = directory.serialize_all();
        expected.turn = 0;
        assert_eq!(restored.serialize_all(), expected);
    }

    #[test]
    fn undecodable_rows_are_dropped_one_at_a_time() {
        let db = MissionDb::open_in_memory().expect("db");
        db.conn
            .execute(
                "INSERT INTO mission_state (id, next_id, turn) VALUES (1, 4, 0)",
                [],
            )
            .expect("state row");
        for (uid, status, reward_kind) in [
            (1, "lost", "NONE"),
            (2, "in_progress", "NONE"),
            (3, "success", "FAVOR"),
        ] {
            db.conn
                .execute(
                    "INSERT INTO missions (uid, type_id, status, description, value, reward_kind, reward_amount, item_count, step) VALUES (?1, 'CULL', ?2, '', 0, ?3, 0, 1, 0)",
                    params![uid, status, reward_kind],
                )
                .expect("mission row");
        }

        let state = db.load_state().expect("load").expect("saved");
        assert_eq!(state.next_id, 4);
        let uids: Vec<MissionId> = state.missions.iter().map(|record| record.uid).collect();
        assert_eq!(uids, vec![MissionId(2)]);

        let mut directory = MissionDirectory::default();
        assert_eq!(
            db.load_directory(&mut directory, &registry()).expect("load"),
            Some(1)
        );
        assert_eq!(directory.next_id(), 4);
    }

    #[test]
    fn out_of_range_id_counter_is_invalid_data() {
        let db = MissionDb::open_in_memory().expect("db");
        db.conn
            .execute(
                "INSERT INTO mission_state (id, next_id, turn) VALUES (1, 4294967296, 0)",
                [],
            )
            .expect("state row");
        assert!(matches!(
            db.load_state(),
            Err(MissionDbError::InvalidData(_))
        ));
    }
}
