//! One-way migration for saves written before missions were keyed by string id.
//! Nothing here is used by the live data model; the module can go once old saves are gone.

use std::io::BufRead;
use std::str::SplitWhitespace;

use bevy_utils::tracing::{info, warn};
use thiserror::Error;

use crate::components::world::{FactionId, MissionId, NpcId, PlayerId, Tripoint};
use crate::simulation::mission::{Mission, MissionReward, MissionStatus, RewardKind};
use crate::simulation::mission_type::{MissionTypeId, MissionTypeRegistry, MISSION_NULL};

/// Frozen: the position of each id is its historical numeric value.
pub const LEGACY_MISSION_TYPE_IDS: [&str; 32] = [
    MISSION_NULL,
    "MISSION_GET_ANTIBIOTICS",
    "MISSION_GET_SOFTWARE",
    "MISSION_GET_ZOMBIE_BLOOD_ANAL",
    "MISSION_RESCUE_DOG",
    "MISSION_KILL_ZOMBIE_MOM",
    "MISSION_REACH_SAFETY",
    "MISSION_GET_BOOK",
    "MISSION_GET_RELIC",
    "MISSION_RECOVER_PRIEST_DIARY",
    "MISSION_INVESTIGATE_CULT",
    "MISSION_INVESTIGATE_PRISON_VISIONARY",
    "MISSION_GET_RECORD_WEATHER",
    "MISSION_GET_RECORD_PATIENT",
    "MISSION_REACH_FEMA_CAMP",
    "MISSION_REACH_FARM_HOUSE",
    "MISSION_GET_RECORD_ACCOUNTING",
    "MISSION_GET_SAFE_BOX",
    "MISSION_GET_DEPUTY_BADGE",
    "MISSION_KILL_JABBERWOCK",
    "MISSION_KILL_100_Z",
    "MISSION_KILL_HORDE_MASTER",
    "MISSION_RECRUIT_TRACKER",
    "MISSION_JOIN_TRACKER",
    "MISSION_FREE_MERCHANTS_EVAC_1",
    "MISSION_FREE_MERCHANTS_EVAC_2",
    "MISSION_FREE_MERCHANTS_EVAC_3",
    "MISSION_OLD_GUARD_REP_1",
    "MISSION_OLD_GUARD_REP_2",
    "MISSION_OLD_GUARD_REP_3",
    "MISSION_OLD_GUARD_REP_4",
    "MISSION_KILL_20_NIGHTMARES",
];

pub fn legacy_type_id(old_id: i32) -> &'static str {
    usize::try_from(old_id)
        .ok()
        .and_then(|idx| LEGACY_MISSION_TYPE_IDS.get(idx))
        .copied()
        .unwrap_or(MISSION_NULL)
}

const DESCRIPTION_END: &str = "<>";

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("failed to read legacy mission stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("legacy mission stream has no record count")]
    MissingCount,
    #[error("legacy record on line {line}: {reason}")]
    Record { line: usize, reason: String },
}

/// What came out of a legacy stream. Malformed records are listed, not fatal.
#[derive(Debug, Default)]
pub struct LegacyReport {
    pub declared: usize,
    pub loaded: usize,
    pub dropped: Vec<LegacyError>,
}

/// Reads the old count-prefixed, one-record-per-line format into current missions, bound to
/// `legacy_player_id`. Only a missing or unreadable header aborts the load.
pub fn unserialize_legacy<R: BufRead>(
    reader: R,
    registry: &MissionTypeRegistry,
    legacy_player_id: PlayerId,
) -> Result<(Vec<Mission>, LegacyReport), LegacyError> {
    let mut lines = reader.lines().enumerate();
    let declared = loop {
        match lines.next() {
            None => return Err(LegacyError::MissingCount),
            Some((_, line)) => {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                break line
                    .parse::<usize>()
                    .map_err(|_| LegacyError::MissingCount)?;
            }
        }
    };

    let mut report = LegacyReport {
        declared,
        ..LegacyReport::default()
    };
    let mut missions = Vec::with_capacity(declared);
    let mut seen = 0;
    while seen < declared {
        let Some((idx, line)) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        seen += 1;
        match load_info(&line, registry, legacy_player_id) {
            Ok(mission) => missions.push(mission),
            Err(reason) => {
                let err = LegacyError::Record {
                    line: idx + 1,
                    reason,
                };
                warn!("dropping {}", err);
                report.dropped.push(err);
            }
        }
    }
    if seen < declared {
        warn!(declared, found = seen, "legacy mission stream ended early");
    }

    report.loaded = missions.len();
    info!(
        loaded = report.loaded,
        dropped = report.dropped.len(),
        "legacy missions migrated"
    );
    Ok((missions, report))
}

/// Parses one legacy record line.
pub fn load_info(
    line: &str,
    registry: &MissionTypeRegistry,
    legacy_player_id: PlayerId,
) -> Result<Mission, String> {
    let mut tokens = Tokens(line.split_whitespace());

    let legacy_type = tokens.int32("legacy type")?;
    let type_id = registry.from_legacy(legacy_type);
    if type_id.is_null() {
        return Err(format!(
            "legacy type {} ({}) is not loaded",
            legacy_type,
            legacy_type_id(legacy_type)
        ));
    }
    let mission_type = registry
        .get(&type_id)
        .cloned()
        .ok_or_else(|| format!("mission type {} is not loaded", type_id))?;

    let mut words = Vec::new();
    loop {
        match tokens.0.next() {
            None => return Err("description is not terminated".to_string()),
            Some(DESCRIPTION_END) => break,
            Some(word) => words.push(word),
        }
    }

    let failed = tokens.int("failed flag")? != 0;
    let value = tokens.int("value")?.max(0) as u64;
    let reward = MissionReward {
        kind: match tokens.int("reward kind")? {
            1 => RewardKind::Cash,
            2 => RewardKind::Item,
            3 => RewardKind::Skill,
            _ => RewardKind::None,
        },
        amount: tokens.int32("reward amount")?,
        item_id: tokens.name("reward item")?,
        skill: tokens.name("reward skill")?,
    };
    let uid = tokens.int("uid")?;
    let uid = u32::try_from(uid).map_err(|_| format!("uid {} out of range", uid))?;
    let target_x = tokens.int32("target x")?;
    let target_y = tokens.int32("target y")?;
    let item_id = tokens.name("item id")?;
    let item_count = tokens.count("item count")?;
    let deadline = tokens.int("deadline")?;
    let npc_id = tokens.optional_id("npc id")?.map(NpcId);
    let good_fac = tokens.optional_id("good faction")?.map(FactionId);
    let bad_fac = tokens.optional_id("bad faction")?.map(FactionId);
    let step = tokens.count("step")?;
    let follow_up = tokens.int32("follow-up")?;
    let target_npc_id = tokens.optional_id("target npc id")?.map(NpcId);

    let mut mission = Mission::new(mission_type, MissionId(uid), npc_id);
    mission.description = words.join(" ");
    mission.status = if failed {
        MissionStatus::Failure
    } else {
        MissionStatus::InProgress
    };
    mission.player_id = Some(legacy_player_id);
    mission.value = value;
    mission.reward = reward;
    // Old saves used (-1, -1) for "no target" and had no z-levels.
    if target_x != -1 || target_y != -1 {
        mission.target = Some(Tripoint::new(target_x, target_y, 0));
    }
    if item_id.is_some() {
        mission.item_id = item_id;
    }
    if item_count > 0 {
        mission.item_count = item_count;
    }
    mission.deadline = (deadline > 0).then_some(deadline as u64);
    mission.set_factions(good_fac, bad_fac);
    mission.step = step;
    mission.set_follow_up(Some(MissionTypeId::new(legacy_type_id(follow_up))));
    if target_npc_id.is_some() {
        mission.target_npc_id = target_npc_id;
    }
    Ok(mission)
}

struct Tokens<'a>(SplitWhitespace<'a>);

impl Tokens<'_> {
    fn next(&mut self, field: &str) -> Result<&str, String> {
        self.0.next().ok_or_else(|| format!("missing {}", field))
    }

    fn int(&mut self, field: &str) -> Result<i64, String> {
        let raw = self.next(field)?;
        raw.parse()
            .map_err(|_| format!("{} is not a number: {}", field, raw))
    }

    fn int32(&mut self, field: &str) -> Result<i32, String> {
        let value = self.int(field)?;
        i32::try_from(value).map_err(|_| format!("{} out of range: {}", field, value))
    }

    /// Non-negative counter; old saves wrote negatives for "unset".
    fn count(&mut self, field: &str) -> Result<u32, String> {
        let value = self.int(field)?.max(0);
        u32::try_from(value).map_err(|_| format!("{} out of range: {}", field, value))
    }

    fn optional_id(&mut self, field: &str) -> Result<Option<i32>, String> {
        let id = self.int32(field)?;
        Ok((id >= 0).then_some(id))
    }

    fn name(&mut self, field: &str) -> Result<Option<String>, String> {
        let raw = self.next(field)?;
        Ok(match raw {
            "NULL" | "null" | "none" | "-1" => None,
            other => Some(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::missions::{MissionGoal, MissionTypeDefinition};

    fn registry() -> MissionTypeRegistry {
        let mut registry = MissionTypeRegistry::default();
        let mut book = MissionTypeDefinition::new("MISSION_GET_BOOK", "Find a Book", MissionGoal::FindAnyItem);
        book.start = Some("place_book".to_string());
        registry.load(book).expect("book loads");
        let mut dog = MissionTypeDefinition::new("MISSION_RESCUE_DOG", "Find Dog", MissionGoal::FindMonster);
        dog.start = Some("place_dog".to_string());
        registry.load(dog).expect("dog loads");
        registry
    }

    #[test]
    fn out_of_range_legacy_ids_map_to_the_sentinel() {
        assert_eq!(legacy_type_id(-1), MISSION_NULL);
        assert_eq!(legacy_type_id(32), MISSION_NULL);
        assert_eq!(legacy_type_id(4), "MISSION_RESCUE_DOG");
    }

    #[test]
    fn legacy_stream_migrates_records() {
        let stream = "2\n\
            7 Find me a book <> 0 150 1 50 NULL NULL 12 40 -20 book 1 9000 3 -1 -1 0 4 -1\n\
            4 Lost dog <> 1 80 0 0 NULL NULL 13 -1 -1 null 0 0 -1 -1 -1 1 0 -1\n";
        let (missions, report) =
            unserialize_legacy(Cursor::new(stream), &registry(), PlayerId(1)).expect("header");

        assert_eq!(report.loaded, 2);
        assert!(report.dropped.is_empty());
        let book = &missions[0];
        assert_eq!(book.get_id(), MissionId(12));
        assert_eq!(book.get_description(), "Find me a book");
        assert_eq!(book.status(), MissionStatus::InProgress);
        assert_eq!(book.get_target(), Some(Tripoint::new(40, -20, 0)));
        assert_eq!(book.get_deadline(), Some(9000));
        assert_eq!(book.get_npc_id(), Some(NpcId(3)));
        assert_eq!(book.get_reward().kind, RewardKind::Cash);
        assert_eq!(
            book.get_follow_up(),
            Some(&MissionTypeId::new("MISSION_RESCUE_DOG"))
        );
        assert_eq!(book.get_assigned_player_id(), Some(PlayerId(1)));

        let dog = &missions[1];
        assert!(dog.has_failed());
        assert!(!dog.has_target());
        assert!(!dog.has_deadline());
        assert!(!dog.has_follow_up());
        assert_eq!(dog.get_step(), 1);
    }

    #[test]
    fn malformed_records_are_dropped_individually() {
        let stream = "3\n\
            7 Truncated <> 0 150\n\
            1 Antibiotics <> 0 1 0 0 NULL NULL 2 0 0 null 1 0 -1 -1 -1 0 0 -1\n\
            7 Fine <> 0 1 0 0 NULL NULL 3 0 0 null 1 0 -1 -1 -1 0 0 -1\n";
        let (missions, report) =
            unserialize_legacy(Cursor::new(stream), &registry(), PlayerId(1)).expect("header");

        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].get_id(), MissionId(3));
        assert_eq!(report.dropped.len(), 2);
        assert!(matches!(report.dropped[0], LegacyError::Record { line: 2, .. }));
    }

    #[test]
    fn ids_wider_than_32_bits_are_not_truncated() {
        let registry = registry();
        let wide_type = "4294967303 Bogus <> 0 1 0 0 NULL NULL 5 0 0 null 1 0 -1 -1 -1 0 0 -1";
        let err = load_info(wide_type, &registry, PlayerId(1)).unwrap_err();
        assert!(err.contains("legacy type out of range"));

        let wide_follow_up = "7 Book <> 0 1 0 0 NULL NULL 5 0 0 null 1 0 -1 -1 -1 0 4294967300 -1";
        let err = load_info(wide_follow_up, &registry, PlayerId(1)).unwrap_err();
        assert!(err.contains("follow-up out of range"));

        let wide_count = "7 Book <> 0 1 0 0 NULL NULL 5 0 0 null 4294967296 0 -1 -1 -1 0 0 -1";
        assert!(load_info(wide_count, &registry, PlayerId(1)).is_err());

        let stream = format!(
            "2\n{}\n7 Fine <> 0 1 0 0 NULL NULL 6 0 0 null 1 0 -1 -1 -1 0 0 -1\n",
            wide_type
        );
        let (missions, report) =
            unserialize_legacy(Cursor::new(stream), &registry, PlayerId(1)).expect("header");
        let ids: Vec<MissionId> = missions.iter().map(|mission| mission.get_id()).collect();
        assert_eq!(ids, vec![MissionId(6)]);
        assert_eq!(report.dropped.len(), 1);
        assert!(matches!(report.dropped[0], LegacyError::Record { line: 2, .. }));
    }

    #[test]
    fn stream_without_a_count_is_rejected() {
        let err = unserialize_legacy(Cursor::new("books\n"), &registry(), PlayerId(1)).unwrap_err();
        assert!(matches!(err, LegacyError::MissingCount));
    }
}
