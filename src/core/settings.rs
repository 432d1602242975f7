use std::fs;
use std::path::{Path, PathBuf};

use bevy_utils::tracing::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::world::PlayerId;
use crate::data::missions::{DataError, DEFAULT_MISSIONS_PATH};
use crate::simulation::behavior::BehaviorTuning;

pub const DEFAULT_SETTINGS_PATH: &str = "./assets/data/engine.json";
pub const DEFAULT_SAVE_DB_PATH: &str = "./saves/missions.db";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("invalid engine settings: {}", .0.join("; "))]
    Invalid(Vec<&'static str>),
}

/// Engine configuration. Every field has a default so partial files are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub catalog_path: PathBuf,
    pub save_db_path: PathBuf,
    pub seed: u64,
    /// How close a town must be for `near_town` placement.
    pub town_radius: i32,
    /// How far start routines search the overmap for a site.
    pub search_radius: i32,
    /// Holder assigned to missions migrated from legacy saves, which did not record one.
    pub legacy_player_id: PlayerId,
    /// Npc classes content may reference. Empty accepts any class.
    pub npc_classes: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let tuning = BehaviorTuning::default();
        Self {
            catalog_path: PathBuf::from(DEFAULT_MISSIONS_PATH),
            save_db_path: PathBuf::from(DEFAULT_SAVE_DB_PATH),
            seed: 0,
            town_radius: tuning.town_radius,
            search_radius: tuning.search_radius,
            legacy_player_id: PlayerId(1),
            npc_classes: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from JSON. A missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "engine settings not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| DataError::Json {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut errors = Vec::new();
        if self.town_radius < 0 {
            errors.push("town_radius must not be negative");
        }
        if self.search_radius <= 0 {
            errors.push("search_radius must be greater than 0");
        }
        if self.legacy_player_id.0 < 0 {
            errors.push("legacy_player_id must not be negative");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(errors))
        }
    }

    pub fn tuning(&self) -> BehaviorTuning {
        BehaviorTuning {
            town_radius: self.town_radius,
            search_radius: self.search_radius,
        }
    }

    pub fn is_known_class(&self, class: &str) -> bool {
        self.npc_classes.is_empty() || self.npc_classes.iter().any(|known| known == class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = EngineSettings::load("./does/not/exist.json").expect("defaults");
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.tuning(), BehaviorTuning::default());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{ "seed": 42, "town_radius": 3 }"#).expect("parse");
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.tuning().town_radius, 3);
        assert_eq!(settings.search_radius, 24);
        assert_eq!(settings.catalog_path, PathBuf::from(DEFAULT_MISSIONS_PATH));
        assert!(settings.is_known_class("NC_ANYONE"));
    }

    #[test]
    fn nonsense_radii_are_rejected() {
        let settings = EngineSettings {
            search_radius: 0,
            town_radius: -1,
            ..EngineSettings::default()
        };
        match settings.validate() {
            Err(SettingsError::Invalid(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected invalid settings, got {:?}", other),
        }
    }
}
