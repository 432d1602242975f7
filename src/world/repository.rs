use crate::core::serialization::MissionSaveState;

pub trait MissionRepository {
    fn load_state(&self) -> Result<Option<MissionSaveState>, Box<dyn std::error::Error>>;
    fn save_state(&mut self, state: &MissionSaveState) -> Result<(), Box<dyn std::error::Error>>;
}
