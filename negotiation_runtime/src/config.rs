//! Runtime configuration.
//!
//! Every field has a default, so `{}` is a valid config file: in-memory
//! rooms, no planning timeout.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use negotiation_engine::arithmetic::is_valid_id;
use negotiation_engine::scenario::Scenario;

use crate::error::{Result, RoomError};
use crate::events::BroadcastSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Root for `rooms/<id>/`. None keeps rooms in memory only.
    pub data_dir: Option<PathBuf>,
    /// Planning-phase timeout. None disables the timeout policy.
    pub planning_timeout_ms: Option<u64>,
    /// Snapshots kept per room, newest first. Never below 1.
    pub snapshot_retention: usize,
    /// Replay the journal on restore and compare against the snapshot.
    pub verify_on_restore: bool,
    /// Capacity of the broadcast channel.
    pub event_buffer: usize,
    /// Extra scenarios, looked up as `<scenario_dir>/<id>.json`.
    pub scenario_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            planning_timeout_ms: None,
            snapshot_retention: 3,
            verify_on_restore: true,
            event_buffer: 256,
            scenario_dir: None,
        }
    }
}

impl RuntimeConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| RoomError::Storage(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn rooms_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("rooms"))
    }

    pub fn retention(&self) -> usize {
        self.snapshot_retention.max(1)
    }

    /// Broadcast sink sized by `event_buffer`.
    pub fn broadcast_sink(&self) -> BroadcastSink {
        BroadcastSink::new(self.event_buffer)
    }

    /// Built-in scenarios first, then `scenario_dir`.
    pub fn load_scenario(&self, id: &str) -> Result<Scenario> {
        if Scenario::builtin_ids().any(|b| b == id) {
            return Scenario::builtin(id).map_err(|e| RoomError::UnknownScenario(format!("{id}: {e}")));
        }
        let Some(dir) = &self.scenario_dir else {
            return Err(RoomError::UnknownScenario(id.to_string()));
        };
        if !is_valid_id(id) {
            return Err(RoomError::UnknownScenario(id.to_string()));
        }
        let path = dir.join(format!("{id}.json"));
        if !path.exists() {
            return Err(RoomError::UnknownScenario(id.to_string()));
        }
        let scenario = Scenario::load_from_file(&path)
            .map_err(|e| RoomError::UnknownScenario(format!("{id}: {e}")))?;
        if scenario.id != id {
            return Err(RoomError::UnknownScenario(format!(
                "{} declares id {:?}",
                path.display(),
                scenario.id
            )));
        }
        scenario
            .validate()
            .map_err(|e| RoomError::UnknownScenario(format!("{id}: {e}")))?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let c: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, RuntimeConfig::default());
        assert!(c.rooms_dir().is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<RuntimeConfig>(r#"{"data_dri": "/tmp"}"#).is_err());
    }

    #[test]
    fn test_retention_floor() {
        let c = RuntimeConfig {
            snapshot_retention: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(c.retention(), 1);
    }

    #[test]
    fn test_load_builtin_and_unknown() {
        let c = RuntimeConfig::in_memory();
        assert_eq!(c.load_scenario("scale-out").unwrap().id, "scale-out");
        assert!(matches!(
            c.load_scenario("nope"),
            Err(RoomError::UnknownScenario(_))
        ));
    }
}
