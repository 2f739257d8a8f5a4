//! YAML persistence
//!
//! Three files under the data directory: runtime config overrides
//! (`bot_config.yaml`), the scheduler table (`schedule.yaml`) and the
//! append-only prediction history (`predictions.yaml`). Reads are the sole
//! bootstrap source; writes are fire-and-forget and only logged on failure,
//! the in-memory state staying authoritative.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::{PredictionOrigin, PredictionRecord, PredictionStatus};
use crate::scheduler::ScheduleSlot;

const CONFIG_FILE: &str = "bot_config.yaml";
const SCHEDULE_FILE: &str = "schedule.yaml";
const HISTORY_FILE: &str = "predictions.yaml";

/// One archived prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub game_number: u32,
    pub origin: PredictionOrigin,
    pub status: PredictionStatus,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_record(record: &PredictionRecord, archived_at: DateTime<Utc>) -> Self {
        Self {
            game_number: record.game_number,
            origin: record.origin,
            status: record.status,
            created_at: record.created_at,
            archived_at,
        }
    }
}

pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        info!(dir = %data_dir.display(), "storage ready");
        Ok(Self { data_dir })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn read_yaml<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Option<T> {
        let path = self.path(file);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(file, error = %e, "failed to parse persisted file, ignoring it");
                    None
                }
            },
            Err(e) => {
                warn!(file, error = %e, "failed to read persisted file");
                None
            }
        }
    }

    fn write_yaml<T: Serialize>(&self, file: &str, value: &T) {
        let result = serde_yaml::to_string(value)
            .map_err(anyhow::Error::from)
            .and_then(|yaml| fs::write(self.path(file), yaml).map_err(anyhow::Error::from));
        if let Err(e) = result {
            warn!(file, error = %e, "persistence write failed, in-memory state stays authoritative");
        }
    }

    // ========== CONFIG KEY/VALUES ==========

    fn config_map(&self) -> BTreeMap<String, String> {
        self.read_yaml(CONFIG_FILE).unwrap_or_default()
    }

    pub fn get_config(&self, key: &str) -> Option<String> {
        self.config_map().get(key).cloned()
    }

    /// Typed read for numeric keys
    pub fn get_config_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get_config(key)?.trim().parse().ok()
    }

    pub fn set_config(&self, key: &str, value: impl ToString) {
        let mut map = self.config_map();
        map.insert(key.to_string(), value.to_string());
        self.write_yaml(CONFIG_FILE, &map);
    }

    pub fn remove_config(&self, key: &str) {
        let mut map = self.config_map();
        if map.remove(key).is_some() {
            self.write_yaml(CONFIG_FILE, &map);
        }
    }

    // ========== SCHEDULE TABLE ==========

    pub fn load_schedule(&self) -> Option<Vec<ScheduleSlot>> {
        self.read_yaml(SCHEDULE_FILE)
    }

    pub fn save_schedule(&self, slots: &[ScheduleSlot]) {
        self.write_yaml(SCHEDULE_FILE, &slots);
    }

    // ========== PREDICTION HISTORY ==========

    pub fn load_history(&self) -> Vec<HistoryEntry> {
        self.read_yaml(HISTORY_FILE).unwrap_or_default()
    }

    pub fn append_history(&self, entry: HistoryEntry) {
        let mut history = self.load_history();
        history.push(entry);
        self.write_yaml(HISTORY_FILE, &history);
    }

    pub fn clear_history(&self) {
        self.write_yaml(HISTORY_FILE, &Vec::<HistoryEntry>::new());
    }
}
