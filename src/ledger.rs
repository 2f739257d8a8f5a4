//! Prediction ledger
//!
//! Single source of truth for every open prediction, keyed by game number.
//! The ledger holds no timers; status transitions are driven entirely by the
//! verification engine and terminal records are drained by the caller for
//! archival.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest verification offset before a pending prediction expires
pub const MAX_OFFSET: u8 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("an active prediction already exists for game {0}")]
    DuplicateActive(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Pending,
    /// Confirmed by a result message at this offset from the target
    Resolved(u8),
    Expired,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PredictionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionOrigin {
    /// Fired live by the trigger rule
    Triggered,
    /// Launched by the scheduler at its slot time
    Scheduled,
}

/// Where the broadcast message for a prediction landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLocation {
    pub channel_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub game_number: u32,
    pub status: PredictionStatus,
    /// Empty when the broadcast failed; verification still proceeds
    pub output_locations: Vec<OutputLocation>,
    pub created_at: DateTime<Utc>,
    pub origin: PredictionOrigin,
}

impl PredictionRecord {
    pub fn new(game_number: u32, origin: PredictionOrigin, created_at: DateTime<Utc>) -> Self {
        Self {
            game_number,
            status: PredictionStatus::Pending,
            output_locations: Vec::new(),
            created_at,
            origin,
        }
    }
}

#[derive(Debug, Default)]
pub struct PredictionLedger {
    records: BTreeMap<u32, PredictionRecord>,
}

impl PredictionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a non-terminal record exists for this game number
    pub fn has_active(&self, game_number: u32) -> bool {
        self.records
            .get(&game_number)
            .is_some_and(|r| !r.status.is_terminal())
    }

    /// Insert a new record. Processing is single-threaded, so callers
    /// check-then-create without further coordination.
    pub fn create(&mut self, record: PredictionRecord) -> Result<(), LedgerError> {
        if self.has_active(record.game_number) {
            return Err(LedgerError::DuplicateActive(record.game_number));
        }
        self.records.insert(record.game_number, record);
        Ok(())
    }

    pub fn get(&self, game_number: u32) -> Option<&PredictionRecord> {
        self.records.get(&game_number)
    }

    pub fn record_location(&mut self, game_number: u32, location: OutputLocation) {
        if let Some(record) = self.records.get_mut(&game_number) {
            record.output_locations.push(location);
        }
    }

    /// Game numbers of pending records, in increasing order
    pub fn pending_games(&self) -> Vec<u32> {
        self.records
            .values()
            .filter(|r| r.status == PredictionStatus::Pending)
            .map(|r| r.game_number)
            .collect()
    }

    /// Mark a pending record resolved at the given offset.
    /// Returns false (a no-op) when the record is absent or already
    /// terminal, which keeps message editing idempotent.
    pub fn resolve(&mut self, game_number: u32, offset: u8) -> bool {
        match self.records.get_mut(&game_number) {
            Some(r) if r.status == PredictionStatus::Pending => {
                r.status = PredictionStatus::Resolved(offset.min(MAX_OFFSET));
                true
            }
            _ => false,
        }
    }

    /// Mark a pending record expired. No-op on terminal records.
    pub fn expire(&mut self, game_number: u32) -> bool {
        match self.records.get_mut(&game_number) {
            Some(r) if r.status == PredictionStatus::Pending => {
                r.status = PredictionStatus::Expired;
                true
            }
            _ => false,
        }
    }

    /// Remove a terminal record for archival. Pending records stay put.
    pub fn remove_terminal(&mut self, game_number: u32) -> Option<PredictionRecord> {
        if self.records.get(&game_number)?.status.is_terminal() {
            self.records.remove(&game_number)
        } else {
            None
        }
    }

    pub fn active_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| !r.status.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(game: u32) -> PredictionRecord {
        PredictionRecord::new(game, PredictionOrigin::Triggered, Utc::now())
    }

    #[test]
    fn create_rejects_duplicate_active() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(45)).unwrap();
        assert_eq!(
            ledger.create(record(45)),
            Err(LedgerError::DuplicateActive(45))
        );
        assert_eq!(ledger.active_count(), 1);
    }

    #[test]
    fn create_allowed_again_after_terminal() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(45)).unwrap();
        assert!(ledger.expire(45));
        assert!(ledger.create(record(45)).is_ok());
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(45)).unwrap();
        assert!(ledger.resolve(45, 2));
        assert!(!ledger.resolve(45, 2));
        assert!(!ledger.expire(45));
        assert_eq!(ledger.get(45).unwrap().status, PredictionStatus::Resolved(2));
    }

    #[test]
    fn remove_terminal_leaves_pending_alone() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(45)).unwrap();
        assert!(ledger.remove_terminal(45).is_none());
        ledger.resolve(45, 0);
        let archived = ledger.remove_terminal(45).unwrap();
        assert_eq!(archived.status, PredictionStatus::Resolved(0));
        assert!(ledger.is_empty());
    }

    #[test]
    fn pending_games_in_increasing_order() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(50)).unwrap();
        ledger.create(record(45)).unwrap();
        ledger.create(record(47)).unwrap();
        ledger.resolve(47, 1);
        assert_eq!(ledger.pending_games(), vec![45, 50]);
    }

    #[test]
    fn record_location_appends() {
        let mut ledger = PredictionLedger::new();
        ledger.create(record(45)).unwrap();
        ledger.record_location(
            45,
            OutputLocation {
                channel_id: -100,
                message_id: 7,
            },
        );
        assert_eq!(ledger.get(45).unwrap().output_locations.len(), 1);
    }
}
