//! Scheduled predictions
//!
//! Besides the live trigger rule, a slot table launches predictions at fixed
//! times of day. Slots share the ledger and verification path with triggered
//! predictions; once a slot verifies, one fresh slot is appended at the tail
//! so the active window never shrinks.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ScheduleConfig;

/// One timed prediction opportunity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Sequence label, e.g. `N015`
    pub slot_id: String,
    pub game_number: u32,
    pub launch_time: NaiveTime,
    pub launched: bool,
    pub verified: bool,
    /// Free-form state label persisted with the table
    pub status: String,
}

impl ScheduleSlot {
    fn new(game_number: u32, launch_time: NaiveTime) -> Self {
        Self {
            slot_id: format!("N{:03}", game_number),
            game_number,
            launch_time,
            launched: false,
            verified: false,
            status: "pending".to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.launched && !self.verified
    }
}

/// Counters reported by `/scheduler status` and the monitoring endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStatus {
    pub total: usize,
    pub launched: usize,
    pub verified: usize,
    pub pending: usize,
    pub next_launch: Option<NaiveTime>,
}

pub struct Scheduler {
    slots: Vec<ScheduleSlot>,
    running: bool,
}

fn spacing_minutes(cfg: &ScheduleConfig) -> i64 {
    let span_minutes = i64::from(cfg.end_hour.saturating_sub(cfg.start_hour)) * 60;
    (span_minutes / i64::from(cfg.slots_per_day.max(1))).max(1)
}

impl Scheduler {
    pub fn new(slots: Vec<ScheduleSlot>) -> Self {
        Self {
            slots,
            running: false,
        }
    }

    /// Begin launching slots on tick. Returns false when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        info!(slots = self.slots.len(), "scheduler started");
        true
    }

    /// Halt launching. Idempotent; open slots keep verifying.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        info!("scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn slots(&self) -> &[ScheduleSlot] {
        &self.slots
    }

    /// Rebuild the day's table: `slots_per_day` launch times evenly spaced
    /// between `start_hour` and `end_hour`, sequential game numbers.
    pub fn regenerate(&mut self, cfg: &ScheduleConfig) {
        let spacing = spacing_minutes(cfg);
        let start = NaiveTime::from_hms_opt(cfg.start_hour.min(23), 0, 0)
            .unwrap_or(NaiveTime::MIN);

        self.slots = (0..cfg.slots_per_day)
            .map(|i| {
                let game_number = cfg.first_game_number + i * cfg.game_number_step;
                let launch_time = start + Duration::minutes(spacing * i64::from(i));
                ScheduleSlot::new(game_number, launch_time)
            })
            .collect();

        info!(
            slots = self.slots.len(),
            spacing_minutes = spacing,
            "schedule regenerated"
        );
    }

    /// The first unlaunched slot whose launch time has been reached.
    /// At most one launch happens per tick, so a backlog drains gradually
    /// and a failed launch is retried on the next tick.
    pub fn next_due(&self, now: NaiveTime) -> Option<&ScheduleSlot> {
        self.slots
            .iter()
            .filter(|s| !s.launched && s.launch_time <= now)
            .min_by_key(|s| s.launch_time)
    }

    /// Flip a slot to launched once its broadcast actually went out
    pub fn mark_launched(&mut self, game_number: u32) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.game_number == game_number) {
            slot.launched = true;
            slot.status = "launched".to_string();
        }
    }

    /// Game numbers of launched, unverified slots
    pub fn active_games(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.game_number)
            .collect()
    }

    /// Mark a slot verified and append exactly one replacement slot at the
    /// tail of the window. Returns false when no such open slot exists.
    pub fn on_verified(&mut self, game_number: u32, status_label: &str, cfg: &ScheduleConfig) -> bool {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.game_number == game_number && s.is_open())
        else {
            return false;
        };
        slot.verified = true;
        slot.status = status_label.to_string();

        let last_game = self.slots.iter().map(|s| s.game_number).max().unwrap_or(0);
        let last_time = self
            .slots
            .iter()
            .map(|s| s.launch_time)
            .max()
            .unwrap_or(NaiveTime::MIN);

        let next = ScheduleSlot::new(
            last_game + cfg.game_number_step,
            // Wraps past midnight into the next day's cycle
            last_time + Duration::minutes(spacing_minutes(cfg)),
        );
        info!(
            verified = game_number,
            appended = next.game_number,
            launch_time = %next.launch_time,
            "slot verified, window replenished"
        );
        self.slots.push(next);
        true
    }

    pub fn status(&self) -> ScheduleStatus {
        let launched = self.slots.iter().filter(|s| s.launched).count();
        let verified = self.slots.iter().filter(|s| s.verified).count();
        ScheduleStatus {
            total: self.slots.len(),
            launched,
            verified,
            pending: self.slots.len() - launched,
            next_launch: self
                .slots
                .iter()
                .filter(|s| !s.launched)
                .map(|s| s.launch_time)
                .min(),
        }
    }

    /// Count of slots still moving toward a terminal state
    pub fn open_window_size(&self) -> usize {
        self.slots.iter().filter(|s| !s.verified).count()
    }

    /// Launched slots that never verified, e.g. across a restart. Their
    /// broadcast locations are gone; verification falls back to sending a
    /// fresh status message.
    pub fn unreconciled_games(&self) -> Vec<u32> {
        let games = self.active_games();
        if !games.is_empty() {
            warn!(count = games.len(), "rehydrating launched, unverified slots");
        }
        games
    }
}
