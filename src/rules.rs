//! Trigger rule engine
//!
//! Decides whether a finalized result message should fire a new prediction:
//! exactly one card of the watched rank in the second group and none in the
//! first. A global cooldown gates new triggered predictions only; it never
//! touches verification or scheduled launches.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::parser::{count_rank, GameMessage, Rank};

/// Outcome of evaluating one message against the trigger rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Rule matched and cooldown has elapsed; predict this target game
    Fire { target: u32 },
    /// Rule matched but the cooldown is still active
    Suppressed { target: u32, remaining_secs: i64 },
    NoMatch,
}

pub struct TriggerEngine {
    watched_rank: Rank,
    cooldown: Duration,
    last_trigger_at: Option<DateTime<Utc>>,
    /// Game numbers seen mid-edit, awaiting their finalized re-send
    pending_edits: HashSet<u32>,
}

impl TriggerEngine {
    pub fn new(watched_rank: Rank, cooldown_seconds: u32) -> Self {
        Self {
            watched_rank,
            cooldown: Duration::seconds(i64::from(cooldown_seconds)),
            last_trigger_at: None,
            pending_edits: HashSet::new(),
        }
    }

    pub fn cooldown_seconds(&self) -> i64 {
        self.cooldown.num_seconds()
    }

    pub fn set_cooldown_seconds(&mut self, seconds: u32) {
        self.cooldown = Duration::seconds(i64::from(seconds));
    }

    pub fn watched_rank(&self) -> Rank {
        self.watched_rank
    }

    /// Evaluate the trigger rule against a message.
    ///
    /// Does not advance the cooldown clock; callers confirm a successful
    /// fire with [`TriggerEngine::mark_fired`] once the prediction record
    /// actually exists.
    pub fn evaluate(&self, msg: &GameMessage, now: DateTime<Utc>) -> Decision {
        if !msg.is_final {
            return Decision::NoMatch;
        }

        let in_second = count_rank(&msg.group_two, self.watched_rank);
        let in_first = count_rank(&msg.group_one, self.watched_rank);
        if in_second != 1 || in_first != 0 {
            return Decision::NoMatch;
        }

        let target = msg.game_number;
        if let Some(last) = self.last_trigger_at {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                let remaining_secs = (self.cooldown - elapsed).num_seconds();
                debug!(
                    game = target,
                    remaining_secs, "trigger matched but cooldown is active"
                );
                return Decision::Suppressed {
                    target,
                    remaining_secs,
                };
            }
        }

        Decision::Fire { target }
    }

    /// Advance the cooldown clock after a non-suppressed fire
    pub fn mark_fired(&mut self, now: DateTime<Utc>) {
        self.last_trigger_at = Some(now);
    }

    /// Remember a game number seen with an in-progress marker.
    /// Returns false when it was already buffered.
    pub fn buffer_pending_edit(&mut self, game_number: u32) -> bool {
        self.pending_edits.insert(game_number)
    }

    /// Drop a buffered game number once its finalized edit arrives.
    /// Returns true when the number had been buffered.
    pub fn finalize_pending_edit(&mut self, game_number: u32) -> bool {
        self.pending_edits.remove(&game_number)
    }

    pub fn pending_edit_count(&self) -> usize {
        self.pending_edits.len()
    }
}
