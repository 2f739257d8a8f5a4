//! Verification engine
//!
//! Every verifiable result message is checked against all pending ledger
//! records, whether they came from a live trigger or a scheduled slot. A
//! record with target `P` resolves when a message in `[P, P+3]` satisfies
//! the confirmation rule; once game `P+3` has passed without a match the
//! record expires.

use tracing::debug;

use crate::ledger::{PredictionLedger, PredictionStatus, MAX_OFFSET};
use crate::parser::GameMessage;

/// Confirmation predicate deciding whether a result message confirms a
/// pending prediction. Pluggable: the offset bookkeeping around it does not
/// depend on the concrete rule.
pub trait ConfirmationRule: Send + Sync {
    fn confirms(&self, msg: &GameMessage) -> bool;
}

/// Default rule: the result's second card group holds exactly three cards.
pub struct ThreeCardRule;

impl ConfirmationRule for ThreeCardRule {
    fn confirms(&self, msg: &GameMessage) -> bool {
        msg.group_two.len() == 3
    }
}

/// A ledger transition produced by one incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub game_number: u32,
    pub status: PredictionStatus,
}

pub struct VerificationEngine {
    rule: Box<dyn ConfirmationRule>,
}

impl VerificationEngine {
    pub fn new(rule: Box<dyn ConfirmationRule>) -> Self {
        Self { rule }
    }

    /// Check one message against every pending record.
    ///
    /// Returns the transitions applied, in increasing target order. A single
    /// message may close several independent records when their offset
    /// windows overlap.
    pub fn check(&self, msg: &GameMessage, ledger: &mut PredictionLedger) -> Vec<Outcome> {
        if !msg.is_verifiable() {
            return Vec::new();
        }

        let confirms = self.rule.confirms(msg);
        let mut outcomes = Vec::new();

        for target in ledger.pending_games() {
            if msg.game_number < target {
                continue;
            }
            let offset = msg.game_number - target;

            if offset <= u32::from(MAX_OFFSET) && confirms {
                if ledger.resolve(target, offset as u8) {
                    debug!(game = target, offset, "prediction confirmed");
                    outcomes.push(Outcome {
                        game_number: target,
                        status: PredictionStatus::Resolved(offset as u8),
                    });
                }
            } else if offset >= u32::from(MAX_OFFSET) {
                // Boundary reached or exceeded with no match
                if ledger.expire(target) {
                    debug!(game = target, "prediction expired");
                    outcomes.push(Outcome {
                        game_number: target,
                        status: PredictionStatus::Expired,
                    });
                }
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{PredictionOrigin, PredictionRecord};
    use crate::parser::parse;
    use chrono::Utc;

    fn engine() -> VerificationEngine {
        VerificationEngine::new(Box::new(ThreeCardRule))
    }

    fn ledger_with(targets: &[u32]) -> PredictionLedger {
        let mut ledger = PredictionLedger::new();
        for &t in targets {
            ledger
                .create(PredictionRecord::new(t, PredictionOrigin::Triggered, Utc::now()))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn resolves_at_offset_two() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N047 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(
            outcomes,
            vec![Outcome {
                game_number: 45,
                status: PredictionStatus::Resolved(2)
            }]
        );
    }

    #[test]
    fn resolves_at_offset_zero() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N045 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(outcomes[0].status, PredictionStatus::Resolved(0));
    }

    #[test]
    fn resolves_at_boundary_offset_three() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N048 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(outcomes[0].status, PredictionStatus::Resolved(3));
    }

    #[test]
    fn expires_at_boundary_without_match() {
        let mut ledger = ledger_with(&[45]);
        // Two cards in the second group: no confirmation
        let msg = parse("N048 (A♠2♥)-(6♥8♠)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(
            outcomes,
            vec![Outcome {
                game_number: 45,
                status: PredictionStatus::Expired
            }]
        );
    }

    #[test]
    fn expires_past_boundary_even_on_match() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N049 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(outcomes[0].status, PredictionStatus::Expired);
    }

    #[test]
    fn non_matching_message_inside_window_leaves_pending() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N046 (A♠2♥)-(6♥8♠)🔰").unwrap();
        assert!(engine().check(&msg, &mut ledger).is_empty());
        assert!(ledger.has_active(45));
    }

    #[test]
    fn earlier_message_ignored() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N044 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        assert!(engine().check(&msg, &mut ledger).is_empty());
        assert!(ledger.has_active(45));
    }

    #[test]
    fn pending_edit_message_is_skipped() {
        let mut ledger = ledger_with(&[45]);
        let msg = parse("N045 (A♠2♥)-(6♥8♠2♦)⏰").unwrap();
        assert!(engine().check(&msg, &mut ledger).is_empty());
    }

    #[test]
    fn one_message_closes_multiple_records() {
        let mut ledger = ledger_with(&[45, 46, 47]);
        let msg = parse("N047 (A♠2♥)-(6♥8♠2♦)🔰").unwrap();
        let outcomes = engine().check(&msg, &mut ledger);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, PredictionStatus::Resolved(2));
        assert_eq!(outcomes[1].status, PredictionStatus::Resolved(1));
        assert_eq!(outcomes[2].status, PredictionStatus::Resolved(0));
    }

    #[test]
    fn every_record_terminal_once_boundary_processed() {
        // Property: by the time P+3 has been processed the record has
        // exactly one terminal status, match or no match.
        for confirm_at in [None, Some(0u32), Some(1), Some(2), Some(3)] {
            let mut ledger = ledger_with(&[45]);
            let eng = engine();
            for game in 45..=48u32 {
                let text = match confirm_at {
                    Some(off) if 45 + off == game => {
                        format!("N{:03} (A♠2♥)-(6♥8♠2♦)🔰", game)
                    }
                    _ => format!("N{:03} (A♠2♥)-(6♥8♠)🔰", game),
                };
                let msg = parse(&text).unwrap();
                eng.check(&msg, &mut ledger);
            }
            let status = ledger.get(45).unwrap().status;
            match confirm_at {
                Some(off) => assert_eq!(status, PredictionStatus::Resolved(off as u8)),
                None => assert_eq!(status, PredictionStatus::Expired),
            }
        }
    }
}
