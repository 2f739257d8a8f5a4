//! Presentation boundary for broadcast messages
//!
//! The display channel format is fixed and consumed by downstream tooling;
//! it must not drift. Status glyphs exist only here; everywhere else the
//! status is the closed enum from the ledger.

use crate::ledger::PredictionStatus;

/// Glyph for a prediction status
pub fn status_glyph(status: PredictionStatus) -> &'static str {
    match status {
        PredictionStatus::Pending => "⏳",
        PredictionStatus::Resolved(0) => "✅0️⃣",
        PredictionStatus::Resolved(1) => "✅1️⃣",
        PredictionStatus::Resolved(2) => "✅2️⃣",
        // The verification engine clamps offsets to 3
        PredictionStatus::Resolved(_) => "✅3️⃣",
        PredictionStatus::Expired => "❌",
    }
}

/// Full broadcast text for a prediction in a given status
pub fn prediction_text(game_number: u32, status: PredictionStatus) -> String {
    format!("🔵{} 🔵3K: statut :{}", game_number, status_glyph(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_format_is_exact() {
        assert_eq!(
            prediction_text(45, PredictionStatus::Pending),
            "🔵45 🔵3K: statut :⏳"
        );
    }

    #[test]
    fn resolved_formats_are_exact() {
        assert_eq!(
            prediction_text(45, PredictionStatus::Resolved(0)),
            "🔵45 🔵3K: statut :✅0️⃣"
        );
        assert_eq!(
            prediction_text(45, PredictionStatus::Resolved(1)),
            "🔵45 🔵3K: statut :✅1️⃣"
        );
        assert_eq!(
            prediction_text(45, PredictionStatus::Resolved(2)),
            "🔵45 🔵3K: statut :✅2️⃣"
        );
        assert_eq!(
            prediction_text(45, PredictionStatus::Resolved(3)),
            "🔵45 🔵3K: statut :✅3️⃣"
        );
    }

    #[test]
    fn expired_format_is_exact() {
        assert_eq!(
            prediction_text(45, PredictionStatus::Expired),
            "🔵45 🔵3K: statut :❌"
        );
    }
}
