//! Parsing of raw result-channel text into structured game data
//!
//! A result message looks like `#N45. (A♠️2♥️) - (6♥️J♠️) 🔰`: a numeric
//! game identifier anchored by `N`, then two card groups in parentheses
//! separated by a dash. Suit symbols may carry the emoji variation selector.

use once_cell::sync::Lazy;
use regex::Regex;

/// Glyphs marking a finalized result
const FINAL_MARKERS: [char; 2] = ['🔰', '✅'];

/// Glyphs marking a result still being edited
const PENDING_MARKERS: [char; 2] = ['⏰', '🕐'];

static GAME_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"N\s*(\d+)").unwrap());

static CARD_GROUPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)\s*-\s*\(([^)]*)\)").unwrap());

static CARD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10|[AJQK2-9])([♠♥♦♣])").unwrap());

/// Card rank. Only the rank matters to the trigger rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    /// Parse a rank symbol as it appears in result text
    pub fn from_symbol(s: &str) -> Option<Rank> {
        match s {
            "A" => Some(Rank::Ace),
            "2" => Some(Rank::Two),
            "3" => Some(Rank::Three),
            "4" => Some(Rank::Four),
            "5" => Some(Rank::Five),
            "6" => Some(Rank::Six),
            "7" => Some(Rank::Seven),
            "8" => Some(Rank::Eight),
            "9" => Some(Rank::Nine),
            "10" => Some(Rank::Ten),
            "J" => Some(Rank::Jack),
            "Q" => Some(Rank::Queen),
            "K" => Some(Rank::King),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    pub fn from_symbol(s: &str) -> Option<Suit> {
        match s {
            "♠" => Some(Suit::Spades),
            "♥" => Some(Suit::Hearts),
            "♦" => Some(Suit::Diamonds),
            "♣" => Some(Suit::Clubs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

/// Immutable view of one parsed result message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMessage {
    pub game_number: u32,
    pub group_one: Vec<Card>,
    pub group_two: Vec<Card>,
    /// Carries an explicit finalization marker (🔰 or ✅)
    pub is_final: bool,
    /// Carries an in-progress marker (⏰ or 🕐) and no finalization marker
    pub is_pending_edit: bool,
}

impl GameMessage {
    /// Messages without an in-progress marker are verifiable, whether or
    /// not they carry an explicit finalization glyph.
    pub fn is_verifiable(&self) -> bool {
        !self.is_pending_edit
    }
}

/// Count cards of a given rank in a group
pub fn count_rank(cards: &[Card], rank: Rank) -> usize {
    cards.iter().filter(|c| c.rank == rank).count()
}

fn parse_group(text: &str) -> Vec<Card> {
    CARD_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let rank = Rank::from_symbol(caps.get(1)?.as_str())?;
            let suit = Suit::from_symbol(caps.get(2)?.as_str())?;
            Some(Card { rank, suit })
        })
        .collect()
}

/// Parse raw channel text into a [`GameMessage`].
///
/// Returns `None` when the game-number anchor or the two card groups are
/// missing; such messages are ignored by all downstream logic.
pub fn parse(text: &str) -> Option<GameMessage> {
    let game_number: u32 = GAME_NUMBER
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;

    // Strip emoji variation selectors so suit symbols match plainly
    let clean: String = text.chars().filter(|c| *c != '\u{FE0F}').collect();
    let groups = CARD_GROUPS.captures(&clean)?;

    let group_one = parse_group(groups.get(1)?.as_str());
    let group_two = parse_group(groups.get(2)?.as_str());

    let is_final = FINAL_MARKERS.iter().any(|m| text.contains(*m));
    let is_pending_edit = !is_final && PENDING_MARKERS.iter().any(|m| text.contains(*m));

    Some(GameMessage {
        game_number,
        group_one,
        group_two,
        is_final,
        is_pending_edit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_trigger_message() {
        let msg = parse("N045 (A♠2♥)-(6♥J♠)🔰").unwrap();
        assert_eq!(msg.game_number, 45);
        assert_eq!(msg.group_one.len(), 2);
        assert_eq!(msg.group_two.len(), 2);
        assert!(msg.is_final);
        assert!(!msg.is_pending_edit);
        assert_eq!(count_rank(&msg.group_two, Rank::Jack), 1);
        assert_eq!(count_rank(&msg.group_one, Rank::Jack), 0);
    }

    #[test]
    fn parses_variation_selector_suits() {
        let msg = parse("#N45. ✅(A♠️2♥️) - (6♥️8♠️10♦️)").unwrap();
        assert_eq!(msg.game_number, 45);
        assert_eq!(msg.group_one.len(), 2);
        assert_eq!(msg.group_two.len(), 3);
        assert_eq!(msg.group_two[2].rank, Rank::Ten);
        assert!(msg.is_final);
    }

    #[test]
    fn pending_marker_flags_message() {
        let msg = parse("N046 (A♠2♥)-(6♥J♠)⏰").unwrap();
        assert!(!msg.is_final);
        assert!(msg.is_pending_edit);
        assert!(!msg.is_verifiable());
    }

    #[test]
    fn final_marker_wins_over_pending() {
        let msg = parse("N046 (A♠2♥)-(6♥J♠)⏰🔰").unwrap();
        assert!(msg.is_final);
        assert!(!msg.is_pending_edit);
    }

    #[test]
    fn bare_message_is_verifiable_but_not_final() {
        let msg = parse("N047 (A♠2♥)-(6♥8♠)").unwrap();
        assert!(!msg.is_final);
        assert!(!msg.is_pending_edit);
        assert!(msg.is_verifiable());
    }

    #[test]
    fn placeholder_group_yields_no_cards() {
        let msg = parse("N046 (...)-(J♥J♠)🔰").unwrap();
        assert!(msg.group_one.is_empty());
        assert_eq!(count_rank(&msg.group_two, Rank::Jack), 2);
    }

    #[test]
    fn rejects_text_without_anchor() {
        assert!(parse("hello world (A♠2♥)-(6♥J♠)").is_none());
    }

    #[test]
    fn rejects_text_without_groups() {
        assert!(parse("N045 no cards here 🔰").is_none());
        assert!(parse("N045 (A♠2♥) only one group").is_none());
    }

    #[test]
    fn ten_parses_before_single_digits() {
        let msg = parse("N050 (10♠A♥)-(10♦J♣)🔰").unwrap();
        assert_eq!(msg.group_one[0].rank, Rank::Ten);
        assert_eq!(msg.group_two[0].rank, Rank::Ten);
    }
}
