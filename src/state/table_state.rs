/// Canonical table state
///
/// The single aggregate describing the observed table. Only the state tracker
/// mutates it; everyone else reads immutable snapshots.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::detection::{Card, DetectorKind, PlayerAction};

/// Betting round, derived from the number of board cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    #[default]
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Street for a board of `count` cards; `None` for impossible boards
    pub fn from_board_len(count: usize) -> Option<Self> {
        match count {
            0 => Some(Street::Preflop),
            3 => Some(Street::Flop),
            4 => Some(Street::Turn),
            5 => Some(Street::River),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Seat position relative to the dealer button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "BTN")]
    Button,
    #[serde(rename = "SB")]
    SmallBlind,
    #[serde(rename = "BB")]
    BigBlind,
    #[serde(rename = "UTG")]
    UnderTheGun,
    #[serde(rename = "UTG1")]
    UnderTheGun1,
    #[serde(rename = "UTG2")]
    UnderTheGun2,
    #[serde(rename = "LJ")]
    Lojack,
    #[serde(rename = "HJ")]
    Hijack,
    #[serde(rename = "CO")]
    Cutoff,
}

impl Position {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Position::Button => "BTN",
            Position::SmallBlind => "SB",
            Position::BigBlind => "BB",
            Position::UnderTheGun => "UTG",
            Position::UnderTheGun1 => "UTG1",
            Position::UnderTheGun2 => "UTG2",
            Position::Lojack => "LJ",
            Position::Hijack => "HJ",
            Position::Cutoff => "CO",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Positions between UTG and the button, latest last
const MIDDLE_POSITIONS: [Position; 5] = [
    Position::UnderTheGun1,
    Position::UnderTheGun2,
    Position::Lojack,
    Position::Hijack,
    Position::Cutoff,
];

/// Assign positions to the active seats, clockwise from the button
///
/// When the button seat itself is not active, the first active seat after it
/// takes the button. Heads-up, the button also posts the small blind and the
/// other seat is the big blind. Seats beyond nine-handed get no position.
pub fn assign_positions(button: u8, active_seats: &[u8]) -> BTreeMap<u8, Position> {
    let mut seats: Vec<u8> = active_seats.to_vec();
    seats.sort_unstable();
    seats.dedup();

    let mut positions = BTreeMap::new();
    if seats.is_empty() {
        return positions;
    }

    let start = seats.iter().position(|&s| s >= button).unwrap_or(0);
    seats.rotate_left(start);

    if seats.len() == 1 {
        positions.insert(seats[0], Position::Button);
        return positions;
    }
    if seats.len() == 2 {
        positions.insert(seats[0], Position::Button);
        positions.insert(seats[1], Position::BigBlind);
        return positions;
    }

    positions.insert(seats[0], Position::Button);
    positions.insert(seats[1], Position::SmallBlind);
    positions.insert(seats[2], Position::BigBlind);

    let rest = &seats[3..];
    if let Some((&utg, later)) = rest.split_first() {
        positions.insert(utg, Position::UnderTheGun);
        let take = later.len().min(MIDDLE_POSITIONS.len());
        let names = &MIDDLE_POSITIONS[MIDDLE_POSITIONS.len() - take..];
        for (&seat, &position) in later.iter().zip(names) {
            positions.insert(seat, position);
        }
    }

    positions
}

/// One side pot, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidePot {
    pub index: usize,
    pub amount: f64,
}

/// Blind levels in force
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blinds {
    pub small: f64,
    pub big: f64,
    pub ante: Option<f64>,
}

/// Last action seen for a seat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeatAction {
    pub action: PlayerAction,
    pub amount: Option<f64>,
}

/// Per-kind pipeline health at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindPerformance {
    pub samples: usize,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Pipeline health attached to the table state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub mode: String,
    pub cycles: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub events_dropped: u64,
    pub per_kind: BTreeMap<DetectorKind, KindPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableState {
    pub pot: f64,
    pub side_pots: Vec<SidePot>,
    pub board: Vec<Card>,
    pub hero_cards: Vec<Card>,
    pub stacks: BTreeMap<u8, f64>,
    pub names: BTreeMap<u8, String>,
    pub positions: BTreeMap<u8, Position>,
    pub active: BTreeMap<u8, bool>,
    pub street: Street,
    pub hand_id: Option<String>,
    pub button_seat: Option<u8>,
    pub blinds: Option<Blinds>,
    pub acting_seat: Option<u8>,
    pub time_remaining_secs: Option<f32>,
    pub last_actions: BTreeMap<u8, SeatAction>,
    /// Confidence of the reading that last set each field
    pub confidence: BTreeMap<String, f32>,
    pub performance: Option<PerformanceSnapshot>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TableState {
    pub fn active_seats(&self) -> Vec<u8> {
        self.active
            .iter()
            .filter(|(_, &active)| active)
            .map(|(&seat, _)| seat)
            .collect()
    }

    pub fn hand_in_progress(&self) -> bool {
        self.hand_id.is_some()
    }

    /// Clear hand-scoped fields; seats, stacks and blinds carry over
    pub fn clear_hand(&mut self) {
        self.board.clear();
        self.hero_cards.clear();
        self.side_pots.clear();
        self.last_actions.clear();
        self.hand_id = None;
        self.street = Street::Preflop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(positions: &BTreeMap<u8, Position>) -> Vec<(u8, &'static str)> {
        positions.iter().map(|(&s, p)| (s, p.abbreviation())).collect()
    }

    #[test]
    fn test_street_from_board() {
        assert_eq!(Street::from_board_len(0), Some(Street::Preflop));
        assert_eq!(Street::from_board_len(3), Some(Street::Flop));
        assert_eq!(Street::from_board_len(5), Some(Street::River));
        assert_eq!(Street::from_board_len(2), None);
        assert_eq!(Street::from_board_len(6), None);
    }

    #[test]
    fn test_six_handed_positions() {
        let positions = assign_positions(4, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            names(&positions),
            vec![(1, "UTG"), (2, "HJ"), (3, "CO"), (4, "BTN"), (5, "SB"), (6, "BB")]
        );
    }

    #[test]
    fn test_heads_up_positions() {
        let positions = assign_positions(5, &[2, 5]);
        assert_eq!(names(&positions), vec![(2, "BB"), (5, "BTN")]);
    }

    #[test]
    fn test_dead_button_moves_to_next_active_seat() {
        let positions = assign_positions(3, &[1, 4, 6, 2]);
        assert_eq!(
            names(&positions),
            vec![(1, "BB"), (2, "UTG"), (4, "BTN"), (6, "SB")]
        );
    }

    #[test]
    fn test_nine_handed_positions() {
        let seats: Vec<u8> = (1..=9).collect();
        let positions = assign_positions(1, &seats);
        assert_eq!(positions[&4], Position::UnderTheGun);
        assert_eq!(positions[&5], Position::UnderTheGun1);
        assert_eq!(positions[&9], Position::Cutoff);
        assert_eq!(positions.len(), 9);
    }

    #[test]
    fn test_clear_hand_keeps_seats() {
        let mut state = TableState::default();
        state.board = vec!["Ah".parse().unwrap(), "Kd".parse().unwrap(), "2c".parse().unwrap()];
        state.street = Street::Flop;
        state.hand_id = Some("h1".into());
        state.stacks.insert(1, 100.0);
        state.names.insert(1, "Hero".into());

        state.clear_hand();
        assert!(state.board.is_empty());
        assert_eq!(state.street, Street::Preflop);
        assert!(!state.hand_in_progress());
        assert_eq!(state.stacks.get(&1), Some(&100.0));
        assert_eq!(state.names.get(&1).map(String::as_str), Some("Hero"));
    }
}
