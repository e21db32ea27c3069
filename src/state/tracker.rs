/// State tracker
///
/// Single writer of `TableState`. Updates are grouped per capture cycle:
///
/// ```text
/// begin_frame() ──> update_*() ... ──> commit_frame()   (all updates visible)
///                                  └─> abort_frame()    (none visible)
/// ```
///
/// Each `update_*` returns whether the value changed: beyond the numeric
/// tolerance for amounts, exact equality for cards, names and flags. Readers never
/// see a half-applied frame; they hold a `StateView` onto the last committed
/// snapshot.
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::table_state::{
    assign_positions, Blinds, PerformanceSnapshot, SeatAction, SidePot, Street, TableState,
};
use crate::detection::{Card, PlayerAction};
use crate::error::{PipelineError, ValidationError};

/// Groups all events produced from one capture cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only handle onto the last committed table state
#[derive(Clone)]
pub struct StateView {
    published: Arc<RwLock<Arc<TableState>>>,
    offline: Arc<AtomicBool>,
}

impl StateView {
    /// Last committed state; errors while the pipeline is offline
    pub fn current(&self) -> Result<Arc<TableState>, PipelineError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::Offline);
        }
        Ok(Arc::clone(&self.published.read()))
    }

    /// Last committed state regardless of mode (diagnostics only)
    pub fn last_known(&self) -> Arc<TableState> {
        Arc::clone(&self.published.read())
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

pub struct StateTracker {
    committed: TableState,
    working: Option<TableState>,
    correlation: Option<CorrelationId>,
    tolerance: f64,
    max_seats: u8,
    published: Arc<RwLock<Arc<TableState>>>,
    offline: Arc<AtomicBool>,
}

fn check_confidence(confidence: f32) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ValidationError::ConfidenceOutOfRange(confidence))
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteAmount { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeAmount { field, value });
    }
    Ok(())
}

fn check_unique(cards: &[Card]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(cards.len());
    for card in cards {
        if !seen.insert(*card) {
            return Err(ValidationError::DuplicateCard(card.to_string()));
        }
    }
    Ok(())
}

impl StateTracker {
    pub fn new(tolerance: f64, max_seats: u8) -> Self {
        Self {
            committed: TableState::default(),
            working: None,
            correlation: None,
            tolerance,
            max_seats,
            published: Arc::new(RwLock::new(Arc::new(TableState::default()))),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn view(&self) -> StateView {
        StateView {
            published: Arc::clone(&self.published),
            offline: Arc::clone(&self.offline),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Open a frame; any frame left open is discarded first
    pub fn begin_frame(&mut self) -> CorrelationId {
        if let Some(stale) = self.correlation.take() {
            tracing::warn!("Frame {} was never committed, discarding its updates", stale);
            self.working = None;
        }
        let correlation = CorrelationId::new();
        self.working = Some(self.committed.clone());
        self.correlation = Some(correlation.clone());
        correlation
    }

    /// Correlation id of the open frame
    pub fn correlation(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref()
    }

    /// Publish every update of the open frame
    pub fn commit_frame(&mut self) -> Arc<TableState> {
        if let Some(mut working) = self.working.take() {
            working.updated_at = Some(Utc::now());
            self.committed = working;
        }
        self.correlation = None;

        let snapshot = Arc::new(self.committed.clone());
        *self.published.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// Discard every update of the open frame
    pub fn abort_frame(&mut self) {
        if let Some(correlation) = self.correlation.take() {
            tracing::debug!("Frame {} aborted", correlation);
        }
        self.working = None;
    }

    /// State including uncommitted updates of the open frame
    pub fn pending(&self) -> &TableState {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    /// Last committed state
    pub fn snapshot(&self) -> Arc<TableState> {
        Arc::clone(&self.published.read())
    }

    /// Copy of the pending state, for undoing one rejected result
    pub fn savepoint(&self) -> TableState {
        self.pending().clone()
    }

    pub fn rollback_to(&mut self, savepoint: TableState) {
        *self.state() = savepoint;
    }

    fn state(&mut self) -> &mut TableState {
        let committed = &self.committed;
        self.working.get_or_insert_with(|| committed.clone())
    }

    fn check_seat(&self, seat: u8) -> Result<(), ValidationError> {
        if seat == 0 || seat > self.max_seats {
            return Err(ValidationError::InvalidSeat {
                seat,
                max_seats: self.max_seats,
            });
        }
        Ok(())
    }

    fn differs(&self, old: f64, new: f64) -> bool {
        (old - new).abs() > self.tolerance
    }

    fn note(&mut self, field: String, confidence: f32) {
        self.state().confidence.insert(field, confidence);
    }

    pub fn update_pot(&mut self, amount: f64, confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        check_amount("pot", amount)?;
        let changed = self.differs(self.pending().pot, amount);
        if changed {
            self.state().pot = amount;
        }
        self.note("pot".into(), confidence);
        Ok(changed)
    }

    pub fn update_side_pots(&mut self, amounts: &[f64], confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        for &amount in amounts {
            check_amount("side_pot", amount)?;
        }
        let current = &self.pending().side_pots;
        let changed = current.len() != amounts.len()
            || current
                .iter()
                .zip(amounts)
                .any(|(pot, &amount)| self.differs(pot.amount, amount));
        if changed {
            self.state().side_pots = amounts
                .iter()
                .enumerate()
                .map(|(idx, &amount)| SidePot {
                    index: idx + 1,
                    amount,
                })
                .collect();
        }
        self.note("side_pots".into(), confidence);
        Ok(changed)
    }

    /// Replace the board; the street follows the card count
    pub fn update_board(&mut self, cards: &[Card], confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        let street = Street::from_board_len(cards.len())
            .ok_or(ValidationError::InvalidBoard(cards.len()))?;
        check_unique(cards)?;

        let changed = self.pending().board != cards;
        if changed {
            let state = self.state();
            state.board = cards.to_vec();
            state.street = street;
        }
        self.note("board".into(), confidence);
        Ok(changed)
    }

    pub fn update_hero_cards(&mut self, cards: &[Card], confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        if !matches!(cards.len(), 0 | 2 | 4) {
            return Err(ValidationError::InvalidHeroCards(cards.len()));
        }
        check_unique(cards)?;

        let changed = self.pending().hero_cards != cards;
        if changed {
            self.state().hero_cards = cards.to_vec();
        }
        self.note("hero_cards".into(), confidence);
        Ok(changed)
    }

    pub fn update_stack(&mut self, seat: u8, amount: f64, confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        self.check_seat(seat)?;
        check_amount("stack", amount)?;

        let changed = match self.pending().stacks.get(&seat) {
            Some(&old) => self.differs(old, amount),
            None => true,
        };
        if changed {
            self.state().stacks.insert(seat, amount);
        }
        self.note(format!("stack.{}", seat), confidence);
        Ok(changed)
    }

    /// Set or clear a seat's player name
    pub fn update_name(&mut self, seat: u8, name: Option<&str>, confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        self.check_seat(seat)?;

        let changed = self.pending().names.get(&seat).map(String::as_str) != name;
        if changed {
            let state = self.state();
            match name {
                Some(name) => {
                    state.names.insert(seat, name.to_string());
                }
                None => {
                    state.names.remove(&seat);
                }
            }
        }
        self.note(format!("name.{}", seat), confidence);
        Ok(changed)
    }

    pub fn update_active(&mut self, seat: u8, active: bool, confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        self.check_seat(seat)?;

        let changed = self.pending().active.get(&seat).copied().unwrap_or(false) != active;
        if changed {
            self.state().active.insert(seat, active);
            self.refresh_positions();
        }
        self.note(format!("active.{}", seat), confidence);
        Ok(changed)
    }

    pub fn update_button(&mut self, seat: u8, confidence: f32) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        self.check_seat(seat)?;

        let changed = self.pending().button_seat != Some(seat);
        if changed {
            self.state().button_seat = Some(seat);
            self.refresh_positions();
        }
        self.note("button".into(), confidence);
        Ok(changed)
    }

    pub fn update_blinds(
        &mut self,
        small: f64,
        big: f64,
        ante: Option<f64>,
        confidence: f32,
    ) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        check_amount("small_blind", small)?;
        check_amount("big_blind", big)?;
        if let Some(ante) = ante {
            check_amount("ante", ante)?;
        }
        if small > big {
            return Err(ValidationError::InconsistentBlinds { small, big });
        }

        let changed = match self.pending().blinds {
            Some(old) => {
                self.differs(old.small, small)
                    || self.differs(old.big, big)
                    || match (old.ante, ante) {
                        (Some(a), Some(b)) => self.differs(a, b),
                        (None, None) => false,
                        _ => true,
                    }
            }
            None => true,
        };
        if changed {
            self.state().blinds = Some(Blinds { small, big, ante });
        }
        self.note("blinds".into(), confidence);
        Ok(changed)
    }

    pub fn update_action(
        &mut self,
        seat: u8,
        action: PlayerAction,
        amount: Option<f64>,
        confidence: f32,
    ) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        self.check_seat(seat)?;
        if let Some(amount) = amount {
            check_amount("action_amount", amount)?;
        }

        let changed = match self.pending().last_actions.get(&seat) {
            Some(old) => {
                old.action != action
                    || match (old.amount, amount) {
                        (Some(a), Some(b)) => self.differs(a, b),
                        (None, None) => false,
                        _ => true,
                    }
            }
            None => true,
        };
        if changed {
            self.state()
                .last_actions
                .insert(seat, SeatAction { action, amount });
        }
        self.note(format!("action.{}", seat), confidence);
        Ok(changed)
    }

    /// Record whose clock is running; only a change of seat counts as a change
    pub fn update_acting_seat(
        &mut self,
        seat: Option<u8>,
        remaining_secs: f32,
        confidence: f32,
    ) -> Result<bool, ValidationError> {
        check_confidence(confidence)?;
        if let Some(seat) = seat {
            self.check_seat(seat)?;
        }

        let changed = self.pending().acting_seat != seat;
        let state = self.state();
        state.acting_seat = seat;
        state.time_remaining_secs = seat.map(|_| remaining_secs.max(0.0));
        self.note("acting_seat".into(), confidence);
        Ok(changed)
    }

    /// Attach a performance snapshot; always a change
    pub fn update_performance(&mut self, snapshot: PerformanceSnapshot) -> bool {
        self.state().performance = Some(snapshot);
        true
    }

    /// Start a new hand, returning its id
    pub fn start_hand(&mut self) -> String {
        let hand_id = uuid::Uuid::new_v4().to_string();
        self.state().hand_id = Some(hand_id.clone());
        hand_id
    }

    /// Clear hand-scoped fields (board, hero cards, hand id) keeping seats and stacks
    pub fn reset_hand(&mut self) {
        self.state().clear_hand();
    }

    fn refresh_positions(&mut self) {
        let state = self.state();
        state.positions = match state.button_seat {
            Some(button) => assign_positions(button, &state.active_seats()),
            None => Default::default(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Card;
    use crate::state::Position;

    fn tracker() -> StateTracker {
        StateTracker::new(0.01, 6)
    }

    fn cards(text: &str) -> Vec<Card> {
        text.split_whitespace().map(|c| c.parse().unwrap()).collect()
    }

    #[test]
    fn test_identical_update_changes_once() {
        let mut tracker = tracker();
        tracker.begin_frame();
        assert!(tracker.update_pot(125.50, 0.92).unwrap());
        tracker.commit_frame();

        tracker.begin_frame();
        assert!(!tracker.update_pot(125.50, 0.92).unwrap());
        tracker.commit_frame();
        assert_eq!(tracker.snapshot().pot, 125.50);
    }

    #[test]
    fn test_numeric_tolerance() {
        let mut tracker = tracker();
        assert!(tracker.update_pot(10.0, 0.9).unwrap());
        assert!(!tracker.update_pot(10.005, 0.9).unwrap());
        assert!(tracker.update_pot(10.02, 0.9).unwrap());
    }

    #[test]
    fn test_validation_errors() {
        let mut tracker = tracker();
        assert_eq!(
            tracker.update_stack(2, -5.0, 0.9),
            Err(ValidationError::NegativeAmount {
                field: "stack",
                value: -5.0
            })
        );
        assert!(matches!(
            tracker.update_stack(9, 5.0, 0.9),
            Err(ValidationError::InvalidSeat { seat: 9, .. })
        ));
        assert_eq!(
            tracker.update_pot(1.0, 1.5),
            Err(ValidationError::ConfidenceOutOfRange(1.5))
        );
        assert_eq!(
            tracker.update_board(&cards("Ah Kd"), 0.9),
            Err(ValidationError::InvalidBoard(2))
        );
        assert!(matches!(
            tracker.update_hero_cards(&cards("Ah Ah"), 0.9),
            Err(ValidationError::DuplicateCard(_))
        ));
        assert!(matches!(
            tracker.update_blinds(2.0, 1.0, None, 0.9),
            Err(ValidationError::InconsistentBlinds { .. })
        ));
        assert!(matches!(
            tracker.update_pot(f64::NAN, 0.9),
            Err(ValidationError::NonFiniteAmount { .. })
        ));
    }

    #[test]
    fn test_aborted_frame_is_invisible() {
        let mut tracker = tracker();
        tracker.begin_frame();
        tracker.update_pot(50.0, 0.9).unwrap();
        tracker.commit_frame();

        let view = tracker.view();
        tracker.begin_frame();
        tracker.update_pot(80.0, 0.9).unwrap();
        tracker.update_board(&cards("Ah Kd 2c"), 0.9).unwrap();
        assert_eq!(view.current().unwrap().pot, 50.0);
        tracker.abort_frame();

        assert_eq!(tracker.pending().pot, 50.0);
        assert!(tracker.pending().board.is_empty());

        // The aborted value still counts as a change next time
        tracker.begin_frame();
        assert!(tracker.update_pot(80.0, 0.9).unwrap());
        tracker.commit_frame();
        assert_eq!(view.current().unwrap().pot, 80.0);
    }

    #[test]
    fn test_board_sets_street() {
        let mut tracker = tracker();
        tracker.update_board(&cards("Ah Kd 2c"), 0.9).unwrap();
        assert_eq!(tracker.pending().street, Street::Flop);
        tracker.update_board(&cards("Ah Kd 2c 9s"), 0.9).unwrap();
        assert_eq!(tracker.pending().street, Street::Turn);
    }

    #[test]
    fn test_reset_hand_keeps_stacks() {
        let mut tracker = tracker();
        tracker.begin_frame();
        let hand = tracker.start_hand();
        tracker.update_board(&cards("Ah Kd 2c"), 0.9).unwrap();
        tracker.update_hero_cards(&cards("Qs Qh"), 0.9).unwrap();
        tracker.update_stack(1, 100.0, 0.9).unwrap();
        tracker.commit_frame();
        assert_eq!(tracker.snapshot().hand_id.as_deref(), Some(hand.as_str()));

        tracker.begin_frame();
        tracker.reset_hand();
        tracker.commit_frame();

        let state = tracker.snapshot();
        assert!(state.board.is_empty());
        assert!(state.hero_cards.is_empty());
        assert!(state.hand_id.is_none());
        assert_eq!(state.stacks.get(&1), Some(&100.0));
    }

    #[test]
    fn test_positions_follow_button_and_active_seats() {
        let mut tracker = tracker();
        for seat in [1, 3, 5] {
            tracker.update_active(seat, true, 0.9).unwrap();
        }
        assert!(tracker.update_button(3, 0.9).unwrap());
        assert!(!tracker.update_button(3, 0.9).unwrap());

        let positions = &tracker.pending().positions;
        assert_eq!(positions.get(&3), Some(&Position::Button));
        assert_eq!(positions.get(&5), Some(&Position::SmallBlind));
        assert_eq!(positions.get(&1), Some(&Position::BigBlind));

        tracker.update_active(5, false, 0.9).unwrap();
        let positions = &tracker.pending().positions;
        assert_eq!(positions.get(&1), Some(&Position::BigBlind));
        assert!(positions.get(&5).is_none());
    }

    #[test]
    fn test_action_and_acting_seat_changes() {
        let mut tracker = tracker();
        assert!(tracker.update_action(2, PlayerAction::Raise, Some(12.5), 0.9).unwrap());
        assert!(!tracker.update_action(2, PlayerAction::Raise, Some(12.5), 0.9).unwrap());
        assert!(tracker.update_action(2, PlayerAction::Raise, Some(30.0), 0.9).unwrap());

        assert!(tracker.update_acting_seat(Some(4), 12.0, 0.8).unwrap());
        assert!(!tracker.update_acting_seat(Some(4), 11.0, 0.8).unwrap());
        assert_eq!(tracker.pending().time_remaining_secs, Some(11.0));
        assert!(tracker.update_acting_seat(None, 0.0, 0.8).unwrap());
    }

    #[test]
    fn test_offline_view_errors() {
        let tracker = tracker();
        let view = tracker.view();
        assert!(view.current().is_ok());
        tracker.set_offline(true);
        assert!(matches!(view.current(), Err(PipelineError::Offline)));
        assert_eq!(view.last_known().pot, 0.0);
    }
}
