/// Event emitter
///
/// Turns detection results into state updates and events:
///
/// ```text
/// DetectionResult ──> ConfidenceGate ──> StateTracker::update_*() ──> DetectionEvent
///                        │ rejected            │ ValidationError
///                        ▼                     ▼
///                   (no event)          warning event, result rolled back
/// ```
///
/// Diffable events are only produced when the tracker reports a change, so an
/// identical result applied twice yields one event.
use crate::confidence::{ConfidenceGate, ConfidenceThresholds, GateVerdict};
use crate::detection::{
    ActionReading, Card, DetectionResult, DetectorKind, Payload, SeatReading,
};
use crate::error::{CaptureError, RecognitionError, ValidationError};
use crate::messaging::{DetectionEvent, EventType, Severity};
use crate::state::{DegradationMode, ModeChange, StateTracker, TableState};

/// What happened to one result
#[derive(Debug)]
pub enum Applied {
    /// Below the kind's minimum confidence; state untouched
    Rejected { confidence: f32 },
    /// Applied; events for every change it caused
    Accepted {
        priority: bool,
        events: Vec<DetectionEvent>,
    },
    /// Violated an invariant; state untouched, a warning event explains why
    Invalid {
        error: ValidationError,
        event: DetectionEvent,
    },
}

pub struct EventEmitter {
    gate: ConfidenceGate,
}

fn cards_text(cards: &[Card]) -> String {
    if cards.is_empty() {
        return "-".to_string();
    }
    cards.iter().map(Card::to_string).collect::<Vec<_>>().join(" ")
}

impl EventEmitter {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self {
            gate: ConfidenceGate::new(thresholds),
        }
    }

    pub fn set_thresholds(&mut self, thresholds: ConfidenceThresholds) {
        self.gate = ConfidenceGate::new(thresholds);
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        self.gate.thresholds()
    }

    /// Gate a result and apply it to the tracker's open frame
    pub fn apply(
        &self,
        tracker: &mut StateTracker,
        result: &DetectionResult,
        correlation_id: &str,
    ) -> Applied {
        let verdict = self.gate.evaluate(result);
        if verdict == GateVerdict::Rejected {
            tracing::debug!(
                "{} result rejected at confidence {:.2}",
                result.kind,
                result.confidence
            );
            return Applied::Rejected {
                confidence: result.confidence,
            };
        }

        let savepoint = tracker.savepoint();
        match self.apply_payload(tracker, result, correlation_id) {
            Ok(events) => Applied::Accepted {
                priority: verdict == GateVerdict::Priority,
                events,
            },
            Err(error) => {
                tracker.rollback_to(savepoint);
                let event = Self::validation_event(result.kind, &error, correlation_id);
                Applied::Invalid { error, event }
            }
        }
    }

    fn apply_payload(
        &self,
        tracker: &mut StateTracker,
        result: &DetectionResult,
        correlation_id: &str,
    ) -> Result<Vec<DetectionEvent>, ValidationError> {
        let confidence = result.confidence;
        match &result.payload {
            Payload::Cards { board, hero } => {
                Self::apply_cards(tracker, board, hero, confidence, correlation_id)
            }
            Payload::Pot { total, side_pots } => {
                let pot_changed = tracker.update_pot(*total, confidence)?;
                let side_changed = tracker.update_side_pots(side_pots, confidence)?;
                if !(pot_changed || side_changed) {
                    return Ok(Vec::new());
                }
                let message = if side_pots.is_empty() {
                    format!("Pot changed to {:.2}", total)
                } else {
                    format!("Pot changed to {:.2} ({} side pots)", total, side_pots.len())
                };
                Ok(vec![DetectionEvent::new(
                    EventType::Pot,
                    Severity::Info,
                    message,
                    correlation_id,
                )
                .with_data("pot", total)
                .with_data("side_pots", side_pots)
                .with_data("confidence", confidence)])
            }
            Payload::Players { seats } => {
                let mut events = Vec::new();
                for reading in seats {
                    if let Some(event) =
                        Self::apply_seat(tracker, reading, confidence, correlation_id)?
                    {
                        events.push(event);
                    }
                }
                Ok(events)
            }
            Payload::Actions { actions } => {
                let mut events = Vec::new();
                for reading in actions {
                    if let Some(event) =
                        Self::apply_action(tracker, reading, confidence, correlation_id)?
                    {
                        events.push(event);
                    }
                }
                Ok(events)
            }
            Payload::Blinds { small, big, ante } => {
                if !tracker.update_blinds(*small, *big, *ante, confidence)? {
                    return Ok(Vec::new());
                }
                let message = match ante {
                    Some(ante) => format!("Blinds {:.2}/{:.2} ante {:.2}", small, big, ante),
                    None => format!("Blinds {:.2}/{:.2}", small, big),
                };
                Ok(vec![DetectionEvent::new(
                    EventType::Blind,
                    Severity::Info,
                    message,
                    correlation_id,
                )
                .with_data("small_blind", small)
                .with_data("big_blind", big)
                .with_data("ante", ante)
                .with_data("confidence", confidence)])
            }
            Payload::Button { seat } => {
                if !tracker.update_button(*seat, confidence)? {
                    return Ok(Vec::new());
                }
                Ok(vec![DetectionEvent::new(
                    EventType::Button,
                    Severity::Info,
                    format!("Button moved to seat {}", seat),
                    correlation_id,
                )
                .with_data("seat", seat)
                .with_data("positions", &tracker.pending().positions)
                .with_data("confidence", confidence)])
            }
            Payload::Timeout {
                seat,
                remaining_secs,
            } => {
                if !tracker.update_acting_seat(*seat, *remaining_secs, confidence)? {
                    return Ok(Vec::new());
                }
                let message = match seat {
                    Some(seat) => format!("Seat {} to act ({:.0}s left)", seat, remaining_secs),
                    None => "No seat to act".to_string(),
                };
                Ok(vec![DetectionEvent::new(
                    EventType::StateChange,
                    Severity::Debug,
                    message,
                    correlation_id,
                )
                .with_data("acting_seat", seat)
                .with_data("remaining_secs", seat.map(|_| *remaining_secs))
                .with_data("confidence", confidence)])
            }
        }
    }

    /// Hand boundaries, then card changes, then the street
    fn apply_cards(
        tracker: &mut StateTracker,
        board: &[Card],
        hero: &[Card],
        confidence: f32,
        correlation_id: &str,
    ) -> Result<Vec<DetectionEvent>, ValidationError> {
        let mut events = Vec::new();
        let before = tracker.pending().clone();

        let new_hole_cards = !hero.is_empty() && before.hero_cards != hero;
        let board_cleared = !before.board.is_empty() && board.is_empty();

        if new_hole_cards || board_cleared {
            if let Some(hand_id) = before.hand_id.as_deref() {
                events.push(Self::hand_end_event(hand_id, &before, correlation_id));
            }
            tracker.reset_hand();
        }
        if new_hole_cards {
            let hand_id = tracker.start_hand();
            events.push(
                DetectionEvent::new(
                    EventType::HandStart,
                    Severity::Info,
                    format!("Hand started with {}", cards_text(hero)),
                    correlation_id,
                )
                .with_data("hand_id", &hand_id)
                .with_data("hero_cards", hero)
                .with_data("button_seat", tracker.pending().button_seat),
            );
        }

        let street_before = tracker.pending().street;
        let hero_changed = tracker.update_hero_cards(hero, confidence)?;
        let board_changed = tracker.update_board(board, confidence)?;

        if hero_changed || board_changed {
            events.push(
                DetectionEvent::new(
                    EventType::Card,
                    Severity::Info,
                    format!("Board {} | Hero {}", cards_text(board), cards_text(hero)),
                    correlation_id,
                )
                .with_data("board", board)
                .with_data("hero_cards", hero)
                .with_data("confidence", confidence),
            );
        }

        let street = tracker.pending().street;
        if street != street_before {
            events.push(
                DetectionEvent::new(
                    EventType::StreetChange,
                    Severity::Info,
                    format!("Street changed to {}", street),
                    correlation_id,
                )
                .with_data("from", street_before)
                .with_data("street", street)
                .with_data("board", board),
            );
        }

        Ok(events)
    }

    pub(crate) fn hand_end_event(hand_id: &str, state: &TableState, correlation_id: &str) -> DetectionEvent {
        DetectionEvent::new(
            EventType::HandEnd,
            Severity::Info,
            format!("Hand ended on the {}", state.street),
            correlation_id,
        )
        .with_data("hand_id", hand_id)
        .with_data("board", &state.board)
        .with_data("hero_cards", &state.hero_cards)
        .with_data("pot", state.pot)
    }

    fn apply_seat(
        tracker: &mut StateTracker,
        reading: &SeatReading,
        confidence: f32,
        correlation_id: &str,
    ) -> Result<Option<DetectionEvent>, ValidationError> {
        let seat = reading.seat;
        let mut changed = tracker.update_active(seat, reading.active, confidence)?;
        changed |= tracker.update_name(seat, reading.name.as_deref(), confidence)?;
        if let Some(stack) = reading.stack {
            changed |= tracker.update_stack(seat, stack, confidence)?;
        }
        if !changed {
            return Ok(None);
        }

        let state = tracker.pending();
        let name = state.names.get(&seat).cloned();
        let stack = state.stacks.get(&seat).copied();
        let label = name.clone().unwrap_or_else(|| "empty".to_string());
        let message = match stack {
            Some(stack) => format!("Seat {} ({}) stack {:.2}", seat, label, stack),
            None => format!("Seat {} ({})", seat, label),
        };
        Ok(Some(
            DetectionEvent::new(EventType::Player, Severity::Info, message, correlation_id)
                .with_data("seat", seat)
                .with_data("name", name)
                .with_data("stack", stack)
                .with_data("active", reading.active)
                .with_data("position", state.positions.get(&seat))
                .with_data("confidence", confidence),
        ))
    }

    fn apply_action(
        tracker: &mut StateTracker,
        reading: &ActionReading,
        confidence: f32,
        correlation_id: &str,
    ) -> Result<Option<DetectionEvent>, ValidationError> {
        if !tracker.update_action(reading.seat, reading.action, reading.amount, confidence)? {
            return Ok(None);
        }
        let message = match reading.amount {
            Some(amount) => format!("Seat {} {} {:.2}", reading.seat, reading.action.name(), amount),
            None => format!("Seat {} {}", reading.seat, reading.action.name()),
        };
        Ok(Some(
            DetectionEvent::new(EventType::Action, Severity::Info, message, correlation_id)
                .with_data("seat", reading.seat)
                .with_data("action", reading.action)
                .with_data("amount", reading.amount)
                .with_data("confidence", confidence),
        ))
    }

    fn validation_event(kind: DetectorKind, error: &ValidationError, correlation_id: &str) -> DetectionEvent {
        DetectionEvent::new(
            EventType::Warning,
            Severity::Warning,
            format!("{} result rejected: {}", kind, error),
            correlation_id,
        )
        .with_data("detector", kind)
        .with_data("error", error.to_string())
    }

    /// A detector failed or timed out
    pub fn recognition_error_event(error: &RecognitionError, correlation_id: &str) -> DetectionEvent {
        let mut event = DetectionEvent::new(
            EventType::Error,
            Severity::Warning,
            error.to_string(),
            correlation_id,
        )
        .with_data("timeout", error.is_timeout());
        if let Some(kind) = error.kind() {
            event = event.with_data("detector", kind);
        }
        event
    }

    /// Capture retries ran out for one cycle
    pub fn capture_error_event(error: &CaptureError, attempts: u32, correlation_id: &str) -> DetectionEvent {
        DetectionEvent::new(
            EventType::Error,
            Severity::Error,
            format!("Capture failed after {} attempts: {}", attempts, error),
            correlation_id,
        )
        .with_data("attempts", attempts)
        .with_data("error", error.to_string())
    }

    pub fn mode_change_event(change: &ModeChange, correlation_id: &str) -> DetectionEvent {
        let severity = match (change.to, change.is_degradation()) {
            (DegradationMode::Offline, _) => Severity::Critical,
            (_, true) => Severity::Warning,
            (DegradationMode::Full, false) => Severity::Success,
            (_, false) => Severity::Info,
        };
        let verb = if change.is_degradation() { "degraded" } else { "recovered" };
        DetectionEvent::new(
            EventType::System,
            severity,
            format!("Detection {} from {} to {}: {}", verb, change.from, change.to, change.reason),
            correlation_id,
        )
        .with_data("from", change.from)
        .with_data("to", change.to)
        .with_data("reason", &change.reason)
        .with_data("active_kinds", change.to.allowed_kinds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::PlayerAction;
    use crate::state::Street;

    fn tracker() -> StateTracker {
        StateTracker::new(0.01, 6)
    }

    fn emitter() -> EventEmitter {
        EventEmitter::new(ConfidenceThresholds::default())
    }

    fn cards(text: &str) -> Vec<Card> {
        text.split_whitespace().map(|c| c.parse().unwrap()).collect()
    }

    fn accepted(applied: Applied) -> Vec<DetectionEvent> {
        match applied {
            Applied::Accepted { events, .. } => events,
            other => panic!("expected accepted result, got {:?}", other),
        }
    }

    fn types(events: &[DetectionEvent]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    fn pot(total: f64, confidence: f32) -> DetectionResult {
        DetectionResult::new(
            Payload::Pot {
                total,
                side_pots: Vec::new(),
            },
            confidence,
            1,
        )
    }

    fn card_result(board: &str, hero: &str) -> DetectionResult {
        DetectionResult::new(
            Payload::Cards {
                board: cards(board),
                hero: cards(hero),
            },
            0.95,
            1,
        )
    }

    #[test]
    fn test_pot_change_emits_once() {
        let emitter = emitter();
        let mut tracker = tracker();

        let events = accepted(emitter.apply(&mut tracker, &pot(125.50, 0.92), "c1"));
        assert_eq!(types(&events), vec![EventType::Pot]);
        assert_eq!(events[0].data["pot"], serde_json::json!(125.5));
        assert_eq!(events[0].correlation_id, "c1");

        let events = accepted(emitter.apply(&mut tracker, &pot(125.50, 0.92), "c2"));
        assert!(events.is_empty());
    }

    #[test]
    fn test_low_confidence_rejected() {
        let emitter = emitter();
        let mut tracker = tracker();

        let applied = emitter.apply(&mut tracker, &pot(125.50, 0.40), "c1");
        assert!(matches!(applied, Applied::Rejected { .. }));
        assert_eq!(tracker.pending().pot, 0.0);
    }

    #[test]
    fn test_priority_flag() {
        let emitter = emitter();
        let mut tracker = tracker();
        assert!(matches!(
            emitter.apply(&mut tracker, &pot(10.0, 0.95), "c1"),
            Applied::Accepted { priority: true, .. }
        ));
        assert!(matches!(
            emitter.apply(&mut tracker, &pot(20.0, 0.70), "c1"),
            Applied::Accepted { priority: false, .. }
        ));
    }

    #[test]
    fn test_invalid_result_rolled_back() {
        let emitter = emitter();
        let mut tracker = tracker();
        let result = DetectionResult::new(
            Payload::Players {
                seats: vec![
                    SeatReading {
                        seat: 1,
                        name: Some("Hero".into()),
                        stack: Some(100.0),
                        active: true,
                    },
                    SeatReading {
                        seat: 2,
                        name: Some("Villain".into()),
                        stack: Some(-4.0),
                        active: true,
                    },
                ],
            },
            0.9,
            1,
        );

        match emitter.apply(&mut tracker, &result, "c1") {
            Applied::Invalid { error, event } => {
                assert!(matches!(error, ValidationError::NegativeAmount { .. }));
                assert_eq!(event.event_type, EventType::Warning);
                assert_eq!(event.data["detector"], serde_json::json!("player"));
            }
            other => panic!("expected invalid result, got {:?}", other),
        }
        // Seat 1 was applied before seat 2 failed and is undone too
        assert!(tracker.pending().stacks.is_empty());
        assert!(tracker.pending().names.is_empty());
    }

    #[test]
    fn test_hand_lifecycle() {
        let emitter = emitter();
        let mut tracker = tracker();

        let events = accepted(emitter.apply(&mut tracker, &card_result("", "Qs Qh"), "c1"));
        assert_eq!(types(&events), vec![EventType::HandStart, EventType::Card]);
        let first_hand = tracker.pending().hand_id.clone();
        assert!(first_hand.is_some());

        let events = accepted(emitter.apply(&mut tracker, &card_result("Ah Kd 2c", "Qs Qh"), "c2"));
        assert_eq!(types(&events), vec![EventType::Card, EventType::StreetChange]);
        assert_eq!(events[1].data["street"], serde_json::json!("flop"));
        assert_eq!(tracker.pending().street, Street::Flop);

        // New hole cards end the old hand and start another
        let events = accepted(emitter.apply(&mut tracker, &card_result("", "7c 2d"), "c3"));
        assert_eq!(
            types(&events),
            vec![EventType::HandEnd, EventType::HandStart, EventType::Card]
        );
        assert_eq!(events[0].data["hand_id"], serde_json::json!(first_hand));
        assert_ne!(tracker.pending().hand_id, first_hand);
        assert_eq!(tracker.pending().street, Street::Preflop);
    }

    #[test]
    fn test_board_cleared_ends_hand() {
        let emitter = emitter();
        let mut tracker = tracker();
        accepted(emitter.apply(&mut tracker, &card_result("", "Qs Qh"), "c1"));
        accepted(emitter.apply(&mut tracker, &card_result("Ah Kd 2c 9s", ""), "c2"));

        let events = accepted(emitter.apply(&mut tracker, &card_result("", ""), "c3"));
        assert_eq!(types(&events)[0], EventType::HandEnd);
        assert!(tracker.pending().hand_id.is_none());
        assert!(tracker.pending().board.is_empty());
    }

    #[test]
    fn test_action_and_button_events() {
        let emitter = emitter();
        let mut tracker = tracker();
        let actions = DetectionResult::new(
            Payload::Actions {
                actions: vec![ActionReading {
                    seat: 3,
                    action: PlayerAction::Raise,
                    amount: Some(6.0),
                }],
            },
            0.9,
            1,
        );
        let events = accepted(emitter.apply(&mut tracker, &actions, "c1"));
        assert_eq!(events[0].message, "Seat 3 raise 6.00");
        assert!(accepted(emitter.apply(&mut tracker, &actions, "c2")).is_empty());

        let button = DetectionResult::new(Payload::Button { seat: 4 }, 0.9, 1);
        let events = accepted(emitter.apply(&mut tracker, &button, "c3"));
        assert_eq!(types(&events), vec![EventType::Button]);
    }

    #[test]
    fn test_mode_change_severity() {
        let change = ModeChange {
            from: DegradationMode::Fallback,
            to: DegradationMode::Offline,
            reason: "capture failed".into(),
        };
        let event = EventEmitter::mode_change_event(&change, "c1");
        assert_eq!(event.event_type, EventType::System);
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.data["to"], serde_json::json!("OFFLINE"));

        let change = ModeChange {
            from: DegradationMode::Partial,
            to: DegradationMode::Full,
            reason: "card detector recovered".into(),
        };
        assert_eq!(EventEmitter::mode_change_event(&change, "c1").severity, Severity::Success);
    }
}
