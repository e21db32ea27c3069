/// Action detector implementation
///
/// Reads the last action label shown next to each seat.
use super::detector::{ActionReading, DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::parse::parse_action;
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

#[derive(Debug, Default)]
pub struct ActionDetector;

impl ActionDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for ActionDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Action
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let mut actions = Vec::new();
        let mut confidences = Vec::new();

        for seat in &context.layout.seats {
            let read = context.read(DetectorKind::Action, seat.action, RecognitionHint::Text)?;
            if read.is_blank() {
                continue;
            }

            match parse_action(&read.label) {
                Some((action, amount)) => {
                    confidences.push(read.confidence);
                    actions.push(ActionReading {
                        seat: seat.seat,
                        action,
                        amount,
                    });
                }
                None => {
                    // Names or chat bubbles sometimes overlap the action plate
                    tracing::trace!("Seat {} action label ignored: '{}'", seat.seat, read.label);
                }
            }
        }

        let confidence = if confidences.is_empty() {
            1.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        Ok(DetectionResult::new(
            Payload::Actions { actions },
            confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        layout.seats.iter().map(|seat| seat.action).collect()
    }

    fn name(&self) -> &'static str {
        "ActionDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detector::PlayerAction;
    use crate::testing::PaletteTable;

    #[test]
    fn test_reads_seat_actions() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table
            .label(layout.seat(2).unwrap().action, "Raise 12.50", 0.9)
            .label(layout.seat(4).unwrap().action, "Fold", 0.7)
            .label(layout.seat(5).unwrap().action, "Good luck!", 0.6);

        let result = ActionDetector::new().detect(&table.context(1)).unwrap();
        assert!((result.confidence - 0.8).abs() < 1e-4);
        assert_eq!(
            result.payload,
            Payload::Actions {
                actions: vec![
                    ActionReading {
                        seat: 2,
                        action: PlayerAction::Raise,
                        amount: Some(12.5)
                    },
                    ActionReading {
                        seat: 4,
                        action: PlayerAction::Fold,
                        amount: None
                    },
                ]
            }
        );
    }

    #[test]
    fn test_no_actions_visible() {
        let table = PaletteTable::new();
        let result = ActionDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(result.payload, Payload::Actions { actions: vec![] });
    }
}
