/// Player detector implementation
///
/// Reads name and stack for every seat in the layout. A seat is active when a
/// name is visible and the stack plate does not mark it as sitting out.
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload, SeatReading};
use super::layout::{RelRect, TableLayout};
use super::parse::parse_amount;
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

const INACTIVE_MARKERS: [&str; 4] = ["sitting out", "sit out", "empty", "away"];

#[derive(Debug, Default)]
pub struct PlayerDetector;

impl PlayerDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for PlayerDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Player
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        if context.layout.seats.is_empty() {
            return Err(RecognitionError::failed(DetectorKind::Player, "layout has no seats"));
        }

        let mut seats = Vec::with_capacity(context.layout.seats.len());
        let mut confidences = Vec::new();

        for seat in &context.layout.seats {
            let name_read = context.read(DetectorKind::Player, seat.name, RecognitionHint::Text)?;
            let stack_read = context.read(DetectorKind::Player, seat.stack, RecognitionHint::Amount)?;

            let name = (!name_read.is_blank()).then(|| name_read.label.trim().to_string());
            let stack_label = stack_read.label.to_lowercase();
            let sitting_out = INACTIVE_MARKERS.iter().any(|m| stack_label.contains(m));
            let stack = if sitting_out {
                None
            } else {
                parse_amount(&stack_read.label)
            };

            if name.is_some() {
                confidences.push(name_read.confidence);
            }
            if !stack_read.is_blank() {
                confidences.push(stack_read.confidence);
            }

            seats.push(SeatReading {
                seat: seat.seat,
                active: name.is_some() && !sitting_out,
                name,
                stack,
            });
        }

        // An empty table reads with full certainty that nobody is seated
        let confidence = if confidences.is_empty() {
            1.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        Ok(DetectionResult::new(
            Payload::Players { seats },
            confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        layout
            .seats
            .iter()
            .flat_map(|seat| [seat.name, seat.stack])
            .collect()
    }

    fn name(&self) -> &'static str {
        "PlayerDetector"
    }
}
