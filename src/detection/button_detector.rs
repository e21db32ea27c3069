/// Dealer button detector implementation
///
/// Checks the button marker region of every seat and picks the most confident
/// hit.
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

#[derive(Debug, Default)]
pub struct ButtonDetector;

impl ButtonDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for ButtonDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Button
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let mut best: Option<(u8, f32)> = None;

        for seat in &context.layout.seats {
            let read = context.read(DetectorKind::Button, seat.button, RecognitionHint::Marker)?;
            if read.is_blank() {
                continue;
            }
            if best.map_or(true, |(_, confidence)| read.confidence > confidence) {
                best = Some((seat.seat, read.confidence));
            }
        }

        let (seat, confidence) = best.ok_or_else(|| RecognitionError::Unreadable {
            kind: DetectorKind::Button,
            label: String::new(),
        })?;

        Ok(DetectionResult::new(
            Payload::Button { seat },
            confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        layout.seats.iter().map(|seat| seat.button).collect()
    }

    fn name(&self) -> &'static str {
        "ButtonDetector"
    }
}
