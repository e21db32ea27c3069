/// Turn timer detector implementation
///
/// Reads the countdown shown under the acting seat. No visible timer is a
/// valid reading (`seat: None`), not a failure.
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::parse::parse_seconds;
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

#[derive(Debug, Default)]
pub struct TimeoutDetector;

impl TimeoutDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for TimeoutDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Timeout
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let mut blank_confidence = 1.0f32;

        for seat in &context.layout.seats {
            let read = context.read(DetectorKind::Timeout, seat.timer, RecognitionHint::Timer)?;
            if read.is_blank() {
                blank_confidence = blank_confidence.min(read.confidence);
                continue;
            }
            if let Some(remaining_secs) = parse_seconds(&read.label) {
                return Ok(DetectionResult::new(
                    Payload::Timeout {
                        seat: Some(seat.seat),
                        remaining_secs,
                    },
                    read.confidence,
                    context.frame.id,
                ));
            }
        }

        Ok(DetectionResult::new(
            Payload::Timeout {
                seat: None,
                remaining_secs: 0.0,
            },
            blank_confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        layout.seats.iter().map(|seat| seat.timer).collect()
    }

    fn name(&self) -> &'static str {
        "TimeoutDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PaletteTable;

    #[test]
    fn test_reads_acting_seat_timer() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.seat(3).unwrap().timer, "0:12", 0.83);

        let result = TimeoutDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Timeout {
                seat: Some(3),
                remaining_secs: 12.0
            }
        );
    }

    #[test]
    fn test_no_timer_visible() {
        let table = PaletteTable::new();
        let result = TimeoutDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Timeout {
                seat: None,
                remaining_secs: 0.0
            }
        );
        assert!((result.confidence - 0.95).abs() < f32::EPSILON);
    }
}
