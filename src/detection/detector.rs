/// Detector trait and common types
///
/// Defines the interface shared by all table detectors.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::cards::Card;
use super::layout::{RelRect, TableLayout};
use super::recognizer::{Recognition, RecognitionHint, Recognizer};
use crate::capture::Frame;
use crate::error::RecognitionError;

/// Detector variants, one per table dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Card,
    Pot,
    Player,
    Action,
    Blind,
    Button,
    Timeout,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 7] = [
        DetectorKind::Card,
        DetectorKind::Pot,
        DetectorKind::Player,
        DetectorKind::Action,
        DetectorKind::Blind,
        DetectorKind::Button,
        DetectorKind::Timeout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::Card => "card",
            DetectorKind::Pot => "pot",
            DetectorKind::Player => "player",
            DetectorKind::Action => "action",
            DetectorKind::Blind => "blind",
            DetectorKind::Button => "button",
            DetectorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Betting action read from a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
    Post,
}

impl PlayerAction {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerAction::Fold => "fold",
            PlayerAction::Check => "check",
            PlayerAction::Call => "call",
            PlayerAction::Bet => "bet",
            PlayerAction::Raise => "raise",
            PlayerAction::AllIn => "all_in",
            PlayerAction::Post => "post",
        }
    }
}

/// One seat as read by the player detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatReading {
    pub seat: u8,
    pub name: Option<String>,
    pub stack: Option<f64>,
    pub active: bool,
}

/// One seat action as read by the action detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReading {
    pub seat: u8,
    pub action: PlayerAction,
    pub amount: Option<f64>,
}

/// Type-specific detection payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Cards { board: Vec<Card>, hero: Vec<Card> },
    Pot { total: f64, side_pots: Vec<f64> },
    Players { seats: Vec<SeatReading> },
    Actions { actions: Vec<ActionReading> },
    Blinds { small: f64, big: f64, ante: Option<f64> },
    Button { seat: u8 },
    /// `seat` is `None` when no timer is visible
    Timeout { seat: Option<u8>, remaining_secs: f32 },
}

impl Payload {
    pub fn kind(&self) -> DetectorKind {
        match self {
            Payload::Cards { .. } => DetectorKind::Card,
            Payload::Pot { .. } => DetectorKind::Pot,
            Payload::Players { .. } => DetectorKind::Player,
            Payload::Actions { .. } => DetectorKind::Action,
            Payload::Blinds { .. } => DetectorKind::Blind,
            Payload::Button { .. } => DetectorKind::Button,
            Payload::Timeout { .. } => DetectorKind::Timeout,
        }
    }
}

/// Detection result from a detector. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub kind: DetectorKind,
    pub payload: Payload,
    /// Confidence level (0.0-1.0)
    pub confidence: f32,
    pub timestamp: Instant,
    pub frame_id: u64,
}

impl DetectionResult {
    pub fn new(payload: Payload, confidence: f32, frame_id: u64) -> Self {
        Self {
            kind: payload.kind(),
            payload,
            confidence,
            timestamp: Instant::now(),
            frame_id,
        }
    }

    /// Replay a cached verdict against a newer frame
    pub fn replayed_for(&self, frame_id: u64) -> Self {
        Self {
            timestamp: Instant::now(),
            frame_id,
            ..self.clone()
        }
    }
}

/// Context passed to detectors
///
/// The frame is shared read-only between all detectors of one cycle.
#[derive(Clone)]
pub struct DetectionContext {
    pub frame: Arc<Frame>,
    pub layout: Arc<TableLayout>,
    pub recognizer: Arc<dyn Recognizer>,
}

impl DetectionContext {
    pub fn new(frame: Arc<Frame>, layout: Arc<TableLayout>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            frame,
            layout,
            recognizer,
        }
    }

    /// Crop a region from the frame and run the recognizer on it
    pub fn read(
        &self,
        kind: DetectorKind,
        rect: RelRect,
        hint: RecognitionHint,
    ) -> Result<Recognition, RecognitionError> {
        let region = self
            .frame
            .crop(rect)
            .map_err(|err| RecognitionError::failed(kind, err))?;
        self.recognizer
            .recognize(&region, hint)
            .map_err(|err| err.for_kind(kind))
    }
}

/// Detector trait
///
/// Implement this trait to add a detector for a table dimension. Detectors never
/// mutate shared state and report every failure as a `RecognitionError`.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Detect one table dimension from the frame
    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError>;

    /// Relative regions this detector reads, used to key the result cache
    fn regions(&self, layout: &TableLayout) -> Vec<RelRect>;

    /// Get detector name (for logging)
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_mapping() {
        let payload = Payload::Pot {
            total: 12.0,
            side_pots: vec![],
        };
        assert_eq!(payload.kind(), DetectorKind::Pot);
        assert_eq!(Payload::Button { seat: 3 }.kind(), DetectorKind::Button);
    }

    #[test]
    fn test_result_takes_kind_from_payload() {
        let result = DetectionResult::new(Payload::Button { seat: 2 }, 0.9, 7);
        assert_eq!(result.kind, DetectorKind::Button);
        assert_eq!(result.frame_id, 7);

        let replay = result.replayed_for(8);
        assert_eq!(replay.payload, result.payload);
        assert_eq!(replay.frame_id, 8);
    }

    #[test]
    fn test_kind_names_are_lowercase() {
        let names: Vec<_> = DetectorKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["card", "pot", "player", "action", "blind", "button", "timeout"]
        );
    }
}
