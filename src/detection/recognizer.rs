/// Recognition primitive
///
/// The pixel classification itself (OCR, template matching, color classes) is an
/// external capability. Detectors only see labels and confidences.
use image::RgbaImage;

use crate::error::RecognitionError;

/// What kind of content the region is expected to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionHint {
    /// Free text (player names, action labels, stakes)
    Text,
    /// Chip amounts
    Amount,
    /// One or more playing cards
    Cards,
    /// Presence marker (dealer button)
    Marker,
    /// Countdown seconds
    Timer,
}

/// Raw label and confidence returned by a recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub label: String,
    /// Confidence level (0.0-1.0)
    pub confidence: f32,
}

impl Recognition {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Empty label, nothing recognized in the region
    pub fn is_blank(&self) -> bool {
        self.label.trim().is_empty()
    }
}

/// Recognition capability consumed by every detector
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        region: &RgbaImage,
        hint: RecognitionHint,
    ) -> Result<Recognition, RecognitionError>;

    fn name(&self) -> &'static str;
}

/// Recognizer that never sees anything
///
/// Stand-in when no recognition backend is compiled in: every region reads as
/// blank, so detectors report nothing and the table state stays empty.
pub struct BlankRecognizer;

impl Recognizer for BlankRecognizer {
    fn recognize(
        &self,
        _region: &RgbaImage,
        _hint: RecognitionHint,
    ) -> Result<Recognition, RecognitionError> {
        Ok(Recognition::new("", 0.0))
    }

    fn name(&self) -> &'static str {
        "blank"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_clamps_confidence() {
        assert_eq!(Recognition::new("x", 1.4).confidence, 1.0);
        assert_eq!(Recognition::new("x", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_blank_recognizer_reads_nothing() {
        let region = RgbaImage::new(4, 4);
        let reading = BlankRecognizer.recognize(&region, RecognitionHint::Amount).unwrap();
        assert!(reading.is_blank());
        assert_eq!(reading.confidence, 0.0);
    }

    #[test]
    fn test_blank_label() {
        assert!(Recognition::new("  ", 0.9).is_blank());
        assert!(!Recognition::new("Ah", 0.9).is_blank());
    }
}
