/// Detection module
///
/// Turns one captured frame into typed, confidence-scored results, one per
/// table dimension.
///
/// ## Architecture
///
/// ```text
/// DetectorPipeline
///   ├── ResultCache (unchanged regions replay the last verdict)
///   ├── Worker pool (one thread per detector kind, per-call budget)
///   └── Detector (interpretation of recognized labels)
///       ├── CardDetector
///       ├── PotDetector
///       ├── PlayerDetector
///       ├── ActionDetector
///       ├── BlindDetector
///       ├── ButtonDetector
///       └── TimeoutDetector
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use table_watch::detection::{DetectorPipeline, DetectorRegistry, DetectionContext};
///
/// let registry = DetectorRegistry::with_defaults();
/// let pipeline = DetectorPipeline::new(registry.len(), budget, ttl, capacity)?;
///
/// let context = DetectionContext::new(frame, layout, recognizer);
/// for outcome in pipeline.run(&context, &registry.select(&active_kinds)) {
///     if let Some(result) = outcome.result() {
///         println!("{}: {:?}", result.kind, result.payload);
///     }
/// }
/// ```
pub mod action_detector;
pub mod blind_detector;
pub mod button_detector;
pub mod card_detector;
pub mod cards;
pub mod detector;
pub mod layout;
pub mod parse;
pub mod pipeline;
pub mod player_detector;
pub mod pot_detector;
pub mod recognizer;
pub mod registry;
pub mod timeout_detector;

// Re-export commonly used types
pub use action_detector::ActionDetector;
pub use blind_detector::BlindDetector;
pub use button_detector::ButtonDetector;
pub use card_detector::CardDetector;
pub use cards::{Card, Rank, Suit};
pub use detector::{
    ActionReading, DetectionContext, DetectionResult, Detector, DetectorKind, Payload,
    PlayerAction, SeatReading,
};
pub use layout::{RelRect, SeatLayout, TableLayout};
pub use pipeline::{CacheStats, DetectorOutcome, DetectorPipeline};
pub use player_detector::PlayerDetector;
pub use pot_detector::PotDetector;
pub use recognizer::{BlankRecognizer, Recognition, RecognitionHint, Recognizer};
pub use registry::DetectorRegistry;
pub use timeout_detector::TimeoutDetector;
