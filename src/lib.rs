//! Table Watch
//!
//! Watches a poker table window, reads its state with a set of detectors and
//! streams confidence-gated change events to subscribers.
//!
//! ```text
//! SourceClassifier ──> SourceCapture ──> DetectorPipeline ──> EventEmitter ──> StateTracker
//!                                              │                    │
//!                                              ▼                    ▼
//!                            AccuracyTracker + DegradationManager   EventQueue ──> Batcher ──> BroadcastDispatcher
//! ```
pub mod cache;
pub mod capture;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod detection;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod ocr;
pub mod pipeline;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod utils;

pub use config::Config;
pub use error::{AppResult, PipelineError};
pub use pipeline::Orchestrator;
