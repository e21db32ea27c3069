/// Metrics module
///
/// Rolling accuracy and latency figures per detector kind.
pub mod accuracy;

pub use accuracy::{AccuracyLimits, AccuracyTracker, Outcome};
