/// Pipeline commands
///
/// Requests sent to a running orchestrator (imperative, targeted).
/// They are handled by the detect stage between cycles.
use crate::capture::SourceHandle;
use crate::confidence::ConfidenceThresholds;

#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Stop all stages after the current cycle
    Stop,

    /// Replace the confidence thresholds; invalid sets are rejected
    ReloadThresholds(ConfidenceThresholds),

    /// Drop hand-scoped state (board, hero cards, hand id)
    ResetHand,

    /// Capture from this source instead of the classifier's pick
    SelectSource(SourceHandle),
}

impl PipelineCommand {
    /// Get a human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            PipelineCommand::Stop => "Stop pipeline".to_string(),
            PipelineCommand::ReloadThresholds(thresholds) => {
                format!("Reload thresholds ({} kinds)", thresholds.len())
            }
            PipelineCommand::ResetHand => "Reset hand".to_string(),
            PipelineCommand::SelectSource(handle) => format!("Select source: {}", handle),
        }
    }
}
