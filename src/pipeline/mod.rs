/// Pipeline module
///
/// Wires capture, detection, state tracking and delivery into one running
/// system. `Orchestrator` is the entry point; the stages are exposed for tests
/// and custom drivers.
pub mod capture_stage;
pub mod detect_stage;
pub mod dispatch_stage;
pub mod emitter;
pub mod orchestrator;

pub use capture_stage::{CaptureMessage, CaptureStage};
pub use detect_stage::DetectStage;
pub use dispatch_stage::DispatchStage;
pub use emitter::{Applied, EventEmitter};
pub use orchestrator::{Orchestrator, RunEnd};
