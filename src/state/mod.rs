/// State management module
///
/// The canonical table state, its single writer, and the degradation ladder
/// that decides which detectors feed it.
pub mod degradation;
pub mod lifecycle;
pub mod table_state;
pub mod tracker;

// Re-export commonly used types
pub use degradation::{DegradationManager, DegradationMode, ModeChange};
pub use lifecycle::{Lifecycle, LifecycleMachine};
pub use table_state::{
    assign_positions, Blinds, KindPerformance, PerformanceSnapshot, Position, SeatAction,
    SidePot, Street, TableState,
};
pub use tracker::{CorrelationId, StateTracker, StateView};
