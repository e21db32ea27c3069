use thiserror::Error;

use crate::detection::DetectorKind;

/// Pipeline errors using thiserror for structured error handling.
///
/// Recognition and validation failures are recovered locally by the pipeline.
/// Configuration errors are fatal at startup only. None of these may terminate
/// the capture loop.

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture source is unreachable: {0}")]
    SourceUnavailable(String),

    #[error("Capture source is gone: {0}")]
    SourceGone(String),

    #[error("No capture source matched the table classifier")]
    NoSource,

    #[error("Failed to capture source {source_id}")]
    CaptureFailed {
        source_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to enumerate capture sources")]
    EnumerationFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("{kind} detector timed out after {budget_ms}ms")]
    Timeout { kind: DetectorKind, budget_ms: u64 },

    #[error("{kind} detector failed: {message}")]
    Failed { kind: DetectorKind, message: String },

    #[error("{kind} detector could not read a value from '{label}'")]
    Unreadable { kind: DetectorKind, label: String },

    #[error("Recognition primitive failed: {0}")]
    Primitive(String),
}

impl RecognitionError {
    /// Build a failure from any displayable cause
    pub fn failed(kind: DetectorKind, cause: impl std::fmt::Display) -> Self {
        RecognitionError::Failed {
            kind,
            message: cause.to_string(),
        }
    }

    /// Attach a detector kind to a primitive failure
    pub fn for_kind(self, kind: DetectorKind) -> Self {
        match self {
            RecognitionError::Primitive(message) => RecognitionError::Failed { kind, message },
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RecognitionError::Timeout { .. })
    }

    /// Detector kind, unless the primitive failed outside any detector
    pub fn kind(&self) -> Option<DetectorKind> {
        match self {
            RecognitionError::Timeout { kind, .. }
            | RecognitionError::Failed { kind, .. }
            | RecognitionError::Unreadable { kind, .. } => Some(*kind),
            RecognitionError::Primitive(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Negative {field}: {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("Amount for {field} is not finite")]
    NonFiniteAmount { field: &'static str },

    #[error("Confidence out of range: {0} (must be 0.0-1.0)")]
    ConfidenceOutOfRange(f32),

    #[error("Duplicate card in reading: {0}")]
    DuplicateCard(String),

    #[error("Board must hold 0, 3, 4 or 5 cards, got {0}")]
    InvalidBoard(usize),

    #[error("Hero must hold 0, 2 or 4 cards, got {0}")]
    InvalidHeroCards(usize),

    #[error("Seat {seat} is outside the table (max {max_seats})")]
    InvalidSeat { seat: u8, max_seats: u8 },

    #[error("Region [{x:.3}, {y:.3}, {width:.3}, {height:.3}] lies outside the frame")]
    RegionOutOfBounds {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    #[error("Blind levels are inconsistent: small {small} > big {big}")]
    InconsistentBlinds { small: f64, big: f64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Subscriber {0} disconnected")]
    Disconnected(String),

    #[error("Subscriber {0} is full, batch skipped")]
    Backpressure(String),

    #[error("Subscriber {subscriber} failed: {message}")]
    DeliveryFailed { subscriber: String, message: String },
}

impl DispatchError {
    pub fn subscriber(&self) -> &str {
        match self {
            DispatchError::Disconnected(name) | DispatchError::Backpressure(name) => name,
            DispatchError::DeliveryFailed { subscriber, .. } => subscriber,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not locate a configuration directory")]
    NoConfigDirectory,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline not running")]
    NotRunning,

    #[error("Pipeline already running")]
    AlreadyRunning,

    #[error("Pipeline is offline, no table state is served")]
    Offline,

    #[error("Failed to start {stage} thread")]
    ThreadSpawnFailed {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build detector worker pool")]
    WorkerPool(#[source] rayon::ThreadPoolBuildError),

    #[error("Pipeline stages were lost to a panic and cannot be restarted")]
    StagesLost,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
