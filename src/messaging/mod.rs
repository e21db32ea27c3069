/// Messaging module
///
/// Events flow one way, commands the other:
/// - **Events**: what the pipeline observed (past tense, broadcast to subscribers)
/// - **Commands**: requests to a running pipeline (imperative, targeted)
///
/// ## Architecture
///
/// ```text
/// ┌──────────┐  events  ┌───────┐  drain  ┌─────────┐  batches  ┌────────────┐
/// │ Detect   │ ───────> │ Queue │ ──────> │ Batcher │ ────────> │ Dispatcher │
/// │  stage   │          │ (256) │         │         │           │            │
/// └──────────┘          └───────┘         └─────────┘           └────────────┘
///      ▲                                                               │
///      │ PipelineCommand                                               ▼
///   callers                                                      subscribers
/// ```
pub mod batcher;
pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod queue;
pub mod subscribers;

// Re-export commonly used types
pub use batcher::{Batcher, EventBatch};
pub use commands::PipelineCommand;
pub use dispatcher::{BroadcastDispatcher, DispatchReport, Subscriber, SubscriberId};
pub use events::{DetectionEvent, EventType, Severity};
pub use queue::EventQueue;
pub use subscribers::{ChannelSubscriber, JsonLinesSubscriber, LoggingSubscriber};
