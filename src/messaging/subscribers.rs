/// Built-in subscribers
///
/// `ChannelSubscriber` feeds an in-process consumer (dashboard, strategy engine)
/// through a bounded channel. `LoggingSubscriber` writes every batch to the log.
/// `JsonLinesSubscriber` appends the wire JSON of each event to a file.
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::batcher::EventBatch;
use super::dispatcher::Subscriber;
use super::events::Severity;
use crate::error::DispatchError;

pub struct ChannelSubscriber {
    name: String,
    sender: Sender<EventBatch>,
}

impl ChannelSubscriber {
    /// Create the subscriber and the receiving end of its bounded buffer
    pub fn new(name: &str, buffer: usize) -> (Self, Receiver<EventBatch>) {
        Self::with_backlog(name, buffer, Vec::new())
    }

    /// Like `new`, with `backlog` already waiting in the channel
    pub fn with_backlog(
        name: &str,
        buffer: usize,
        backlog: Vec<EventBatch>,
    ) -> (Self, Receiver<EventBatch>) {
        let (sender, receiver) = bounded(buffer.max(1) + backlog.len());
        for batch in backlog {
            // Capacity covers the whole backlog
            let _ = sender.try_send(batch);
        }
        (
            Self {
                name: name.to_string(),
                sender,
            },
            receiver,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, batch: &EventBatch) -> Result<(), DispatchError> {
        self.sender.try_send(batch.clone()).map_err(|err| match err {
            TrySendError::Full(_) => DispatchError::Backpressure(self.name.clone()),
            TrySendError::Disconnected(_) => DispatchError::Disconnected(self.name.clone()),
        })
    }
}

/// Logs events at a level matching their severity
pub struct LoggingSubscriber {
    min_severity: Severity,
}

impl LoggingSubscriber {
    pub fn new(min_severity: Severity) -> Self {
        Self { min_severity }
    }
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

impl Subscriber for LoggingSubscriber {
    fn name(&self) -> &str {
        "logging"
    }

    fn deliver(&self, batch: &EventBatch) -> Result<(), DispatchError> {
        tracing::debug!("Batch {} with {} events", batch.sequence, batch.len());
        for event in batch.events.iter().filter(|e| e.severity >= self.min_severity) {
            match event.severity {
                Severity::Critical | Severity::Error => {
                    tracing::error!(correlation = %event.correlation_id, "{}", event)
                }
                Severity::Warning => tracing::warn!(correlation = %event.correlation_id, "{}", event),
                Severity::Info | Severity::Success => {
                    tracing::info!(correlation = %event.correlation_id, "{}", event)
                }
                Severity::Debug => tracing::debug!(correlation = %event.correlation_id, "{}", event),
            }
        }
        Ok(())
    }
}

/// Appends one JSON object per event
pub struct JsonLinesSubscriber {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSubscriber {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!("Writing events to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failure(&self, err: impl std::fmt::Display) -> DispatchError {
        DispatchError::DeliveryFailed {
            subscriber: self.name().to_string(),
            message: err.to_string(),
        }
    }
}

impl Subscriber for JsonLinesSubscriber {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn deliver(&self, batch: &EventBatch) -> Result<(), DispatchError> {
        let mut writer = self.writer.lock();
        for event in &batch.events {
            let line = event.to_json().map_err(|e| self.failure(e))?;
            writeln!(writer, "{}", line).map_err(|e| self.failure(e))?;
        }
        writer.flush().map_err(|e| self.failure(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::events::{DetectionEvent, EventType};

    fn batch() -> EventBatch {
        EventBatch {
            sequence: 3,
            events: vec![
                DetectionEvent::new(EventType::Pot, Severity::Info, "Pot changed to 125.50", "c1")
                    .with_data("pot", 125.5),
                DetectionEvent::new(EventType::Error, Severity::Warning, "card timed out", "c1"),
            ],
        }
    }

    #[test]
    fn test_channel_subscriber_backpressure() {
        let (subscriber, rx) = ChannelSubscriber::new("dashboard", 1);
        assert!(subscriber.deliver(&batch()).is_ok());
        assert!(matches!(
            subscriber.deliver(&batch()),
            Err(DispatchError::Backpressure(_))
        ));
        assert_eq!(rx.try_recv().unwrap().sequence, 3);

        drop(rx);
        assert!(matches!(
            subscriber.deliver(&batch()),
            Err(DispatchError::Disconnected(_))
        ));
    }

    #[test]
    fn test_logging_subscriber_never_fails() {
        let subscriber = LoggingSubscriber::default();
        assert!(subscriber.deliver(&batch()).is_ok());
    }

    #[test]
    fn test_jsonl_appends_wire_events() {
        let dir = std::env::temp_dir().join(format!("table-watch-jsonl-{}", uuid::Uuid::new_v4()));
        let path = dir.join("events.jsonl");
        let subscriber = JsonLinesSubscriber::create(&path).unwrap();

        subscriber.deliver(&batch()).unwrap();
        subscriber.deliver(&batch()).unwrap();

        let content = std::fs::read_to_string(subscriber.path()).unwrap();
        let events: Vec<DetectionEvent> = content
            .lines()
            .map(|line| DetectionEvent::from_json(line).unwrap())
            .collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type, EventType::Pot);
        assert_eq!(events[0].data["pot"], serde_json::json!(125.5));

        std::fs::remove_dir_all(dir).ok();
    }
}
