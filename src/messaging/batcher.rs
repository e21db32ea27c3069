/// Event batcher
///
/// Coalesces bursts into batches. A batch is flushed when it reaches
/// `max_size` events or when `interval` has passed since its first event.
/// Ordering is preserved within and across batches.
use serde::Serialize;
use std::time::{Duration, Instant};

use super::events::DetectionEvent;

/// Events flushed together, numbered in flush order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBatch {
    pub sequence: u64,
    pub events: Vec<DetectionEvent>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct Batcher {
    pending: Vec<DetectionEvent>,
    opened_at: Option<Instant>,
    interval: Duration,
    max_size: usize,
    next_sequence: u64,
}

impl Batcher {
    pub fn new(interval: Duration, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            pending: Vec::with_capacity(max_size),
            opened_at: None,
            interval,
            max_size,
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, event: DetectionEvent) -> Option<EventBatch> {
        self.push_at(event, Instant::now())
    }

    /// Add an event; returns the batch when it is full
    pub fn push_at(&mut self, event: DetectionEvent, now: Instant) -> Option<EventBatch> {
        if self.pending.is_empty() {
            self.opened_at = Some(now);
        }
        self.pending.push(event);
        if self.pending.len() >= self.max_size {
            return self.flush();
        }
        None
    }

    pub fn poll(&mut self) -> Option<EventBatch> {
        self.poll_at(Instant::now())
    }

    /// Flush when the open batch is older than the interval
    pub fn poll_at(&mut self, now: Instant) -> Option<EventBatch> {
        match self.opened_at {
            Some(opened) if now.saturating_duration_since(opened) >= self.interval => self.flush(),
            _ => None,
        }
    }

    /// Flush whatever is pending
    pub fn flush(&mut self) -> Option<EventBatch> {
        self.opened_at = None;
        if self.pending.is_empty() {
            return None;
        }
        let events = std::mem::replace(&mut self.pending, Vec::with_capacity(self.max_size));
        let batch = EventBatch {
            sequence: self.next_sequence,
            events,
        };
        self.next_sequence += 1;
        Some(batch)
    }

    /// Time left before the open batch is due
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.opened_at
            .map(|opened| self.interval.saturating_sub(now.saturating_duration_since(opened)))
    }

    /// Take back pending events (used on shutdown to requeue them)
    pub fn take_pending(&mut self) -> Vec<DetectionEvent> {
        self.opened_at = None;
        std::mem::take(&mut self.pending)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
