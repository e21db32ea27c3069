/// Dispatch stage
///
/// Drains the event queue through the batcher into the dispatcher. Events stay
/// queued while nobody is subscribed; a batch nobody accepted goes back to the
/// front of the queue.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::messaging::{Batcher, BroadcastDispatcher, EventBatch, EventQueue};

const IDLE_WAIT: Duration = Duration::from_millis(20);

pub struct DispatchStage {
    queue: EventQueue,
    dispatcher: BroadcastDispatcher,
    batcher: Batcher,
}

impl DispatchStage {
    pub fn new(queue: EventQueue, dispatcher: BroadcastDispatcher, batcher: Batcher) -> Self {
        Self {
            queue,
            dispatcher,
            batcher,
        }
    }

    pub fn run(mut self, stop: Arc<AtomicBool>) -> Self {
        tracing::info!("Dispatch stage started");
        while !stop.load(Ordering::SeqCst) {
            self.step();
        }
        self.drain();
        tracing::info!("Dispatch stage stopped");
        self
    }

    /// Move at most one event (or one due batch) towards subscribers
    pub fn step(&mut self) {
        if !self.dispatcher.has_subscribers() {
            let pending = self.batcher.take_pending();
            if !pending.is_empty() {
                self.queue.requeue_front(pending);
            }
            std::thread::sleep(IDLE_WAIT);
            return;
        }

        let wait = self
            .batcher
            .time_until_due(Instant::now())
            .map_or(IDLE_WAIT, |due| due.min(IDLE_WAIT));
        let batch = match self.queue.pop_wait(wait) {
            Some(event) => self.batcher.push(event),
            None => self.batcher.poll(),
        };
        if let Some(batch) = batch {
            if !self.deliver(batch) {
                std::thread::sleep(IDLE_WAIT);
            }
        }
    }

    /// Flush everything still queued; run once on shutdown
    pub fn drain(&mut self) {
        if !self.dispatcher.has_subscribers() {
            return;
        }
        for event in self.queue.drain() {
            if let Some(batch) = self.batcher.push(event) {
                self.deliver(batch);
            }
        }
        if let Some(batch) = self.batcher.flush() {
            self.deliver(batch);
        }
    }

    fn deliver(&mut self, batch: EventBatch) -> bool {
        let report = self.dispatcher.dispatch(&batch);
        for error in &report.errors {
            tracing::debug!("Batch {}: {}", batch.sequence, error);
        }
        if report.undelivered() {
            tracing::debug!("Batch {} reached no subscriber, requeued", batch.sequence);
            self.queue.requeue_front(batch.events);
            return false;
        }
        true
    }
}
