/// Broadcast dispatcher
///
/// Fans event batches out to every subscriber without blocking the producer.
/// Zero subscribers is a normal state. A failing subscriber never affects the
/// others: channel subscribers that are full are skipped (backpressure), and any
/// subscriber is dropped after too many consecutive failures or on disconnect.
///
/// A channel subscriber whose receiver went away is parked under its name. Batches
/// delivered elsewhere while it is parked are kept (bounded by `backlog_limit`
/// events, oldest batches dropped first) and replayed in order when the same name
/// subscribes again.
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::batcher::EventBatch;
use super::subscribers::ChannelSubscriber;
use crate::error::DispatchError;

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

/// Consumer of event batches (logging sink, file sink, ...)
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, batch: &EventBatch) -> Result<(), DispatchError>;
}

struct Entry {
    id: SubscriberId,
    name: String,
    subscriber: Box<dyn Subscriber>,
    consecutive_failures: AtomicUsize,
}

/// Batches missed by a disconnected subscriber
#[derive(Default)]
struct Backlog {
    batches: VecDeque<EventBatch>,
    events: usize,
}

impl Backlog {
    fn push(&mut self, batch: EventBatch, limit: usize) {
        self.events += batch.len();
        self.batches.push_back(batch);
        while self.events > limit && self.batches.len() > 1 {
            if let Some(dropped) = self.batches.pop_front() {
                self.events -= dropped.len();
            }
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub errors: Vec<DispatchError>,
    pub removed: Vec<SubscriberId>,
}

impl DispatchReport {
    /// Nobody received the batch
    pub fn undelivered(&self) -> bool {
        self.delivered == 0
    }
}

#[derive(Clone)]
pub struct BroadcastDispatcher {
    subscribers: Arc<RwLock<Vec<Entry>>>,
    parked: Arc<Mutex<HashMap<String, Backlog>>>,
    next_id: Arc<AtomicUsize>,
    buffer: usize,
    max_consecutive_failures: usize,
    backlog_limit: usize,
}

impl BroadcastDispatcher {
    /// `buffer` bounds each channel subscription (in batches)
    pub fn new(buffer: usize, max_consecutive_failures: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            parked: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicUsize::new(0)),
            buffer: buffer.max(1),
            max_consecutive_failures: max_consecutive_failures.max(1),
            backlog_limit: DEFAULT_BACKLOG_LIMIT,
        }
    }

    /// Events kept per disconnected subscriber
    pub fn with_backlog_limit(mut self, limit: usize) -> Self {
        self.backlog_limit = limit.max(1);
        self
    }

    fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe through a bounded channel, returns a receiver and subscription ID
    ///
    /// Reusing the name of a disconnected subscriber replays what it missed.
    pub fn subscribe(&self, name: &str) -> (Receiver<EventBatch>, SubscriberId) {
        let missed: Vec<EventBatch> = self
            .parked
            .lock()
            .remove(name)
            .map(|backlog| backlog.batches.into_iter().collect())
            .unwrap_or_default();
        if !missed.is_empty() {
            tracing::info!("Subscriber '{}' reconnected, replaying {} batches", name, missed.len());
        }
        let (subscriber, rx) = ChannelSubscriber::with_backlog(name, self.buffer, missed);
        let id = self.add_subscriber(Box::new(subscriber));
        (rx, id)
    }

    /// Names of disconnected subscribers still holding a backlog
    pub fn parked(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parked.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop the backlog of a subscriber that will not come back
    pub fn forget(&self, name: &str) {
        self.parked.lock().remove(name);
    }

    pub fn add_subscriber(&self, subscriber: Box<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id();
        let name = subscriber.name().to_string();
        tracing::info!("Subscriber '{}' attached", name);
        self.subscribers.write().push(Entry {
            id,
            name,
            subscriber,
            consecutive_failures: AtomicUsize::new(0),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Deliver one batch to every subscriber
    pub fn dispatch(&self, batch: &EventBatch) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut doomed = Vec::new();
        let mut disconnected_names = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for entry in subscribers.iter() {
                match entry.subscriber.deliver(batch) {
                    Ok(()) => {
                        entry.consecutive_failures.store(0, Ordering::Relaxed);
                        report.delivered += 1;
                    }
                    Err(err) => {
                        let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        let disconnected = matches!(err, DispatchError::Disconnected(_));
                        if disconnected {
                            disconnected_names.push(entry.name.clone());
                        }
                        if disconnected || failures >= self.max_consecutive_failures {
                            doomed.push(entry.id);
                        }
                        tracing::warn!("Batch {} not delivered: {}", batch.sequence, err);
                        report.errors.push(err);
                    }
                }
            }
        }

        if !doomed.is_empty() {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|entry| {
                let keep = !doomed.contains(&entry.id);
                if !keep {
                    tracing::info!("Subscriber '{}' removed", entry.name);
                }
                keep
            });
            report.removed = doomed;
        }

        self.park(disconnected_names, batch, report.delivered > 0);
        report
    }

    /// Keep the batch for every parked subscriber
    ///
    /// A batch nobody received goes back to the queue, so parking it too would
    /// deliver it twice.
    fn park(&self, disconnected: Vec<String>, batch: &EventBatch, delivered: bool) {
        let mut parked = self.parked.lock();
        for name in disconnected {
            tracing::info!("Subscriber '{}' disconnected, keeping its backlog", name);
            parked.entry(name).or_default();
        }
        if !delivered {
            return;
        }
        for backlog in parked.values_mut() {
            backlog.push(batch.clone(), self.backlog_limit);
        }
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
        self.parked.lock().clear();
    }
}

const DEFAULT_BACKLOG_LIMIT: usize = 256;

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new(64, 5)
    }
}
