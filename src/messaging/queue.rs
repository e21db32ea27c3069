/// Event queue
///
/// Bounded multi-producer buffer between the detect stage and the dispatch
/// stage. When full, the oldest event is dropped so the newest state always gets
/// through.
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::events::DetectionEvent;

struct QueueInner {
    events: Mutex<VecDeque<DetectionEvent>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Cloneable handle; all clones share one buffer
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                available: Condvar::new(),
                capacity,
                dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Append an event; returns how many old events were dropped to make room
    pub fn push(&self, event: DetectionEvent) -> usize {
        let dropped = {
            let mut events = self.inner.events.lock();
            events.push_back(event);
            self.trim(&mut events)
        };
        self.inner.available.notify_one();
        dropped
    }

    pub fn push_all(&self, batch: impl IntoIterator<Item = DetectionEvent>) -> usize {
        let dropped = {
            let mut events = self.inner.events.lock();
            events.extend(batch);
            self.trim(&mut events)
        };
        self.inner.available.notify_one();
        dropped
    }

    /// Put undelivered events back at the head, ahead of newer ones
    pub fn requeue_front(&self, batch: Vec<DetectionEvent>) -> usize {
        let dropped = {
            let mut events = self.inner.events.lock();
            for event in batch.into_iter().rev() {
                events.push_front(event);
            }
            self.trim(&mut events)
        };
        self.inner.available.notify_one();
        dropped
    }

    fn trim(&self, events: &mut VecDeque<DetectionEvent>) -> usize {
        let excess = events.len().saturating_sub(self.inner.capacity);
        if excess > 0 {
            events.drain(..excess);
            self.inner.dropped.fetch_add(excess as u64, Ordering::Relaxed);
            tracing::debug!("Event queue full, dropped {} oldest events", excess);
        }
        excess
    }

    pub fn pop(&self) -> Option<DetectionEvent> {
        self.inner.events.lock().pop_front()
    }

    /// Pop, waiting up to `timeout` for an event to arrive
    pub fn pop_wait(&self, timeout: Duration) -> Option<DetectionEvent> {
        let mut events = self.inner.events.lock();
        if events.is_empty() && !self.is_closed() {
            self.inner.available.wait_for(&mut events, timeout);
        }
        events.pop_front()
    }

    pub fn drain(&self) -> Vec<DetectionEvent> {
        self.inner.events.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Total events dropped since creation
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Wake any waiting consumer; pushes are still accepted
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::events::{EventType, Severity};
    use std::thread;
    use std::time::Instant;

    fn event(n: usize) -> DetectionEvent {
        DetectionEvent::new(EventType::Info, Severity::Info, format!("event {}", n), "corr")
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = EventQueue::new(256);
        for n in 0..300 {
            queue.push(event(n));
        }

        assert_eq!(queue.len(), 256);
        assert_eq!(queue.dropped(), 44);
        let events = queue.drain();
        assert_eq!(events.first().map(|e| e.message.as_str()), Some("event 44"));
        assert_eq!(events.last().map(|e| e.message.as_str()), Some("event 299"));
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let queue = EventQueue::new(10);
        queue.push(event(3));
        queue.requeue_front(vec![event(1), event(2)]);

        let messages: Vec<_> = queue.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 1", "event 2", "event 3"]);
    }

    #[test]
    fn test_requeue_over_capacity_drops_oldest() {
        let queue = EventQueue::new(3);
        queue.push(event(3));
        queue.push(event(4));
        let dropped = queue.requeue_front(vec![event(1), event(2)]);
        assert_eq!(dropped, 1);

        let messages: Vec<_> = queue.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn test_pop_wait_wakes_on_push() {
        let queue = EventQueue::new(8);
        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(event(1));
        });

        let started = Instant::now();
        let popped = queue.pop_wait(Duration::from_secs(2));
        assert_eq!(popped.map(|e| e.message), Some("event 1".to_string()));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_pop_wait_times_out() {
        let queue = EventQueue::new(8);
        assert!(queue.pop_wait(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_multiple_producers() {
        let queue = EventQueue::new(1000);
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for n in 0..100 {
                        queue.push(event(p * 100 + n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
        assert_eq!(queue.dropped(), 0);
    }
}
