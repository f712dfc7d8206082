//! Pending-bundle queue with bounded-wait drain.
//!
//! Producers append bundles; the single consumer takes *all* pending bundles
//! at once. One wake-up per publish is enough because a woken drain empties
//! the whole queue.
//!
//! ```text
//! listener thread(s):  publish(b1) ─┐
//!                      publish(b2) ─┼─► [b1, b2, b3] ──► drain_all(timeout) ─► consumer
//!                      publish(b3) ─┘
//! ```

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use spibridge_proto::EventBundle;

/// Thread-safe FIFO of bundles awaiting delivery.
///
/// The lock is held only to append or to swap out the list; translation and
/// filtering happen outside of it.
#[derive(Debug, Default)]
pub struct BundleQueue {
    pending: Mutex<Vec<EventBundle>>,
    available: Condvar,
}

impl BundleQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bundle and wake a waiting drain.
    pub fn publish(&self, bundle: EventBundle) {
        let mut pending = self.pending.lock();
        pending.push(bundle);
        let queued = pending.len();
        self.available.notify_one();
        drop(pending);

        tracing::trace!(queued, "bundle published");
    }

    /// Take every pending bundle, waiting up to `timeout` for one to arrive.
    ///
    /// The deadline is fixed on entry: spurious wake-ups re-check the queue
    /// and keep waiting only for the time that is left. Returns an empty
    /// vector when nothing arrived in time.
    pub fn drain_all(&self, timeout: Duration) -> Vec<EventBundle> {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.pending.lock();

        while pending.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
                // timeout too large to represent: wait for a publish
                None => self.available.wait(&mut pending),
            }
        }

        std::mem::take(&mut *pending)
    }

    /// Take every pending bundle without waiting.
    pub fn try_drain(&self) -> Vec<EventBundle> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of pending bundles.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no bundle is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn bundle(id: &str) -> EventBundle {
        EventBundle::new(Vec::new(), false, id)
    }

    fn ids(bundles: &[EventBundle]) -> Vec<&str> {
        bundles.iter().map(|b| b.bundle_id()).collect()
    }

    #[test]
    fn test_drain_returns_everything_in_publish_order() {
        let queue = BundleQueue::new();
        queue.publish(bundle("1"));
        queue.publish(bundle("2"));
        queue.publish(bundle("3"));
        assert_eq!(queue.len(), 3);

        let drained = queue.drain_all(Duration::from_millis(10));
        assert_eq!(ids(&drained), vec!["1", "2", "3"]);
        assert!(queue.is_empty());

        queue.publish(bundle("4"));
        assert_eq!(ids(&queue.drain_all(Duration::from_millis(10))), vec!["4"]);
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let queue = BundleQueue::new();
        let start = Instant::now();
        assert!(queue.drain_all(Duration::ZERO).is_empty());
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(queue.try_drain().is_empty());
    }

    #[test]
    fn test_timeout_with_nothing_published() {
        let queue = BundleQueue::new();
        let start = Instant::now();
        let drained = queue.drain_all(Duration::from_millis(100));
        let elapsed = start.elapsed();

        assert!(drained.is_empty());
        assert!(elapsed >= Duration::from_millis(100), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "returned late: {elapsed:?}");
    }

    #[test]
    fn test_publish_wakes_blocked_drain() {
        let queue = Arc::new(BundleQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                let drained = queue.drain_all(Duration::from_millis(5000));
                (drained, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        let producers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.publish(bundle(id)))
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let (drained, elapsed) = consumer.join().unwrap();
        assert!(!drained.is_empty());
        assert!(elapsed < Duration::from_millis(2000), "drain waited {elapsed:?}");

        // whatever the first drain missed is still queued
        let rest = queue.try_drain();
        assert_eq!(drained.len() + rest.len(), 2);
    }

    #[test]
    fn test_spurious_wakeups_keep_the_deadline() {
        let queue = Arc::new(BundleQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let noise = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    queue.available.notify_all();
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let start = Instant::now();
        let drained = queue.drain_all(Duration::from_millis(150));
        let elapsed = start.elapsed();
        done.store(true, Ordering::SeqCst);
        noise.join().unwrap();

        assert!(drained.is_empty());
        assert!(elapsed >= Duration::from_millis(150), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "deadline extended: {elapsed:?}");
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(BundleQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.publish(bundle(&format!("{p}-{i}")));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            seen.extend(queue.drain_all(Duration::from_millis(500)));
        }
        for producer in producers {
            producer.join().unwrap();
        }

        let unique: HashSet<&str> = seen.iter().map(|b| b.bundle_id()).collect();
        assert_eq!(seen.len(), 1000);
        assert_eq!(unique.len(), 1000);

        // per-producer order survives
        for p in 0..4 {
            let prefix = format!("{p}-");
            let order: Vec<usize> = seen
                .iter()
                .filter_map(|b| b.bundle_id().strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(order, (0..250).collect::<Vec<_>>());
        }
    }
}
