//! Event subscriptions.
//!
//! An [`EventSubscription`] is registered as a listener with a notification
//! source. Each delivered batch is translated, sealed into one bundle and
//! queued; a consumer polls with [`EventSubscription::get_event_bundles`].
//!
//! ```text
//! source ──on_event──► translate ──► bundle ──► queue ──poll──► filter ──► consumer
//! ```
//!
//! Changes made through the subscription's own session are captured by a
//! second, short-lived listener (see [`EventSubscription::with_local_listener`])
//! and delivered as local bundles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use spibridge_proto::{EventBundle, IdFactory};

use crate::accumulator::BundleAccumulator;
use crate::config::SubscriptionConfig;
use crate::error::Error;
use crate::filter::{apply_filters, SharedFilter};
use crate::queue::BundleQueue;
use crate::session::ContentSession;
use crate::source::{ChangeNotification, EventListener, ListenerId, ListenerOptions, NotificationSource};
use crate::translator::EventTranslator;

/// Counters of a subscription since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Bundles queued (one per delivered batch).
    pub bundles_published: u64,
    /// Notifications translated into events.
    pub events_translated: u64,
    /// Notifications dropped because translation failed.
    pub translation_failures: u64,
    /// Bundles handed to consumers.
    pub bundles_delivered: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    bundles_published: AtomicU64,
    events_translated: AtomicU64,
    translation_failures: AtomicU64,
    bundles_delivered: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> SubscriptionStats {
        SubscriptionStats {
            bundles_published: self.bundles_published.load(Ordering::Relaxed),
            events_translated: self.events_translated.load(Ordering::Relaxed),
            translation_failures: self.translation_failures.load(Ordering::Relaxed),
            bundles_delivered: self.bundles_delivered.load(Ordering::Relaxed),
        }
    }
}

struct Inner<S> {
    id_factory: Arc<dyn IdFactory>,
    session: Arc<S>,
    queue: BundleQueue,
    config: SubscriptionConfig,
    stats: StatsCounters,
}

impl<S: ContentSession> Inner<S> {
    fn create_event_bundle(&self, notifications: Vec<ChangeNotification>, is_local: bool) {
        let translator = EventTranslator::new(self.id_factory.as_ref(), self.session.as_ref());
        let batch = translator.translate_batch(notifications);
        let failures = batch.failures.len();

        let mut accumulator = BundleAccumulator::new(is_local);
        accumulator.extend(batch.events);
        let bundle = accumulator.finish();

        self.stats
            .events_translated
            .fetch_add(bundle.len() as u64, Ordering::Relaxed);
        self.stats
            .translation_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
        self.stats.bundles_published.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            bundle_id = %bundle.bundle_id(),
            events = bundle.len(),
            dropped = failures,
            is_local,
            "event bundle created"
        );

        self.queue.publish(bundle);
    }
}

/// A subscription to repository changes.
///
/// Cloning yields another handle to the same subscription.
pub struct EventSubscription<S: ContentSession> {
    inner: Arc<Inner<S>>,
}

impl<S: ContentSession> Clone for EventSubscription<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ContentSession> EventSubscription<S> {
    /// Create a subscription translating against `session`.
    pub fn new(
        id_factory: Arc<dyn IdFactory>,
        session: Arc<S>,
        config: SubscriptionConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                id_factory,
                session,
                queue: BundleQueue::new(),
                config,
                stats: StatsCounters::default(),
            }),
        })
    }

    /// The subscription configuration.
    pub fn config(&self) -> &SubscriptionConfig {
        &self.inner.config
    }

    /// A listener that queues the batches it receives as local bundles.
    pub fn local_listener(&self) -> LocalEventListener<S> {
        LocalEventListener {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Translate and queue a batch as a remote bundle.
    pub fn on_remote_event(&self, notifications: Vec<ChangeNotification>) {
        self.inner.create_event_bundle(notifications, false);
    }

    /// Take all pending bundles, waiting up to `timeout` for the first one,
    /// and filter them.
    ///
    /// The timeout is clamped to the configured maximum. An empty result
    /// means nothing arrived in time. Each returned bundle keeps its id and
    /// locality and holds the events accepted by at least one filter; with no
    /// filters every event is returned.
    pub fn get_event_bundles(&self, filters: &[SharedFilter], timeout: Duration) -> Vec<EventBundle> {
        let timeout = self.inner.config.effective_timeout(timeout);
        let bundles = self.inner.queue.drain_all(timeout);
        if bundles.is_empty() {
            tracing::trace!(timeout_ms = timeout.as_millis() as u64, "poll timed out");
            return bundles;
        }

        self.inner
            .stats
            .bundles_delivered
            .fetch_add(bundles.len() as u64, Ordering::Relaxed);

        let filtered = apply_filters(bundles, filters);
        tracing::debug!(
            bundles = filtered.len(),
            events = filtered.iter().map(EventBundle::len).sum::<usize>(),
            filters = filters.len(),
            "event bundles delivered"
        );
        filtered
    }

    /// [`get_event_bundles`](Self::get_event_bundles) with the configured
    /// poll timeout.
    pub fn get_event_bundles_default(&self, filters: &[SharedFilter]) -> Vec<EventBundle> {
        self.get_event_bundles(filters, self.inner.config.poll_timeout)
    }

    /// Number of bundles waiting to be polled.
    pub fn pending_bundles(&self) -> usize {
        self.inner.queue.len()
    }

    /// Counters since creation.
    pub fn stats(&self) -> SubscriptionStats {
        self.inner.stats.snapshot()
    }
}

impl<S: ContentSession + 'static> EventSubscription<S> {
    /// Register with `source` for changes made by other sessions.
    pub fn register<N>(&self, source: &N) -> Result<ListenerId, Error>
    where
        N: NotificationSource + ?Sized,
    {
        let id = source.add_listener(
            Arc::new(self.clone()),
            ListenerOptions::remote(self.inner.config.event_types),
        )?;
        tracing::debug!(listener_id = id, "subscription registered");
        Ok(id)
    }

    /// Run `operation` with a temporary local listener attached to `source`.
    ///
    /// Changes the operation makes are queued as local bundles. The listener
    /// is removed afterwards, also when the operation panics.
    pub fn with_local_listener<N, F, T>(&self, source: &N, operation: F) -> Result<T, Error>
    where
        N: NotificationSource + ?Sized,
        F: FnOnce() -> T,
    {
        let id = source.add_listener(
            Arc::new(self.local_listener()),
            ListenerOptions::all(self.inner.config.event_types),
        )?;
        let _registration = ListenerRegistration { source, id };
        Ok(operation())
    }
}

#[cfg(feature = "async")]
impl<S: ContentSession + 'static> EventSubscription<S> {
    /// Async variant of [`get_event_bundles`](Self::get_event_bundles).
    ///
    /// The wait runs on tokio's blocking pool.
    pub async fn get_event_bundles_async(
        &self,
        filters: Vec<SharedFilter>,
        timeout: Duration,
    ) -> Result<Vec<EventBundle>, Error> {
        let subscription = self.clone();
        tokio::task::spawn_blocking(move || subscription.get_event_bundles(&filters, timeout))
            .await
            .map_err(|e| Error::Runtime(format!("poll task failed: {}", e)))
    }
}

impl<S: ContentSession> EventListener for EventSubscription<S> {
    fn on_event(&self, notifications: Vec<ChangeNotification>) {
        self.on_remote_event(notifications);
    }
}

/// Removes a listener registration when dropped.
struct ListenerRegistration<'a, N: NotificationSource + ?Sized> {
    source: &'a N,
    id: ListenerId,
}

impl<N: NotificationSource + ?Sized> Drop for ListenerRegistration<'_, N> {
    fn drop(&mut self) {
        if let Err(e) = self.source.remove_listener(self.id) {
            tracing::warn!(listener_id = self.id, error = %e, "unable to remove local listener");
        }
    }
}

/// Listener producing local bundles for its subscription.
pub struct LocalEventListener<S: ContentSession> {
    inner: Arc<Inner<S>>,
}

impl<S: ContentSession> EventListener for LocalEventListener<S> {
    fn on_event(&self, notifications: Vec<ChangeNotification>) {
        self.inner.create_event_bundle(notifications, true);
    }
}

#[cfg(test)]
mod tests {
    use spibridge_proto::{DefaultIdFactory, EventType};

    use super::*;
    use crate::memory::{MemorySession, MemoryStore};

    fn subscription(session: MemorySession) -> EventSubscription<MemorySession> {
        EventSubscription::new(
            Arc::new(DefaultIdFactory),
            Arc::new(session),
            SubscriptionConfig::new().with_poll_timeout(Duration::from_millis(20)),
        )
        .unwrap()
    }

    #[test]
    fn test_each_batch_becomes_one_bundle() {
        let store = MemoryStore::new();
        let observer = store.login("observer");
        let sub = subscription(observer.clone());
        let writer = store.login("writer");
        sub.register(&observer).unwrap();

        writer
            .batch(|b| {
                b.add_node("/a", "nt:unstructured")?;
                b.set_property("/a", "title", "hello")
            })
            .unwrap();
        writer.add_node("/b", "nt:folder").unwrap();

        let bundles = sub.get_event_bundles_default(&[]);
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].len(), 2);
        assert_eq!(bundles[1].len(), 1);
        assert!(bundles.iter().all(|b| !b.is_local()));

        let stats = sub.stats();
        assert_eq!(stats.bundles_published, 2);
        assert_eq!(stats.events_translated, 3);
        assert_eq!(stats.bundles_delivered, 2);
        assert_eq!(sub.pending_bundles(), 0);
    }

    #[test]
    fn test_empty_translation_still_queues_a_bundle() {
        let store = MemoryStore::new();
        let sub = subscription(store.login("observer"));

        sub.on_remote_event(vec![
            ChangeNotification::new(EventType::NodeAdded, "bad path"),
            ChangeNotification::new(EventType::PropertyAdded, "/missing/prop"),
        ]);

        assert_eq!(sub.pending_bundles(), 1);
        let bundles = sub.get_event_bundles_default(&[]);
        assert_eq!(bundles.len(), 1);
        assert!(bundles[0].is_empty());
        assert_eq!(sub.stats().translation_failures, 2);
    }

    #[test]
    fn test_local_listener_removed_when_operation_panics() {
        let store = MemoryStore::new();
        let observer = store.login("observer");
        let sub = subscription(observer.clone());
        sub.register(&observer).unwrap();
        assert_eq!(store.listener_count(), 1);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sub.with_local_listener::<_, _, ()>(&observer, || panic!("operation failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(store.listener_count(), 1);

        observer.add_node("/later", "nt:unstructured").unwrap();
        assert!(sub.get_event_bundles(&[], Duration::ZERO).is_empty());
    }

    #[test]
    fn test_local_listener_result_is_returned() {
        let store = MemoryStore::new();
        let observer = store.login("observer");
        let sub = subscription(observer.clone());

        let value = sub
            .with_local_listener(&observer, || {
                observer.add_node("/mine", "nt:unstructured").unwrap();
                42
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(store.listener_count(), 0);

        let bundles = sub.get_event_bundles(&[], Duration::ZERO);
        assert_eq!(bundles.len(), 1);
        assert!(bundles[0].is_local());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = MemoryStore::new();
        let result = EventSubscription::new(
            Arc::new(DefaultIdFactory),
            Arc::new(store.login("observer")),
            SubscriptionConfig::new().with_event_types(0),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_timeout_is_clamped() {
        let store = MemoryStore::new();
        let sub = EventSubscription::new(
            Arc::new(DefaultIdFactory),
            Arc::new(store.login("observer")),
            SubscriptionConfig::new()
                .with_poll_timeout(Duration::from_millis(10))
                .with_max_poll_timeout(Duration::from_millis(50)),
        )
        .unwrap();

        let start = std::time::Instant::now();
        assert!(sub.get_event_bundles(&[], Duration::from_secs(30)).is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
