//! Event bus with priority-ordered synchronous delivery and an async queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use maestro_core::EventType;

use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::history::{DEFAULT_HISTORY_CAPACITY, EventHistory, HistoryFilter};
use crate::queue::EventQueue;
use crate::subscriber::{DeliveryResult, EventHandler, SubscriberRegistry, Subscription, SubscriptionId};

/// Default wake-up interval of the async consumer when the queue is idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time allowed for the async consumer to stop.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Event bus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Number of delivered events kept in history.
    pub history_capacity: usize,
    /// How often the idle async consumer re-checks its stop signal.
    pub poll_interval: Duration,
    /// How long `stop_consumer` waits for the consumer task.
    pub join_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Subscriber table and history, guarded together.
#[derive(Debug)]
struct BusState {
    subscribers: SubscriberRegistry,
    history: EventHistory,
}

/// Handle to the running async consumer.
#[derive(Debug)]
struct ConsumerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct BusInner {
    config: BusConfig,
    state: RwLock<BusState>,
    queue: Mutex<EventQueue>,
    notify: Arc<Notify>,
    consumer: Mutex<Option<ConsumerHandle>>,
}

impl BusInner {
    fn read_state(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_consumer(&self) -> MutexGuard<'_, Option<ConsumerHandle>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish(&self, mut event: Event) -> Vec<DeliveryResult> {
        // Snapshot so handlers may subscribe or unsubscribe while we deliver.
        let subscriptions = self.read_state().subscribers.snapshot(event.event_type);

        trace!(
            event_id = %event.id,
            event_type = %event.event_type,
            subscriber_count = subscriptions.len(),
            "Publishing event"
        );

        let mut results = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            results.push(subscription.deliver(&event).await);
        }

        event.processed = true;
        let values: Vec<Value> = results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.result.clone())
            .collect();
        if !values.is_empty() {
            event.result = Some(Value::Array(values));
        }
        let failures: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.handler_id,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        if !failures.is_empty() {
            event.error = Some(failures.join("; "));
        }

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            delivered = results.len(),
            failed = failures.len(),
            "Event published"
        );

        self.write_state().history.push(event);
        results
    }
}

/// Publish/subscribe hub.
///
/// Cloning the bus is cheap; clones share subscribers, history and the async
/// queue. Handlers must not store a strong clone of the bus they are
/// subscribed to if the bus is expected to be dropped; the async consumer
/// itself only holds a weak reference.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                state: RwLock::new(BusState {
                    subscribers: SubscriberRegistry::new(),
                    history: EventHistory::new(config.history_capacity),
                }),
                queue: Mutex::new(EventQueue::new()),
                notify: Arc::new(Notify::new()),
                consumer: Mutex::new(None),
            }),
        }
    }

    /// Bus configuration.
    #[must_use]
    pub fn config(&self) -> BusConfig {
        self.inner.config
    }

    /// Subscribe a handler to one event type.
    ///
    /// Subscribing again with the same `id` for the same event type replaces
    /// the previous subscription. Without an id a random one is generated.
    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        id: Option<SubscriptionId>,
        priority: i32,
    ) -> SubscriptionId {
        let id = id.unwrap_or_else(SubscriptionId::generate);
        let handler_name = handler.name().to_string();
        let replaced = self.inner.write_state().subscribers.insert(
            event_type,
            Subscription {
                id: id.clone(),
                handler,
                priority,
            },
        );

        debug!(
            event_type = %event_type,
            subscription_id = %id,
            handler_name = %handler_name,
            priority,
            replaced,
            "Subscriber registered"
        );
        id
    }

    /// Remove one subscription.
    ///
    /// Returns `true` if it existed.
    pub fn unsubscribe(&self, event_type: EventType, id: &SubscriptionId) -> bool {
        let removed = self.inner.write_state().subscribers.remove(event_type, id);
        if removed {
            debug!(event_type = %event_type, subscription_id = %id, "Subscriber removed");
        }
        removed
    }

    /// Remove a subscription id from every event type.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_all(&self, id: &SubscriptionId) -> usize {
        let removed = self.inner.write_state().subscribers.remove_all(id);
        if removed > 0 {
            debug!(subscription_id = %id, removed, "Subscriber removed from all event types");
        }
        removed
    }

    /// Number of subscribers for an event type.
    #[must_use]
    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.inner.read_state().subscribers.count(event_type)
    }

    /// Event types that have at least one subscriber.
    #[must_use]
    pub fn subscribed_event_types(&self) -> Vec<EventType> {
        self.inner.read_state().subscribers.event_types()
    }

    /// Deliver an event to its subscribers now, in priority order.
    ///
    /// Each handler's failure is recorded in its own [`DeliveryResult`] and
    /// does not stop delivery to the others. Publishing an event type with no
    /// subscribers returns an empty list.
    pub async fn publish(&self, event: Event) -> Vec<DeliveryResult> {
        self.inner.publish(event).await
    }

    /// Queue an event for delivery by the async consumer.
    pub fn publish_async(&self, event: Event) {
        trace!(
            event_id = %event.id,
            event_type = %event.event_type,
            priority = %event.priority,
            "Queueing event"
        );
        self.inner.lock_queue().push(event);
        self.inner.notify.notify_one();
    }

    /// Number of events waiting in the async queue.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock_queue().len()
    }

    /// Deliver every queued event on the current task.
    ///
    /// Returns the number of events delivered.
    pub async fn drain_pending(&self) -> usize {
        let mut delivered: usize = 0;
        loop {
            let next = self.inner.lock_queue().pop();
            let Some(event) = next else {
                break;
            };
            self.inner.publish(event).await;
            delivered = delivered.saturating_add(1);
        }
        delivered
    }

    /// Start the background consumer for the async queue.
    ///
    /// # Errors
    ///
    /// Returns an error if a consumer is already running or no tokio runtime
    /// is available.
    pub fn start_consumer(&self) -> EventResult<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| EventError::NoRuntime(e.to_string()))?;

        let mut consumer = self.inner.lock_consumer();
        if consumer.as_ref().is_some_and(|c| !c.handle.is_finished()) {
            return Err(EventError::ConsumerAlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(consume(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.notify),
            cancel.clone(),
            self.inner.config.poll_interval,
        ));
        *consumer = Some(ConsumerHandle { cancel, handle });

        info!("Async event consumer started");
        Ok(())
    }

    /// Stop the background consumer.
    ///
    /// Events still queued stay queued; call [`drain_pending`](Self::drain_pending)
    /// to deliver them. Stopping a bus with no consumer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer does not stop within the configured
    /// join timeout. The task is aborted in that case.
    pub async fn stop_consumer(&self) -> EventResult<()> {
        let taken = self.inner.lock_consumer().take();
        let Some(ConsumerHandle { cancel, mut handle }) = taken else {
            return Ok(());
        };

        cancel.cancel();
        let timeout = self.inner.config.join_timeout;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Async event consumer stopped");
                Ok(())
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Async event consumer ended abnormally");
                Ok(())
            },
            Err(_) => {
                handle.abort();
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "Async event consumer did not stop in time, aborted");
                Err(EventError::ConsumerJoinTimeout { timeout_ms })
            },
        }
    }

    /// Check whether the background consumer is running.
    #[must_use]
    pub fn is_consumer_running(&self) -> bool {
        self.inner
            .lock_consumer()
            .as_ref()
            .is_some_and(|c| !c.handle.is_finished())
    }

    /// Recently delivered events matching the filter, oldest first.
    #[must_use]
    pub fn history(&self, filter: &HistoryFilter) -> Vec<Event> {
        self.inner.read_state().history.query(filter)
    }

    /// Number of events in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.inner.read_state().history.len()
    }

    /// Remove all subscribers, history and queued events.
    pub fn clear(&self) {
        {
            let mut state = self.inner.write_state();
            state.subscribers.clear();
            state.history.clear();
        }
        self.inner.lock_queue().clear();
        debug!("Event bus cleared");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Async consumer loop. Holds only a weak reference to the bus.
async fn consume(
    inner: Weak<BusInner>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let Some(bus) = inner.upgrade() else {
            debug!("Event bus dropped, async consumer exiting");
            break;
        };
        let next = bus.lock_queue().pop();
        if let Some(event) = next {
            bus.publish(event).await;
            continue;
        }
        drop(bus);

        tokio::select! {
            () = cancel.cancelled() => break,
            () = notify.notified() => {},
            () = tokio::time::sleep(poll_interval) => {},
        }
    }
}
