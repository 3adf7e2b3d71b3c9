//! Event handler trait and the per-type subscription table.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{trace, warn};
use uuid::Uuid;

use maestro_core::{EventType, panic_message};

use crate::error::HandlerError;
use crate::event::Event;

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<Option<Value>, HandlerError>;

/// Trait for event subscribers.
///
/// Handlers run on the publisher's task, one after another in priority
/// order, so they should return quickly. A handler that fails or panics only
/// affects its own delivery entry.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an event of a subscribed type is published.
    async fn handle(&self, event: &Event) -> HandlerResult;

    /// Optional name for debugging.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// A handler built from a synchronous closure.
pub struct FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync,
{
    /// Create a new closure handler.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.handler)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Identifier of a subscription.
///
/// Callers may choose their own identifier to make re-subscription
/// idempotent; otherwise a random one is generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a random subscription ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A handler registered against one event type.
#[derive(Clone)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Handler to invoke.
    pub handler: Arc<dyn EventHandler>,
    /// Higher priorities run first.
    pub priority: i32,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("handler", &self.handler.name())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Result of delivering an event to one handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// The subscription that handled the event.
    pub handler_id: SubscriptionId,
    /// Whether the handler succeeded.
    pub success: bool,
    /// Value returned by the handler, if any.
    pub result: Option<Value>,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl Subscription {
    /// Invoke the handler, converting errors and panics into a failed
    /// delivery entry.
    pub(crate) async fn deliver(&self, event: &Event) -> DeliveryResult {
        trace!(
            handler_id = %self.id,
            handler_name = %self.handler.name(),
            event_type = %event.event_type,
            "Delivering event"
        );

        let outcome = AssertUnwindSafe(self.handler.handle(event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => DeliveryResult {
                handler_id: self.id.clone(),
                success: true,
                result,
                error: None,
            },
            Ok(Err(e)) => {
                warn!(
                    handler_id = %self.id,
                    handler_name = %self.handler.name(),
                    event_type = %event.event_type,
                    error = %e,
                    "Event handler failed"
                );
                DeliveryResult {
                    handler_id: self.id.clone(),
                    success: false,
                    result: None,
                    error: Some(e.message),
                }
            },
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(
                    handler_id = %self.id,
                    handler_name = %self.handler.name(),
                    event_type = %event.event_type,
                    panic = %message,
                    "Event handler panicked"
                );
                DeliveryResult {
                    handler_id: self.id.clone(),
                    success: false,
                    result: None,
                    error: Some(format!("handler panicked: {message}")),
                }
            },
        }
    }
}

/// Subscription table keyed by event type.
///
/// Each bucket is kept sorted by descending priority; equal priorities keep
/// registration order. The table itself is not synchronized: the bus guards
/// it with its state lock.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    buckets: HashMap<EventType, Vec<Subscription>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    /// Insert a subscription, replacing any existing one with the same id
    /// for the same event type.
    ///
    /// Returns `true` if an existing subscription was replaced.
    pub fn insert(&mut self, event_type: EventType, subscription: Subscription) -> bool {
        let bucket = self.buckets.entry(event_type).or_default();
        let before = bucket.len();
        bucket.retain(|s| s.id != subscription.id);
        let replaced = bucket.len() != before;

        let position = bucket.partition_point(|s| s.priority >= subscription.priority);
        bucket.insert(position, subscription);
        replaced
    }

    /// Remove a subscription for one event type.
    pub fn remove(&mut self, event_type: EventType, id: &SubscriptionId) -> bool {
        let Some(bucket) = self.buckets.get_mut(&event_type) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|s| &s.id != id);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.buckets.remove(&event_type);
        }
        removed
    }

    /// Remove a subscription id from every event type.
    ///
    /// Returns the number of subscriptions removed.
    pub fn remove_all(&mut self, id: &SubscriptionId) -> usize {
        let mut removed: usize = 0;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|s| &s.id != id);
            removed = removed.saturating_add(before.saturating_sub(bucket.len()));
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Snapshot the subscriptions for an event type in delivery order.
    #[must_use]
    pub fn snapshot(&self, event_type: EventType) -> Vec<Subscription> {
        self.buckets.get(&event_type).cloned().unwrap_or_default()
    }

    /// Number of subscriptions for an event type.
    #[must_use]
    pub fn count(&self, event_type: EventType) -> usize {
        self.buckets.get(&event_type).map_or(0, Vec::len)
    }

    /// Event types that currently have at least one subscriber.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.buckets.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Total number of subscriptions across all event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove every subscription.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(name: &str) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler::new(name, |_| Ok(None)))
    }

    fn sub(id: &str, priority: i32) -> Subscription {
        Subscription {
            id: SubscriptionId::from(id),
            handler: noop(id),
            priority,
        }
    }

    fn ids(subs: &[Subscription]) -> Vec<&str> {
        subs.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_insert_orders_by_descending_priority() {
        let mut registry = SubscriberRegistry::new();
        registry.insert(EventType::UserAction, sub("low", 1));
        registry.insert(EventType::UserAction, sub("high", 10));
        registry.insert(EventType::UserAction, sub("mid", 5));

        let snapshot = registry.snapshot(EventType::UserAction);
        assert_eq!(ids(&snapshot), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = SubscriberRegistry::new();
        registry.insert(EventType::UserAction, sub("first", 0));
        registry.insert(EventType::UserAction, sub("second", 0));
        registry.insert(EventType::UserAction, sub("third", 0));

        let snapshot = registry.snapshot(EventType::UserAction);
        assert_eq!(ids(&snapshot), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let mut registry = SubscriberRegistry::new();
        assert!(!registry.insert(EventType::DataSaved, sub("audit", 0)));
        assert!(registry.insert(EventType::DataSaved, sub("audit", 3)));

        assert_eq!(registry.count(EventType::DataSaved), 1);
        assert_eq!(registry.snapshot(EventType::DataSaved)[0].priority, 3);
    }

    #[test]
    fn test_same_id_on_different_types_is_independent() {
        let mut registry = SubscriberRegistry::new();
        registry.insert(EventType::DataSaved, sub("audit", 0));
        registry.insert(EventType::EmailReceived, sub("audit", 0));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.remove_all(&SubscriptionId::from("audit")), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let mut registry = SubscriberRegistry::new();
        assert!(!registry.remove(EventType::DataSaved, &SubscriptionId::from("nope")));
    }

    #[tokio::test]
    async fn test_deliver_catches_errors_and_panics() {
        let event = Event::new(EventType::UserAction, "test");

        let ok = Subscription {
            id: SubscriptionId::from("ok"),
            handler: Arc::new(FnHandler::new("ok", |_| Ok(Some(json!("done"))))),
            priority: 0,
        };
        let failing = Subscription {
            id: SubscriptionId::from("failing"),
            handler: Arc::new(FnHandler::new("failing", |_| Err("boom".into()))),
            priority: 0,
        };
        let panicking = Subscription {
            id: SubscriptionId::from("panicking"),
            handler: Arc::new(FnHandler::new("panicking", |_| panic!("kaboom"))),
            priority: 0,
        };

        let r = ok.deliver(&event).await;
        assert!(r.success);
        assert_eq!(r.result, Some(json!("done")));

        let r = failing.deliver(&event).await;
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));

        let r = panicking.deliver(&event).await;
        assert!(!r.success);
        assert!(r.error.unwrap().contains("kaboom"));
    }
}
