//! Maestro Events - Event bus for the Maestro agent orchestration runtime.
//!
//! This crate provides:
//! - The [`Event`] type carried between producers and subscribers
//! - A publish/subscribe [`EventBus`] with priority-ordered delivery
//! - A priority queue drained by an optional background consumer
//! - A bounded history of delivered events
//!
//! # Architecture
//!
//! Handlers subscribe to one [`EventType`](maestro_core::EventType) with an
//! integer priority. There are two ways to publish:
//!
//! 1. **Synchronous**: `bus.publish(event).await` delivers to every current
//!    subscriber in descending priority order and returns one
//!    [`DeliveryResult`] per handler. A failing or panicking handler is
//!    recorded as a failed entry; the others still run.
//!
//! 2. **Queued**: `bus.publish_async(event)` pushes onto a priority queue.
//!    A consumer started with `start_consumer()` drains it, higher priority
//!    first and FIFO within a priority.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use maestro_core::EventType;
//! use maestro_events::{Event, EventBus, FnHandler};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//!
//! bus.subscribe(
//!     EventType::DataSaved,
//!     Arc::new(FnHandler::new("audit", |event| Ok(Some(event.source.clone().into())))),
//!     None,
//!     0,
//! );
//!
//! let results = bus.publish(Event::new(EventType::DataSaved, "db")).await;
//! assert_eq!(results.len(), 1);
//! assert!(results[0].success);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod error;
mod event;
mod history;
mod queue;
mod subscriber;

pub use bus::{BusConfig, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL, EventBus};
pub use error::{EventError, EventResult, HandlerError};
pub use event::Event;
pub use history::{DEFAULT_HISTORY_CAPACITY, EventHistory, HistoryFilter};
pub use subscriber::{
    DeliveryResult, EventHandler, FnHandler, HandlerResult, SubscriberRegistry, Subscription,
    SubscriptionId,
};
