//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_events::prelude::*;` to import all essential types.

// Event bus
pub use crate::{BusConfig, EventBus, HistoryFilter};

// Events
pub use crate::Event;

// Subscriber system
pub use crate::{
    DeliveryResult, EventHandler, FnHandler, HandlerError, HandlerResult, SubscriptionId,
};

// Errors
pub use crate::{EventError, EventResult};
