//! Maestro Coordinator - Capability-based request routing.
//!
//! This crate provides:
//! - [`Request`] and [`Response`], the unit of work and its result
//! - The [`RoutingTable`] mapping request types to capabilities and event
//!   types to request types
//! - Pre/post-process hooks for cross-cutting behavior
//! - The [`Coordinator`], which resolves an agent through the registry,
//!   dispatches to it and records usage
//!
//! # Dispatch
//!
//! For a request type the coordinator walks the mapped capabilities in
//! order and takes the first ACTIVE agent found for any of them. The agent
//! is marked BUSY for the duration of the call and ACTIVE afterwards. Every
//! failure (no mapping, no agent, agent error, agent panic) is returned as a
//! failed [`Response`].
//!
//! Once started, the coordinator subscribes itself to the event bus for the
//! routed event types and runs a worker that drains asynchronously submitted
//! requests.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod coordinator;
mod error;
mod hooks;
mod request;
mod routing;

pub use coordinator::{
    COORDINATOR_SUBSCRIPTION_ID, Coordinator, CoordinatorConfig, CoordinatorStatistics,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use hooks::{PostProcessHook, PreProcessHook};
pub use request::{Request, Response};
pub use routing::RoutingTable;
