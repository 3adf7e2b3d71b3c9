//! Maestro Core - Shared vocabulary for the Maestro agent orchestration runtime.
//!
//! This crate provides:
//! - The `Data` payload map passed between producers, agents and workflow steps
//! - `Priority` levels shared by events and requests
//! - The closed enumerations used for routing: `EventType`, `RequestType`
//!   and `AgentCapability`
//! - Identifier newtypes for events, requests and workflow instances
//!
//! It has no dependency on any other maestro crate; every other crate in the
//! workspace builds on it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod capability;
pub mod error;
pub mod kinds;
pub mod panic;
pub mod types;

pub use capability::AgentCapability;
pub use error::{CoreError, CoreResult};
pub use kinds::{EventType, RequestType};
pub use panic::panic_message;
pub use types::{
    Data, DisplayNames, EventId, InstanceId, Priority, RequestId, Timestamp, display_names, from_data,
    to_data,
};
