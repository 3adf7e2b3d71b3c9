//! Maestro Agents - Agent contract and capability registry.
//!
//! This crate provides:
//! - The [`Agent`] trait implemented by worker units
//! - [`AgentInfo`] bookkeeping (status, counters, mean latency)
//! - The [`AgentRegistry`], which indexes agents by capability in descending
//!   priority order
//!
//! The registry has no dependency on the event bus. Routing is purely
//! capability based: the registry never inspects task types.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod agent;
mod error;
mod info;
mod registry;

pub use agent::{Agent, AgentHandle};
pub use error::{AgentError, RegistryError, RegistryResult};
pub use info::{AgentInfo, AgentStatus, RegistryStatistics};
pub use registry::AgentRegistry;
