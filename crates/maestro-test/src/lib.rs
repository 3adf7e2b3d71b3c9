//! Maestro Test - Shared test utilities for the Maestro runtime.
//!
//! This crate provides mock implementations and test helpers that can be
//! used across multiple Maestro crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! maestro-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use std::sync::Arc;
//!     use maestro_agents::AgentRegistry;
//!     use maestro_core::AgentCapability;
//!     use maestro_test::{MockAgent, test_data};
//!
//!     #[tokio::test]
//!     async fn test_dispatch() {
//!         let agent = MockAgent::new([AgentCapability::DatabaseWrite])
//!             .with_response(test_data([("saved", true.into())]));
//!
//!         let registry = AgentRegistry::new();
//!         registry.register_declared("db", Arc::new(agent.clone()), 0);
//!
//!         // ... dispatch through a coordinator ...
//!         assert_eq!(agent.call_count(), 1);
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
