//! Maestro Runtime - The assembled orchestration runtime.
//!
//! This crate wires the components together and exposes the API that event
//! producers use:
//! - [`Runtime`], the process-wide context owning the event bus, agent
//!   registry, coordinator and workflow engine
//! - Conversion from [`maestro_config::Config`] to component settings
//!
//! # Construction order
//!
//! Configuration is loaded first and logging installed from it. The event
//! bus and agent registry are created next, then the coordinator over both,
//! then the workflow engine. [`Runtime::shutdown`] stops them in reverse.
//!
//! # Example
//!
//! ```rust,no_run
//! use maestro_runtime::prelude::*;
//!
//! # async fn example() -> RuntimeResult<()> {
//! let runtime = Runtime::bootstrap(None)?;
//! runtime.start()?;
//!
//! let response = runtime
//!     .process_request(RequestType::QueryData, Data::new(), None, false)
//!     .await;
//! assert!(response.is_some());
//!
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod prelude;

mod error;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{DEFAULT_EVENT_SOURCE, REGISTRY_EVENT_SOURCE, Runtime};

