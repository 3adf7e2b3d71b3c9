//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_coordinator::prelude::*;` to import all essential types.

// Coordinator
pub use crate::{Coordinator, CoordinatorConfig, CoordinatorStatistics, RoutingTable};

// Requests
pub use crate::{Request, Response};

// Hooks
pub use crate::{PostProcessHook, PreProcessHook};

// Errors
pub use crate::{CoordinatorError, CoordinatorResult};
