//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Routing vocabulary
pub use crate::{AgentCapability, EventType, RequestType};

// Common types
pub use crate::{Data, DisplayNames, EventId, InstanceId, Priority, RequestId, Timestamp, display_names};
