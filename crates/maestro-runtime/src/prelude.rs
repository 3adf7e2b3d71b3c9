//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_runtime::prelude::*;` to import all essential types.

// Runtime
pub use crate::{Runtime, RuntimeError, RuntimeResult};

// Shared vocabulary
pub use maestro_core::{AgentCapability, Data, EventType, InstanceId, Priority, RequestType};

// Components
pub use maestro_agents::{Agent, AgentError, AgentStatus};
pub use maestro_coordinator::Response;
pub use maestro_events::{DeliveryResult, Event, EventHandler};
pub use maestro_workflow::{Condition, Step, Workflow, WorkflowStatus};
