//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_agents::prelude::*;` to import all essential types.

// Agent contract
pub use crate::{Agent, AgentError, AgentHandle};

// Registry
pub use crate::{AgentInfo, AgentRegistry, AgentStatus, RegistryError, RegistryResult};
