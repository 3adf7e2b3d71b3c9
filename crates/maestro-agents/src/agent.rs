//! The agent contract implemented by worker units.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use maestro_core::{AgentCapability, Data, DisplayNames};

use crate::error::AgentError;
use crate::info::AgentStatus;

/// A worker unit that performs tasks for one or more capabilities.
///
/// Agents are routed to purely by the capabilities they declare. Every task
/// arrives through [`handle`](Agent::handle) with the task type name; an
/// agent serving several capabilities branches on that name itself.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Capabilities this agent provides.
    fn capabilities(&self) -> BTreeSet<AgentCapability>;

    /// Advisory self-check for direct callers.
    ///
    /// Routing never consults this; the default accepts everything.
    fn can_handle(&self, task_type: &str, data: &Data) -> bool {
        let _ = (task_type, data);
        true
    }

    /// Perform a task.
    ///
    /// Expected business failures should be reported inside the returned
    /// data. An `Err` (or a panic) is treated as an unexpected failure and
    /// recorded against the agent.
    async fn handle(&self, task_type: &str, data: Data) -> Result<Data, AgentError>;

    /// Display names keyed by locale.
    fn display_names(&self) -> DisplayNames {
        DisplayNames::new()
    }

    /// Short description of the agent.
    fn description(&self) -> String {
        String::new()
    }

    /// Notified when the registry changes this agent's status.
    fn set_status(&self, status: AgentStatus) {
        let _ = status;
    }
}

/// A registered agent together with its registry id.
#[derive(Clone)]
pub struct AgentHandle {
    /// Registry id.
    pub id: String,
    /// The agent.
    pub agent: Arc<dyn Agent>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("capabilities", &self.agent.capabilities())
            .finish()
    }
}
