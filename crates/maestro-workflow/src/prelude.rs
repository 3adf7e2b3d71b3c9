//! Prelude module - commonly used types for convenient import.
//!
//! Use `use maestro_workflow::prelude::*;` to import all essential types.

// Engine
pub use crate::{EngineConfig, RunningWorkflow, WorkflowEngine, WorkflowSummary};

// Definitions
pub use crate::{Condition, Step, StepHandler, StepOutput, Workflow, WorkflowDefinition};

// State
pub use crate::{HistoryEntry, StepStatus, WorkflowControl, WorkflowStatus};

// Errors
pub use crate::{StepError, WorkflowError, WorkflowResult};
