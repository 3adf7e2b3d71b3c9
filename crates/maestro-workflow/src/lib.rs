//! Maestro Workflow - Multi-step procedures over a shared context.
//!
//! This crate provides:
//! - [`Step`]s running local handlers, agent dispatches or input collection
//! - [`Condition`]s that branch on the workflow context
//! - The [`Workflow`] execution loop with retries and a per-run history
//! - [`WorkflowControl`] for cooperative pause, resume and cancel
//! - The [`WorkflowEngine`], which instantiates registered workflows and
//!   runs each on its own task
//!
//! # Execution
//!
//! A cursor walks the sequence of steps and conditions. A failed step is
//! retried until `max_retries` is exhausted, after which the workflow fails
//! and stops. A step that needs user input is marked waiting and skipped;
//! the run then ends in [`WorkflowStatus::WaitingUser`] and continues from
//! where it left off once input arrives.
//!
//! # Example
//!
//! ```rust,no_run
//! use maestro_workflow::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> WorkflowResult<()> {
//! let engine = WorkflowEngine::new();
//! engine.register_workflow(|| {
//!     Workflow::new("greet")
//!         .with_name("en", "Greeting")
//!         .step(Step::from_fn("hello", |_| Ok(Some(json!("hello")))))
//! });
//!
//! let instance = engine.start_workflow("greet", Default::default())?;
//! let status = engine.wait_for(instance).await?;
//! assert_eq!(status, WorkflowStatus::Completed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod condition;
mod control;
mod engine;
mod error;
mod step;
mod workflow;

pub use condition::{Checker, Condition, Evaluation};
pub use control::WorkflowControl;
pub use engine::{
    DEFAULT_ENGINE_HISTORY, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_PARKED, EngineConfig,
    RunningWorkflow, WORKFLOW_EVENT_SOURCE, WorkflowEngine, WorkflowFactory, WorkflowSummary,
};
pub use error::{StepError, WorkflowError, WorkflowResult};
pub use step::{FnStep, Step, StepAction, StepHandler, StepOutput, StepResult, StepStatus};
pub use workflow::{
    DEFAULT_MAX_TRANSITIONS, HistoryEntry, HistoryKind, Workflow, WorkflowDefinition,
    WorkflowStatus,
};
