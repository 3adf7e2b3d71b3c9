//! Workflow steps.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use maestro_agents::{AgentHandle, AgentRegistry, AgentStatus};
use maestro_core::{AgentCapability, Data, DisplayNames, panic_message};

use crate::error::StepError;

/// Output of a step handler: a map merges into the workflow context, any
/// other value is stored under `"<step_id>_result"`.
pub type StepOutput = Result<Option<Value>, StepError>;

/// State of a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet attempted, or reset for a retry.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Last attempt failed.
    Failed,
    /// Bypassed.
    Skipped,
    /// Needs user input that has not been provided.
    Waiting,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Waiting => "waiting",
        };
        f.write_str(s)
    }
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Value produced by the step.
    pub output: Option<Value>,
    /// Failure description.
    pub error: Option<String>,
}

impl StepResult {
    /// A successful attempt.
    #[must_use]
    pub fn ok(output: Option<Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Local work performed by a step.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run the step against a snapshot of the workflow context.
    async fn run(&self, context: &Data) -> StepOutput;
}

/// A step handler built from a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&Data) -> StepOutput + Send + Sync,
{
    handler: F,
}

impl<F> FnStep<F>
where
    F: Fn(&Data) -> StepOutput + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> StepHandler for FnStep<F>
where
    F: Fn(&Data) -> StepOutput + Send + Sync,
{
    async fn run(&self, context: &Data) -> StepOutput {
        (self.handler)(context)
    }
}

/// What a step does when it runs.
#[derive(Clone)]
pub enum StepAction {
    /// Run a local handler.
    Handler(Arc<dyn StepHandler>),
    /// Dispatch to the highest-priority active agent with a capability.
    Agent {
        /// Capability used to resolve the agent.
        capability: AgentCapability,
        /// Task type passed to `Agent::handle`.
        task_type: String,
    },
    /// Only collect user input; the input is merged into the context.
    Input,
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler"),
            Self::Agent {
                capability,
                task_type,
            } => f
                .debug_struct("Agent")
                .field("capability", capability)
                .field("task_type", task_type)
                .finish(),
            Self::Input => f.write_str("Input"),
        }
    }
}

/// One unit of work inside a workflow.
#[derive(Debug, Clone)]
pub struct Step {
    /// Step identifier, unique within the workflow.
    pub id: String,
    /// Display names keyed by locale.
    pub names: DisplayNames,
    /// What the step does.
    pub action: StepAction,
    /// Current state.
    pub status: StepStatus,
    /// Retries performed so far.
    pub retry_count: u32,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Whether the step needs user input before it can run.
    pub requires_user_input: bool,
    /// Input supplied through `provide_user_input`.
    pub user_input: Option<Data>,
}

impl Step {
    fn with_action(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            names: DisplayNames::new(),
            action,
            status: StepStatus::Pending,
            retry_count: 0,
            max_retries: 0,
            requires_user_input: false,
            user_input: None,
        }
    }

    /// A step running a local handler.
    #[must_use]
    pub fn new(id: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        Self::with_action(id, StepAction::Handler(handler))
    }

    /// A step running a synchronous closure.
    #[must_use]
    pub fn from_fn<F>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Data) -> StepOutput + Send + Sync + 'static,
    {
        Self::new(id, Arc::new(FnStep::new(handler)))
    }

    /// A step dispatching to an agent by capability.
    #[must_use]
    pub fn agent(
        id: impl Into<String>,
        capability: AgentCapability,
        task_type: impl Into<String>,
    ) -> Self {
        Self::with_action(
            id,
            StepAction::Agent {
                capability,
                task_type: task_type.into(),
            },
        )
    }

    /// A step that only collects user input.
    #[must_use]
    pub fn user_input(id: impl Into<String>) -> Self {
        let mut step = Self::with_action(id, StepAction::Input);
        step.requires_user_input = true;
        step
    }

    /// Allow this many retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Require user input before the step can run.
    #[must_use]
    pub fn requiring_input(mut self) -> Self {
        self.requires_user_input = true;
        self
    }

    /// Add a display name.
    #[must_use]
    pub fn with_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(locale.into(), name.into());
        self
    }

    /// Whether the step can run now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.requires_user_input || self.user_input.is_some()
    }

    /// Whether another attempt is allowed after a failure.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Key under which scalar output is stored in the context.
    #[must_use]
    pub fn result_key(&self) -> String {
        format!("{}_result", self.id)
    }

    /// Run one attempt. Errors and panics become a failed [`StepResult`].
    pub(crate) async fn attempt(
        &self,
        context: &Data,
        registry: Option<&Arc<AgentRegistry>>,
    ) -> StepResult {
        let outcome = match &self.action {
            StepAction::Handler(handler) => AssertUnwindSafe(handler.run(context))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(StepError::new(format!(
                        "step panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                }),
            StepAction::Agent {
                capability,
                task_type,
            } => dispatch_to_agent(registry, *capability, task_type, context).await,
            StepAction::Input => Ok(None),
        };

        match outcome {
            Ok(output) => StepResult::ok(output),
            Err(e) => StepResult::failed(e.message),
        }
    }
}

async fn dispatch_to_agent(
    registry: Option<&Arc<AgentRegistry>>,
    capability: AgentCapability,
    task_type: &str,
    context: &Data,
) -> StepOutput {
    let registry = registry.ok_or_else(|| StepError::new("no agent registry attached"))?;
    let AgentHandle { id, agent } = registry
        .get_agent_by_capability(capability, Some(AgentStatus::Active))
        .ok_or_else(|| StepError::new(format!("no agent available for capability {capability}")))?;

    mark_status(registry, &id, AgentStatus::Busy);
    let started = Instant::now();
    let outcome = AssertUnwindSafe(agent.handle(task_type, context.clone()))
        .catch_unwind()
        .await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    mark_status(registry, &id, AgentStatus::Active);

    let result = match outcome {
        Ok(Ok(data)) => Ok(Some(Value::Object(data))),
        Ok(Err(e)) => Err(StepError::new(e.to_string())),
        Err(panic) => Err(StepError::new(format!(
            "agent panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };
    if let Err(e) = &result {
        warn!(agent_id = %id, task_type, error = %e, "Agent step failed");
    } else {
        debug!(agent_id = %id, task_type, elapsed_ms, "Agent step completed");
    }
    if let Err(e) = registry.record_usage(&id, elapsed_ms, result.is_ok()) {
        warn!(agent_id = %id, error = %e, "Usage not recorded");
    }
    result
}

fn mark_status(registry: &AgentRegistry, agent_id: &str, status: AgentStatus) {
    if let Err(e) = registry.update_agent_status(agent_id, status) {
        warn!(agent_id, status = %status, error = %e, "Agent status not updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_agents::{Agent, AgentError};
    use maestro_test::MockAgent;
    use std::collections::BTreeSet;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_step() {
        let step = Step::from_fn("double", |ctx| {
            let n = ctx.get("n").and_then(Value::as_i64).unwrap_or_default();
            Ok(Some(json!(n.saturating_mul(2))))
        });
        let mut ctx = Data::new();
        ctx.insert("n".to_string(), json!(21));

        let result = step.attempt(&ctx, None).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!(42)));
        assert_eq!(step.result_key(), "double_result");
    }

    #[tokio::test]
    async fn test_handler_error_and_panic() {
        let failing = Step::from_fn("f", |_| Err("bad input".into()));
        let result = failing.attempt(&Data::new(), None).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("bad input"));

        let panicking = Step::from_fn("p", |_| panic!("oops"));
        let result = panicking.attempt(&Data::new(), None).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("oops"));
    }

    #[tokio::test]
    async fn test_agent_step() {
        let registry = Arc::new(AgentRegistry::new());
        let agent = MockAgent::new([AgentCapability::DataValidation]).echo();
        registry.register_declared("validator", Arc::new(agent.clone()), 0);

        let step = Step::agent("validate", AgentCapability::DataValidation, "validate_data");
        let mut ctx = Data::new();
        ctx.insert("email".to_string(), json!("a@b.c"));

        let result = step.attempt(&ctx, Some(&registry)).await;
        assert!(result.success);
        assert_eq!(result.output, Some(Value::Object(ctx.clone())));
        assert_eq!(agent.calls()[0].task_type, "validate_data");
        assert_eq!(registry.get_agent_info("validator").unwrap().usage_count, 1);

        let missing = Step::agent("notify", AgentCapability::Notification, "send");
        let result = missing.attempt(&ctx, Some(&registry)).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("no agent available"));

        let result = step.attempt(&ctx, None).await;
        assert!(!result.success);
    }

    struct SelfRemovingAgent {
        registry: Arc<AgentRegistry>,
    }

    #[async_trait]
    impl Agent for SelfRemovingAgent {
        fn capabilities(&self) -> BTreeSet<AgentCapability> {
            BTreeSet::from([AgentCapability::Notification])
        }

        async fn handle(&self, _task_type: &str, data: Data) -> Result<Data, AgentError> {
            self.registry.unregister("notifier");
            Ok(data)
        }
    }

    #[tokio::test]
    async fn test_agent_step_survives_agent_leaving_registry() {
        maestro_test::init_test_logging();
        let registry = Arc::new(AgentRegistry::new());
        let agent = SelfRemovingAgent {
            registry: Arc::clone(&registry),
        };
        registry.register_declared("notifier", Arc::new(agent), 0);

        let step = Step::agent("notify", AgentCapability::Notification, "send");
        let mut ctx = Data::new();
        ctx.insert("to".to_string(), json!("ops"));

        // Status reset and usage recording both miss the agent now.
        let result = step.attempt(&ctx, Some(&registry)).await;
        assert!(result.success);
        assert_eq!(result.output, Some(Value::Object(ctx)));
        assert!(registry.get_agent_info("notifier").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_step_builders() {
        let step = Step::user_input("approve").with_name("en", "Approve");
        assert!(step.requires_user_input);
        assert!(!step.is_ready());
        assert_eq!(step.names.get("en").map(String::as_str), Some("Approve"));

        let step = Step::from_fn("x", |_| Ok(None)).with_max_retries(2);
        assert!(step.can_retry());
        assert!(step.is_ready());
        assert_eq!(step.status, StepStatus::Pending);
    }
}
