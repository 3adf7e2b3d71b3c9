//! Workflow definition and the execution loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use maestro_agents::AgentRegistry;
use maestro_core::{Data, DisplayNames, InstanceId};

use crate::condition::Condition;
use crate::control::WorkflowControl;
use crate::error::{WorkflowError, WorkflowResult};
use crate::step::{Step, StepResult, StepStatus};

/// Default cap on loop iterations of a single run.
pub const DEFAULT_MAX_TRANSITIONS: usize = 10_000;

/// State of a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not started.
    #[default]
    NotStarted,
    /// Executing.
    Running,
    /// Paused between steps.
    Paused,
    /// Ran to the end with steps still waiting for user input.
    WaitingUser,
    /// Finished successfully.
    Completed,
    /// A step exhausted its retries.
    Failed,
    /// Cancelled between steps.
    Cancelled,
}

impl WorkflowStatus {
    /// Whether the run is over for good.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingUser => "waiting_user",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Kind of item recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// A step attempt.
    Step,
    /// A condition evaluation.
    Condition,
}

/// One recorded step attempt or condition evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Step or condition id.
    pub item_id: String,
    /// What was recorded.
    pub kind: HistoryKind,
    /// Step status after the attempt, or `"true"`/`"false"` for conditions.
    pub outcome: String,
    /// For steps, whether the attempt succeeded.
    pub success: Option<bool>,
    /// For steps, the retry count at the time of the attempt.
    pub attempt: Option<u32>,
    /// Failure description.
    pub error: Option<String>,
}

/// Static description of a registered workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow id.
    pub id: String,
    /// Display names keyed by locale.
    pub names: DisplayNames,
    /// Short description.
    pub description: String,
}

#[derive(Debug, Clone)]
enum Item {
    Step(Step),
    Condition(Condition),
}

impl Item {
    fn id(&self) -> &str {
        match self {
            Self::Step(s) => &s.id,
            Self::Condition(c) => &c.id,
        }
    }
}

/// An ordered sequence of steps and conditions sharing a mutable context.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    instance_id: InstanceId,
    names: DisplayNames,
    description: String,
    items: Vec<Item>,
    status: WorkflowStatus,
    context: Data,
    history: Vec<HistoryEntry>,
    registry: Option<Arc<AgentRegistry>>,
    max_transitions: usize,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl Workflow {
    /// Create an empty workflow.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instance_id: InstanceId::new(),
            names: DisplayNames::new(),
            description: String::new(),
            items: Vec::new(),
            status: WorkflowStatus::NotStarted,
            context: Data::new(),
            history: Vec::new(),
            registry: None,
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Add a display name.
    #[must_use]
    pub fn with_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(locale.into(), name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a step to the sequence.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.items.push(Item::Step(step));
        self
    }

    /// Append a condition to the sequence.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.items.push(Item::Condition(condition));
        self
    }

    /// Set the initial context.
    #[must_use]
    pub fn with_context(mut self, context: Data) -> Self {
        self.context = context;
        self
    }

    /// Attach the registry used by agent dispatch steps.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cap the number of loop iterations in one run.
    #[must_use]
    pub fn with_max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Workflow id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of this run.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Static description.
    #[must_use]
    pub fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.id.clone(),
            names: self.names.clone(),
            description: self.description.clone(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Shared context.
    #[must_use]
    pub fn context(&self) -> &Data {
        &self.context
    }

    /// Merge values into the context.
    pub fn merge_context(&mut self, data: Data) {
        self.context.extend(data);
    }

    /// Recorded step attempts and condition evaluations.
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// History entries for one item.
    #[must_use]
    pub fn history_for(&self, item_id: &str) -> Vec<&HistoryEntry> {
        self.history.iter().filter(|e| e.item_id == item_id).collect()
    }

    /// Failure description of the last run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// When the first run started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the last run ended.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Look up a step.
    #[must_use]
    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.items.iter().find_map(|item| match item {
            Item::Step(s) if s.id == step_id => Some(s),
            _ => None,
        })
    }

    fn get_step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Step(s) if s.id == step_id => Some(s),
            _ => None,
        })
    }

    /// Ids of every step, in sequence order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Step(s) => Some(s.id.clone()),
                Item::Condition(_) => None,
            })
            .collect()
    }

    /// Status of every step, in sequence order.
    #[must_use]
    pub fn step_statuses(&self) -> Vec<(String, StepStatus)> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Step(s) => Some((s.id.clone(), s.status)),
                Item::Condition(_) => None,
            })
            .collect()
    }

    /// Check that ids are unique and every branch target exists.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidWorkflow`] describing the first problem.
    pub fn validate(&self) -> WorkflowResult<()> {
        let invalid = |reason: String| WorkflowError::InvalidWorkflow {
            workflow_id: self.id.clone(),
            reason,
        };

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.id()) {
                return Err(invalid(format!("duplicate item id {}", item.id())));
            }
        }
        for item in &self.items {
            if let Item::Condition(c) = item {
                for target in std::iter::once(c.then_step.as_str()).chain(c.else_step.as_deref()) {
                    if !seen.contains(target) {
                        return Err(invalid(format!(
                            "condition {} targets unknown item {target}",
                            c.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Supply user input for a step.
    ///
    /// The input is merged into the context when the step next runs.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownStep`] if the step does not exist.
    pub fn provide_user_input(&mut self, step_id: &str, input: Data) -> WorkflowResult<()> {
        let workflow_id = self.id.clone();
        let step = self
            .get_step_mut(step_id)
            .ok_or_else(|| WorkflowError::UnknownStep {
                workflow_id,
                step_id: step_id.to_string(),
            })?;
        step.user_input = Some(input);
        if step.status == StepStatus::Waiting {
            step.status = StepStatus::Pending;
        }
        debug!(step_id, "User input provided");
        Ok(())
    }

    /// Run the workflow with a private control handle.
    pub async fn run(&mut self) -> WorkflowStatus {
        self.execute(&WorkflowControl::default()).await
    }

    /// Run the workflow until it finishes, fails, or is cancelled.
    ///
    /// Steps already completed in an earlier run are skipped the first time
    /// the cursor reaches them, so a workflow left in
    /// [`WorkflowStatus::WaitingUser`] can be executed again once input has
    /// been provided. Within a run, a condition jumping back re-runs every
    /// step it jumps over; jumping forward marks the bypassed steps
    /// [`StepStatus::Skipped`].
    pub async fn execute(&mut self, control: &WorkflowControl) -> WorkflowStatus {
        if let Err(e) = self.validate() {
            warn!(workflow_id = %self.id, error = %e, "Workflow definition invalid");
            self.error = Some(e.to_string());
            return self.finish(control, WorkflowStatus::Failed);
        }

        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.error = None;
        self.set_status(control, WorkflowStatus::Running);
        info!(workflow_id = %self.id, instance_id = %self.instance_id, "Workflow started");

        let mut carried: HashSet<String> = self
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Step(s) if s.status == StepStatus::Completed => Some(s.id.clone()),
                _ => None,
            })
            .collect();
        let mut cursor: usize = 0;
        let mut transitions: usize = 0;

        while cursor < self.items.len() {
            self.apply_inputs(control);

            if control.is_paused() {
                self.set_status(control, WorkflowStatus::Paused);
                debug!(workflow_id = %self.id, "Workflow paused");
                if !control.wait_resumed().await {
                    return self.cancelled(control);
                }
                self.set_status(control, WorkflowStatus::Running);
                debug!(workflow_id = %self.id, "Workflow resumed");
                self.apply_inputs(control);
            }
            if control.is_cancelled() {
                return self.cancelled(control);
            }

            transitions = transitions.saturating_add(1);
            if transitions > self.max_transitions {
                self.error = Some(format!(
                    "exceeded {} transitions without finishing",
                    self.max_transitions
                ));
                warn!(workflow_id = %self.id, max_transitions = self.max_transitions, "Workflow looped too long");
                return self.finish(control, WorkflowStatus::Failed);
            }

            let next = match &self.items[cursor] {
                Item::Condition(condition) => {
                    let condition = condition.clone();
                    self.run_condition(&condition, cursor, &mut carried)
                },
                Item::Step(_) => match self.run_step(cursor, &mut carried).await {
                    StepFlow::Advance => cursor.saturating_add(1),
                    StepFlow::Retry => cursor,
                    StepFlow::Fail => return self.finish(control, WorkflowStatus::Failed),
                },
            };
            cursor = next;
        }

        let waiting = self.items.iter().any(|item| {
            matches!(item, Item::Step(s) if s.status == StepStatus::Waiting)
        });
        let status = if waiting {
            WorkflowStatus::WaitingUser
        } else {
            WorkflowStatus::Completed
        };
        self.finish(control, status)
    }

    fn apply_inputs(&mut self, control: &WorkflowControl) {
        for (step_id, input) in control.take_inputs() {
            if let Err(e) = self.provide_user_input(&step_id, input) {
                warn!(workflow_id = %self.id, error = %e, "Discarding user input");
            }
        }
    }

    fn index_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == item_id)
    }

    fn run_condition(
        &mut self,
        condition: &Condition,
        cursor: usize,
        carried: &mut HashSet<String>,
    ) -> usize {
        let evaluation = condition.evaluate(&self.context);
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            item_id: condition.id.clone(),
            kind: HistoryKind::Condition,
            outcome: evaluation.value.to_string(),
            success: None,
            attempt: None,
            error: evaluation.error,
        });
        debug!(condition_id = %condition.id, value = evaluation.value, "Condition evaluated");

        let next = cursor.saturating_add(1);
        let Some(target) = condition
            .target(evaluation.value)
            .and_then(|target| self.index_of(target))
        else {
            return next;
        };

        if target <= cursor {
            // Steps inside a loop body run again on every pass.
            for item in &self.items[target..cursor] {
                if let Item::Step(s) = item {
                    carried.remove(&s.id);
                }
            }
        } else if target > next {
            for item in &mut self.items[next..target] {
                let Item::Step(s) = item else {
                    continue;
                };
                if s.status == StepStatus::Pending {
                    s.status = StepStatus::Skipped;
                    debug!(
                        step_id = %s.id,
                        condition_id = %condition.id,
                        "Step skipped by branch"
                    );
                }
            }
        }
        target
    }

    async fn run_step(&mut self, cursor: usize, carried: &mut HashSet<String>) -> StepFlow {
        let Item::Step(step) = &mut self.items[cursor] else {
            return StepFlow::Advance;
        };

        match step.status {
            StepStatus::Completed if carried.remove(&step.id) => return StepFlow::Advance,
            StepStatus::Completed | StepStatus::Skipped => {
                step.status = StepStatus::Pending;
                step.retry_count = 0;
            },
            _ => {},
        }

        if !step.is_ready() {
            step.status = StepStatus::Waiting;
            let step_id = step.id.clone();
            let attempt = step.retry_count;
            debug!(workflow_id = %self.id, step_id = %step_id, "Step waiting for user input");
            self.history.push(HistoryEntry {
                timestamp: Utc::now(),
                item_id: step_id,
                kind: HistoryKind::Step,
                outcome: StepStatus::Waiting.to_string(),
                success: None,
                attempt: Some(attempt),
                error: None,
            });
            return StepFlow::Advance;
        }

        step.status = StepStatus::Running;
        if let Some(input) = step.user_input.clone() {
            self.context.extend(input);
        }
        let snapshot = step.clone();
        let result = snapshot.attempt(&self.context, self.registry.as_ref()).await;

        let Item::Step(step) = &mut self.items[cursor] else {
            return StepFlow::Advance;
        };
        let StepResult {
            success,
            output,
            error,
        } = result;

        step.status = if success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let step_id = step.id.clone();
        let attempt = step.retry_count;
        let result_key = step.result_key();

        let flow = if success {
            StepFlow::Advance
        } else if step.can_retry() {
            step.retry_count = step.retry_count.saturating_add(1);
            step.status = StepStatus::Pending;
            StepFlow::Retry
        } else {
            StepFlow::Fail
        };

        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            item_id: step_id.clone(),
            kind: HistoryKind::Step,
            outcome: if success {
                StepStatus::Completed.to_string()
            } else {
                StepStatus::Failed.to_string()
            },
            success: Some(success),
            attempt: Some(attempt),
            error: error.clone(),
        });

        match flow {
            StepFlow::Advance => {
                match output {
                    Some(Value::Object(map)) => self.context.extend(map),
                    Some(Value::Null) | None => {},
                    Some(scalar) => {
                        self.context.insert(result_key, scalar);
                    },
                }
                debug!(workflow_id = %self.id, step_id = %step_id, "Step completed");
            },
            StepFlow::Retry => {
                warn!(
                    workflow_id = %self.id,
                    step_id = %step_id,
                    attempt,
                    error = ?error,
                    "Step failed, retrying"
                );
            },
            StepFlow::Fail => {
                warn!(
                    workflow_id = %self.id,
                    step_id = %step_id,
                    error = ?error,
                    "Step failed, retries exhausted"
                );
                self.error = Some(format!(
                    "step {step_id} failed: {}",
                    error.as_deref().unwrap_or("unknown error")
                ));
            },
        }
        flow
    }

    fn set_status(&mut self, control: &WorkflowControl, status: WorkflowStatus) {
        self.status = status;
        control.set_status(status);
    }

    fn cancelled(&mut self, control: &WorkflowControl) -> WorkflowStatus {
        info!(workflow_id = %self.id, instance_id = %self.instance_id, "Workflow cancelled");
        self.finish(control, WorkflowStatus::Cancelled)
    }

    fn finish(&mut self, control: &WorkflowControl, status: WorkflowStatus) -> WorkflowStatus {
        self.completed_at = Some(Utc::now());
        self.set_status(control, status);
        info!(
            workflow_id = %self.id,
            instance_id = %self.instance_id,
            status = %status,
            "Workflow finished"
        );
        status
    }

    /// Mark an idle workflow cancelled without running it.
    pub(crate) fn cancel_idle(&mut self, control: &WorkflowControl) -> WorkflowStatus {
        self.cancelled(control)
    }

    /// Give this run a fresh instance id.
    pub(crate) fn assign_instance_id(&mut self, instance_id: InstanceId) {
        self.instance_id = instance_id;
    }

    /// Attach a registry if none is set.
    pub(crate) fn ensure_registry(&mut self, registry: &Arc<AgentRegistry>) {
        if self.registry.is_none() {
            self.registry = Some(Arc::clone(registry));
        }
    }
}

/// What the loop does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepFlow {
    Advance,
    Retry,
    Fail,
}
