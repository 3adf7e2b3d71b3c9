//! Registry of workflow factories and supervisor of running instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use maestro_agents::AgentRegistry;
use maestro_core::{Data, EventType, InstanceId};
use maestro_events::{Event, EventBus};

use crate::control::WorkflowControl;
use crate::error::{WorkflowError, WorkflowResult};
use crate::step::StepStatus;
use crate::workflow::{HistoryEntry, Workflow, WorkflowDefinition, WorkflowStatus};

/// Default number of workflows executing at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Default number of finished runs kept in the engine history.
pub const DEFAULT_ENGINE_HISTORY: usize = 1000;

/// Default number of runs left waiting for user input at once.
pub const DEFAULT_MAX_PARKED: usize = 1000;

/// Source recorded on events published by the engine.
pub const WORKFLOW_EVENT_SOURCE: &str = "workflow_engine";

/// Builds a fresh workflow for each run.
pub type WorkflowFactory = Arc<dyn Fn() -> Workflow + Send + Sync>;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Workflows allowed to execute at once. Further runs wait for a slot.
    pub max_concurrent: usize,
    /// Finished runs kept in [`WorkflowEngine::history`].
    pub history_capacity: usize,
    /// Runs kept waiting for user input. Parking one more cancels the
    /// oldest.
    pub max_parked: usize,
    /// How long `shutdown` waits for running workflows to stop.
    pub join_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            history_capacity: DEFAULT_ENGINE_HISTORY,
            max_parked: DEFAULT_MAX_PARKED,
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// Record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Instance id of the run.
    pub instance_id: InstanceId,
    /// Workflow id.
    pub workflow_id: String,
    /// Final status.
    pub status: WorkflowStatus,
    /// When execution started, if it did.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure description.
    pub error: Option<String>,
    /// Final context.
    pub context: Data,
    /// Step attempts and condition evaluations.
    pub history: Vec<HistoryEntry>,
    /// Final status of each step, in definition order.
    pub steps: Vec<(String, StepStatus)>,
}

impl WorkflowSummary {
    fn of(workflow: &Workflow) -> Self {
        Self {
            instance_id: workflow.instance_id(),
            workflow_id: workflow.id().to_string(),
            status: workflow.status(),
            started_at: workflow.started_at(),
            completed_at: workflow.completed_at(),
            error: workflow.error().map(str::to_string),
            context: workflow.context().clone(),
            history: workflow.history().to_vec(),
            steps: workflow.step_statuses(),
        }
    }
}

/// A run that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningWorkflow {
    /// Instance id.
    pub instance_id: InstanceId,
    /// Workflow id.
    pub workflow_id: String,
    /// Current status.
    pub status: WorkflowStatus,
    /// When the instance was started.
    pub started_at: DateTime<Utc>,
}

struct Registration {
    definition: WorkflowDefinition,
    factory: WorkflowFactory,
}

struct InstanceEntry {
    workflow_id: String,
    step_ids: Vec<String>,
    control: Arc<WorkflowControl>,
    /// Parked workflow waiting for user input; `None` while a task owns it.
    workflow: Option<Workflow>,
    started_at: DateTime<Utc>,
}

/// Where a run ended up once it stopped executing.
enum Settled {
    /// Input arrived during the run.
    Again(Workflow),
    /// Parked for input, with the runs cancelled to make room.
    Parked(Vec<Workflow>),
    /// Finished; still registered until retired.
    Finished(Workflow),
}

struct EngineInner {
    factories: RwLock<HashMap<String, Registration>>,
    instances: Mutex<HashMap<InstanceId, InstanceEntry>>,
    history: Mutex<VecDeque<WorkflowSummary>>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

/// Runs workflows on their own tasks.
///
/// Each started workflow gets a [`WorkflowControl`] and a tokio task. Runs
/// beyond `max_concurrent` wait for a slot rather than failing. When a run
/// finishes its summary moves into a bounded history and the instance
/// leaves the running set. Runs that end with steps waiting for user input
/// stay parked until [`WorkflowEngine::provide_user_input`] restarts them,
/// up to `max_parked` of them.
#[derive(Clone)]
pub struct WorkflowEngine {
    config: EngineConfig,
    registry: Option<Arc<AgentRegistry>>,
    bus: Option<EventBus>,
    inner: Arc<EngineInner>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .field("has_bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    /// Create an engine with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom settings.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            bus: None,
            inner: Arc::new(EngineInner {
                factories: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Attach the registry used by agent dispatch steps.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Publish lifecycle events on this bus.
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Register a workflow factory. The definition is read from one
    /// prototype built by the factory. Replaces any factory with the same id.
    pub fn register_workflow<F>(&self, factory: F) -> WorkflowDefinition
    where
        F: Fn() -> Workflow + Send + Sync + 'static,
    {
        let definition = factory().definition();
        let replaced = self
            .inner
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                definition.id.clone(),
                Registration {
                    definition: definition.clone(),
                    factory: Arc::new(factory),
                },
            )
            .is_some();
        info!(workflow_id = %definition.id, replaced, "Workflow registered");
        definition
    }

    /// Remove a workflow factory. Running instances are unaffected.
    pub fn unregister_workflow(&self, workflow_id: &str) -> bool {
        self.inner
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(workflow_id)
            .is_some()
    }

    /// Definitions of every registered workflow, sorted by id.
    #[must_use]
    pub fn get_available_workflows(&self) -> Vec<WorkflowDefinition> {
        let mut definitions: Vec<_> = self
            .inner
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|r| r.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }

    /// Instantiate a registered workflow, merge `context` into its initial
    /// context and run it on a new task.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is unknown or invalid, the engine is
    /// shut down, or no tokio runtime is available.
    pub fn start_workflow(&self, workflow_id: &str, context: Data) -> WorkflowResult<InstanceId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WorkflowError::ShutDown);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkflowError::NoRuntime(e.to_string()))?;

        let factory = self
            .inner
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .map(|r| Arc::clone(&r.factory))
            .ok_or_else(|| WorkflowError::UnknownWorkflow {
                workflow_id: workflow_id.to_string(),
            })?;

        let mut workflow = factory();
        workflow.merge_context(context);
        workflow.validate()?;

        let instance_id = InstanceId::new();
        workflow.assign_instance_id(instance_id);
        if let Some(registry) = &self.registry {
            workflow.ensure_registry(registry);
        }

        let control = Arc::new(WorkflowControl::new(self.inner.shutdown.child_token()));
        self.lock_instances().insert(
            instance_id,
            InstanceEntry {
                workflow_id: workflow.id().to_string(),
                step_ids: workflow.step_ids(),
                control: Arc::clone(&control),
                workflow: None,
                started_at: Utc::now(),
            },
        );

        info!(workflow_id, instance_id = %instance_id, "Workflow instance started");
        let engine = self.clone();
        runtime.spawn(async move { engine.run_instance(workflow, control, true).await });
        Ok(instance_id)
    }

    /// Deliver user input to a step of a running or parked instance.
    ///
    /// A running instance picks the input up before its next step. A parked
    /// instance is restarted; completed steps are not repeated.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance or step is unknown, or a parked
    /// instance cannot be restarted for lack of a runtime.
    pub fn provide_user_input(
        &self,
        instance_id: InstanceId,
        step_id: &str,
        input: Data,
    ) -> WorkflowResult<()> {
        let mut instances = self.lock_instances();
        let entry = instances
            .get_mut(&instance_id)
            .ok_or(WorkflowError::InstanceNotFound { instance_id })?;
        if !entry.step_ids.iter().any(|s| s == step_id) {
            return Err(WorkflowError::UnknownStep {
                workflow_id: entry.workflow_id.clone(),
                step_id: step_id.to_string(),
            });
        }

        if entry.workflow.is_none() {
            entry.control.push_input(step_id, input);
            debug!(instance_id = %instance_id, step_id, "User input queued");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkflowError::NoRuntime(e.to_string()))?;
        let Some(mut workflow) = entry.workflow.take() else {
            return Ok(());
        };
        if let Err(e) = workflow.provide_user_input(step_id, input) {
            entry.workflow = Some(workflow);
            return Err(e);
        }
        let control = Arc::clone(&entry.control);
        control.mark_running();
        drop(instances);

        info!(instance_id = %instance_id, step_id, "Resuming parked workflow");
        let engine = self.clone();
        runtime.spawn(async move { engine.run_instance(workflow, control, false).await });
        Ok(())
    }

    /// Pause an instance before its next step.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InstanceNotFound`] if the instance is not running.
    pub fn pause_workflow(&self, instance_id: InstanceId) -> WorkflowResult<()> {
        self.control(instance_id)?.pause();
        debug!(instance_id = %instance_id, "Pause requested");
        Ok(())
    }

    /// Resume a paused instance.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InstanceNotFound`] if the instance is not running.
    pub fn resume_workflow(&self, instance_id: InstanceId) -> WorkflowResult<()> {
        self.control(instance_id)?.resume();
        debug!(instance_id = %instance_id, "Resume requested");
        Ok(())
    }

    /// Cancel an instance and wait until it has stopped.
    ///
    /// A step that is already executing finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InstanceNotFound`] if the instance is not running.
    pub async fn cancel_workflow(&self, instance_id: InstanceId) -> WorkflowResult<WorkflowStatus> {
        let (control, parked) = {
            let mut instances = self.lock_instances();
            let entry = instances
                .get_mut(&instance_id)
                .ok_or(WorkflowError::InstanceNotFound { instance_id })?;
            let control = Arc::clone(&entry.control);
            control.cancel();
            let parked = entry.workflow.take();
            if parked.is_some() {
                instances.remove(&instance_id);
            }
            (control, parked)
        };

        match parked {
            Some(mut workflow) => {
                let status = workflow.cancel_idle(&control);
                self.publish_outcome(&workflow).await;
                self.record(&workflow);
                control.mark_settled();
                Ok(status)
            },
            None => Ok(control.settled().await),
        }
    }

    /// Status of a running, parked or recently finished instance.
    #[must_use]
    pub fn get_workflow_status(&self, instance_id: InstanceId) -> Option<WorkflowStatus> {
        if let Some(entry) = self.lock_instances().get(&instance_id) {
            return Some(entry.control.status());
        }
        self.find_summary(instance_id).map(|s| s.status)
    }

    /// Wait until the current run of an instance has settled.
    ///
    /// Returns immediately with [`WorkflowStatus::WaitingUser`] for a parked
    /// instance, or with the recorded status of a finished one.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InstanceNotFound`] for an unknown instance.
    pub async fn wait_for(&self, instance_id: InstanceId) -> WorkflowResult<WorkflowStatus> {
        let control = self
            .lock_instances()
            .get(&instance_id)
            .map(|e| Arc::clone(&e.control));
        match control {
            Some(control) => Ok(control.settled().await),
            None => self
                .find_summary(instance_id)
                .map(|s| s.status)
                .ok_or(WorkflowError::InstanceNotFound { instance_id }),
        }
    }

    /// Instances that have not finished, including parked ones.
    #[must_use]
    pub fn running_workflows(&self) -> Vec<RunningWorkflow> {
        let mut running: Vec<_> = self
            .lock_instances()
            .iter()
            .map(|(id, entry)| RunningWorkflow {
                instance_id: *id,
                workflow_id: entry.workflow_id.clone(),
                status: entry.control.status(),
                started_at: entry.started_at,
            })
            .collect();
        running.sort_by_key(|r| r.started_at);
        running
    }

    /// Finished runs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<WorkflowSummary> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Summary of a finished run.
    #[must_use]
    pub fn find_summary(&self, instance_id: InstanceId) -> Option<WorkflowSummary> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|s| s.instance_id == instance_id)
            .cloned()
    }

    /// Cancel every instance and wait up to the join timeout for them to stop.
    ///
    /// New runs are refused afterwards.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let (running, parked): (Vec<_>, Vec<_>) = {
            let mut instances = self.lock_instances();
            let parked_ids: Vec<InstanceId> = instances
                .iter()
                .filter(|(_, e)| e.workflow.is_some())
                .map(|(id, _)| *id)
                .collect();
            let parked = parked_ids
                .iter()
                .filter_map(|id| instances.remove(id))
                .filter_map(|e| e.workflow.map(|w| (w, e.control)))
                .collect();
            let running = instances.values().map(|e| Arc::clone(&e.control)).collect();
            (running, parked)
        };

        for (mut workflow, control) in parked {
            workflow.cancel_idle(&control);
            self.publish_outcome(&workflow).await;
            self.record(&workflow);
            control.mark_settled();
        }

        let count = running.len();
        let waits = futures::future::join_all(running.iter().map(|c| c.settled()));
        if tokio::time::timeout(self.config.join_timeout, waits)
            .await
            .is_err()
        {
            warn!(
                running = count,
                timeout_ms = self.config.join_timeout.as_millis(),
                "Workflows did not stop before timeout"
            );
        } else {
            info!(stopped = count, "Workflow engine shut down");
        }
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    async fn run_instance(
        self,
        mut workflow: Workflow,
        control: Arc<WorkflowControl>,
        mut first_run: bool,
    ) {
        loop {
            let permit = tokio::select! {
                () = control.token().cancelled() => None,
                permit = Arc::clone(&self.inner.permits).acquire_owned() => permit.ok(),
            };
            match permit {
                Some(_permit) => {
                    if first_run {
                        self.publish(EventType::WorkflowStarted, &workflow).await;
                    }
                    workflow.execute(&control).await;
                },
                None => {
                    workflow.cancel_idle(&control);
                },
            }

            match self.settle(workflow, &control) {
                Settled::Again(again) => {
                    workflow = again;
                    first_run = false;
                },
                Settled::Parked(evicted) => {
                    for stale in &evicted {
                        self.publish_outcome(stale).await;
                    }
                    break;
                },
                Settled::Finished(done) => {
                    self.publish_outcome(&done).await;
                    self.lock_instances().remove(&done.instance_id());
                    self.record(&done);
                    control.mark_settled();
                    break;
                },
            }
        }
    }

    /// Decide what happens to a workflow whose run just ended.
    ///
    /// A run still waiting for input is retired as cancelled if a cancel
    /// arrived after its last step, and parked otherwise.
    fn settle(&self, mut workflow: Workflow, control: &WorkflowControl) -> Settled {
        let instance_id = workflow.instance_id();
        if workflow.status() != WorkflowStatus::WaitingUser {
            return Settled::Finished(workflow);
        }

        let mut instances = self.lock_instances();
        if control.is_cancelled() {
            drop(instances);
            workflow.cancel_idle(control);
            return Settled::Finished(workflow);
        }

        let pending = control.take_inputs();
        if !pending.is_empty() {
            drop(instances);
            for (step_id, input) in pending {
                if let Err(e) = workflow.provide_user_input(&step_id, input) {
                    warn!(instance_id = %instance_id, error = %e, "Discarding user input");
                }
            }
            return Settled::Again(workflow);
        }

        if let Some(entry) = instances.get_mut(&instance_id) {
            entry.workflow = Some(workflow);
        }
        let evicted = self.evict_parked(&mut instances);
        drop(instances);
        debug!(instance_id = %instance_id, "Workflow parked waiting for user input");

        let evicted = evicted
            .into_iter()
            .map(|(mut stale, stale_control)| {
                stale_control.cancel();
                stale.cancel_idle(&stale_control);
                self.record(&stale);
                stale_control.mark_settled();
                stale
            })
            .collect();
        control.mark_settled();
        Settled::Parked(evicted)
    }

    /// Remove the oldest parked runs beyond `max_parked`.
    fn evict_parked(
        &self,
        instances: &mut HashMap<InstanceId, InstanceEntry>,
    ) -> Vec<(Workflow, Arc<WorkflowControl>)> {
        let mut parked: Vec<(DateTime<Utc>, InstanceId)> = instances
            .iter()
            .filter(|(_, e)| e.workflow.is_some())
            .map(|(id, e)| (e.started_at, *id))
            .collect();
        let excess = parked.len().saturating_sub(self.config.max_parked.max(1));
        if excess == 0 {
            return Vec::new();
        }
        parked.sort_by_key(|(started_at, _)| *started_at);

        parked
            .into_iter()
            .take(excess)
            .filter_map(|(_, id)| instances.remove(&id))
            .filter_map(|entry| {
                let workflow = entry.workflow?;
                warn!(
                    instance_id = %workflow.instance_id(),
                    workflow_id = %entry.workflow_id,
                    max_parked = self.config.max_parked,
                    "Too many workflows waiting for input, cancelling the oldest"
                );
                Some((workflow, entry.control))
            })
            .collect()
    }

    fn record(&self, workflow: &Workflow) {
        let capacity = self.config.history_capacity;
        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while capacity > 0 && history.len() >= capacity {
            history.pop_front();
        }
        if capacity > 0 {
            history.push_back(WorkflowSummary::of(workflow));
        }
    }

    async fn publish_outcome(&self, workflow: &Workflow) {
        let event_type = match workflow.status() {
            WorkflowStatus::Completed => EventType::WorkflowCompleted,
            WorkflowStatus::Failed => EventType::WorkflowFailed,
            WorkflowStatus::Cancelled => EventType::WorkflowCancelled,
            _ => return,
        };
        self.publish(event_type, workflow).await;
    }

    async fn publish(&self, event_type: EventType, workflow: &Workflow) {
        let Some(bus) = &self.bus else {
            return;
        };
        let mut event = Event::new(event_type, WORKFLOW_EVENT_SOURCE)
            .with_field("workflow_id", workflow.id())
            .with_field("instance_id", workflow.instance_id().to_string())
            .with_field("status", workflow.status().to_string());
        if let Some(error) = workflow.error() {
            event = event.with_field("error", error);
        }
        bus.publish(event).await;
    }

    fn control(&self, instance_id: InstanceId) -> WorkflowResult<Arc<WorkflowControl>> {
        self.lock_instances()
            .get(&instance_id)
            .map(|e| Arc::clone(&e.control))
            .ok_or(WorkflowError::InstanceNotFound { instance_id })
    }

    fn lock_instances(&self) -> MutexGuard<'_, HashMap<InstanceId, InstanceEntry>> {
        self.inner
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
