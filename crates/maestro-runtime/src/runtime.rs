//! The assembled runtime and its producer-facing API.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use maestro_agents::{Agent, AgentRegistry, AgentStatus};
use maestro_config::Config;
use maestro_coordinator::{Coordinator, Response};
use maestro_core::{AgentCapability, Data, EventType, InstanceId, Priority, RequestType};
use maestro_events::{DeliveryResult, Event, EventBus};
use maestro_workflow::{Workflow, WorkflowDefinition, WorkflowEngine};

use crate::config_bridge;
use crate::error::{RuntimeError, RuntimeResult};

/// Source recorded on events published without an explicit one.
pub const DEFAULT_EVENT_SOURCE: &str = "runtime";

/// Source recorded on agent lifecycle events.
pub const REGISTRY_EVENT_SOURCE: &str = "agent_registry";

/// Process-wide context holding every component.
///
/// Components are built in dependency order: the event bus and agent
/// registry first, then the coordinator over both, then the workflow engine.
/// Cloning the handles out of the runtime shares the same state.
pub struct Runtime {
    config: Config,
    bus: EventBus,
    registry: Arc<AgentRegistry>,
    coordinator: Arc<Coordinator>,
    engine: WorkflowEngine,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("agents", &self.registry.len())
            .field("coordinator_running", &self.coordinator.is_running())
            .field("consumer_running", &self.bus.is_consumer_running())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build a runtime from default configuration.
    #[must_use]
    pub fn new() -> Self {
        let config = Config::default();
        let bus = EventBus::with_config(config_bridge::to_bus_config(&config));
        let registry = Arc::new(AgentRegistry::new());
        let coordinator = Arc::new(
            Coordinator::new(Arc::clone(&registry), bus.clone())
                .with_config(config_bridge::to_coordinator_config(&config)),
        );
        let engine = WorkflowEngine::with_config(config_bridge::to_engine_config(&config))
            .with_registry(Arc::clone(&registry))
            .with_bus(bus.clone());
        Self {
            config,
            bus,
            registry,
            coordinator,
            engine,
        }
    }

    /// Build a runtime from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a capability override names an unknown request
    /// type or capability.
    pub fn from_config(config: Config) -> RuntimeResult<Self> {
        let routing = config_bridge::to_routing_table(&config)?;

        let bus = EventBus::with_config(config_bridge::to_bus_config(&config));
        let registry = Arc::new(AgentRegistry::new());
        let coordinator = Arc::new(
            Coordinator::new(Arc::clone(&registry), bus.clone())
                .with_config(config_bridge::to_coordinator_config(&config))
                .with_routing(routing),
        );
        let engine = WorkflowEngine::with_config(config_bridge::to_engine_config(&config))
            .with_registry(Arc::clone(&registry))
            .with_bus(bus.clone());

        debug!(
            history_capacity = config.events.history_capacity,
            max_concurrent = config.workflows.max_concurrent,
            overrides = config.coordinator.capability_overrides.len(),
            "Runtime assembled"
        );
        Ok(Self {
            config,
            bus,
            registry,
            coordinator,
            engine,
        })
    }

    /// Load configuration, install logging and assemble the runtime.
    ///
    /// An already installed global subscriber is kept and reported with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn bootstrap(config_path: Option<&Path>) -> RuntimeResult<Self> {
        let resolved = Config::load(config_path)?;
        let config = resolved.config;
        let log_config = config_bridge::to_log_config(&config)?;
        if let Err(e) = maestro_telemetry::setup_logging(&log_config) {
            warn!(error = %e, "Logging already initialized, keeping existing subscriber");
        }
        let runtime = Self::from_config(config)?;
        info!(files = ?resolved.loaded_files, "Runtime bootstrapped");
        Ok(runtime)
    }

    /// The configuration this runtime was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The agent registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The request coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The workflow engine.
    #[must_use]
    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Start the event bus consumer and the coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error if either is already running or no tokio runtime is
    /// available.
    pub fn start(&self) -> RuntimeResult<()> {
        self.bus.start_consumer()?;
        self.coordinator.start()?;
        info!("Runtime started");
        Ok(())
    }

    /// Stop everything in reverse construction order.
    ///
    /// Every component is stopped even when an earlier one fails; the first
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first stop failure.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        self.engine.shutdown().await;

        let mut first: Option<RuntimeError> = None;
        if self.coordinator.is_running() {
            if let Err(e) = self.coordinator.stop().await {
                warn!(error = %e, "Coordinator did not stop cleanly");
                first.get_or_insert(e.into());
            }
        }
        if self.bus.is_consumer_running() {
            if let Err(e) = self.bus.stop_consumer().await {
                warn!(error = %e, "Event consumer did not stop cleanly");
                first.get_or_insert(e.into());
            }
        }

        info!("Runtime shut down");
        first.map_or(Ok(()), Err)
    }

    // -----------------------------------------------------------------------
    // Producer API
    // -----------------------------------------------------------------------

    /// Publish an event.
    ///
    /// Synchronous publishing returns one delivery result per subscriber;
    /// with `asynchronous` set the event is queued and `None` is returned.
    pub async fn publish_event(
        &self,
        event_type: EventType,
        data: Data,
        priority: Option<Priority>,
        source: Option<&str>,
        asynchronous: bool,
    ) -> Option<Vec<DeliveryResult>> {
        let event = Event::new(event_type, source.unwrap_or(DEFAULT_EVENT_SOURCE))
            .with_data(data)
            .with_priority(priority.unwrap_or_default());
        if asynchronous {
            self.bus.publish_async(event);
            None
        } else {
            Some(self.bus.publish(event).await)
        }
    }

    /// Process a request through the coordinator.
    ///
    /// Returns `None` when `asynchronous` is set and the request was queued.
    pub async fn process_request(
        &self,
        request_type: RequestType,
        data: Data,
        priority: Option<Priority>,
        asynchronous: bool,
    ) -> Option<Response> {
        self.coordinator
            .process_request(request_type, data, priority.unwrap_or_default(), asynchronous)
            .await
    }

    /// Register a workflow factory with the engine.
    pub fn register_workflow<F>(&self, factory: F) -> WorkflowDefinition
    where
        F: Fn() -> Workflow + Send + Sync + 'static,
    {
        self.engine.register_workflow(factory)
    }

    /// Start a registered workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is unknown or the engine cannot run
    /// it.
    pub fn start_workflow(&self, workflow_id: &str, context: Data) -> RuntimeResult<InstanceId> {
        Ok(self.engine.start_workflow(workflow_id, context)?)
    }

    /// Definitions of every registered workflow.
    #[must_use]
    pub fn get_available_workflows(&self) -> Vec<WorkflowDefinition> {
        self.engine.get_available_workflows()
    }

    // -----------------------------------------------------------------------
    // Agent management
    // -----------------------------------------------------------------------

    /// Register an agent and announce it on the bus.
    ///
    /// Without explicit capabilities the agent's own declaration is used.
    /// The priority defaults to 0. Registering an existing id replaces it.
    pub async fn register_agent(
        &self,
        id: &str,
        agent: Arc<dyn Agent>,
        capabilities: Option<BTreeSet<AgentCapability>>,
        priority: Option<i32>,
        metadata: Option<Data>,
    ) -> bool {
        let capabilities = capabilities.unwrap_or_else(|| agent.capabilities());
        let priority = priority.unwrap_or_default();
        let names: Vec<Value> = capabilities
            .iter()
            .map(|c| Value::from(c.to_string()))
            .collect();

        if !self
            .registry
            .register(id, agent, capabilities, priority, metadata)
        {
            return false;
        }

        let event = Event::new(EventType::AgentRegistered, REGISTRY_EVENT_SOURCE)
            .with_field("agent_id", id)
            .with_field("capabilities", names)
            .with_field("priority", priority);
        self.bus.publish(event).await;
        true
    }

    /// Remove an agent and announce it on the bus.
    ///
    /// Returns `false` if the id is unknown.
    pub async fn unregister_agent(&self, id: &str) -> bool {
        if !self.registry.unregister(id) {
            return false;
        }
        let event =
            Event::new(EventType::AgentUnregistered, REGISTRY_EVENT_SOURCE).with_field("agent_id", id);
        self.bus.publish(event).await;
        true
    }

    /// Change an agent's status and announce it on the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unknown.
    pub async fn update_agent_status(&self, id: &str, status: AgentStatus) -> RuntimeResult<()> {
        self.registry.update_agent_status(id, status)?;
        let event = Event::new(EventType::AgentStatusChanged, REGISTRY_EVENT_SOURCE)
            .with_field("agent_id", id)
            .with_field("status", status.as_str());
        self.bus.publish(event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use maestro_events::HistoryFilter;
    use maestro_test::{MockAgent, RecordingHandler, init_test_logging, test_data, wait_until};
    use maestro_workflow::{Step, WorkflowStatus};

    fn collector(runtime: &Runtime, event_type: EventType) -> Arc<RecordingHandler> {
        let handler = Arc::new(RecordingHandler::new("collector"));
        runtime.bus().subscribe(
            event_type,
            Arc::clone(&handler) as Arc<dyn maestro_events::EventHandler>,
            None,
            0,
        );
        handler
    }

    #[tokio::test]
    async fn test_publish_event_sync_and_async() {
        init_test_logging();
        let runtime = Runtime::new();
        let handler = collector(&runtime, EventType::DataSubmitted);

        let results = runtime
            .publish_event(EventType::DataSubmitted, test_data([("n", 1.into())]), None, None, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(handler.events()[0].source, DEFAULT_EVENT_SOURCE);

        let queued = runtime
            .publish_event(
                EventType::DataSubmitted,
                Data::new(),
                Some(Priority::High),
                Some("importer"),
                true,
            )
            .await;
        assert!(queued.is_none());
        assert_eq!(runtime.bus().drain_pending().await, 1);
        assert_eq!(handler.count(), 2);
        assert_eq!(handler.events()[1].source, "importer");
    }

    #[tokio::test]
    async fn test_register_agent_publishes_lifecycle() {
        let runtime = Runtime::new();
        let registered = collector(&runtime, EventType::AgentRegistered);
        let unregistered = collector(&runtime, EventType::AgentUnregistered);
        let changed = collector(&runtime, EventType::AgentStatusChanged);

        let agent = Arc::new(MockAgent::new([AgentCapability::DatabaseWrite]));
        assert!(runtime.register_agent("db", agent.clone(), None, None, None).await);
        assert!(runtime.register_agent("db", agent, None, Some(7), None).await);

        assert_eq!(registered.count(), 2);
        let event = &registered.events()[1];
        assert_eq!(event.data["agent_id"], "db");
        assert_eq!(event.data["priority"], 7);
        assert_eq!(event.data["capabilities"][0], "database_write");
        assert_eq!(runtime.registry().len(), 1);
        assert_eq!(runtime.registry().get_agent_info("db").unwrap().priority, 7);

        runtime
            .update_agent_status("db", AgentStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(changed.events()[0].data["status"], "inactive");
        assert!(runtime.update_agent_status("nope", AgentStatus::Active).await.is_err());

        assert!(runtime.unregister_agent("db").await);
        assert!(!runtime.unregister_agent("db").await);
        assert_eq!(unregistered.count(), 1);
    }

    #[tokio::test]
    async fn test_process_request_routes_to_agent() {
        let runtime = Runtime::new();
        let agent = MockAgent::new([AgentCapability::DatabaseWrite])
            .with_response(test_data([("saved", true.into())]));
        runtime
            .register_agent("db", Arc::new(agent.clone()), None, None, None)
            .await;

        let response = runtime
            .process_request(RequestType::SaveData, Data::new(), None, false)
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.agent_id.as_deref(), Some("db"));
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test]
    async fn test_from_config_applies_overrides() {
        let mut config = Config::default();
        config
            .coordinator
            .capability_overrides
            .insert("save_data".to_owned(), vec!["file_processing".to_owned()]);
        let runtime = Runtime::from_config(config).unwrap();

        let files = MockAgent::new([AgentCapability::FileProcessing]);
        runtime
            .register_agent("files", Arc::new(files.clone()), None, None, None)
            .await;
        let response = runtime
            .process_request(RequestType::SaveData, Data::new(), None, false)
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(files.call_count(), 1);
    }

    #[test]
    fn test_from_config_rejects_unknown_request_type() {
        let mut config = Config::default();
        config
            .coordinator
            .capability_overrides
            .insert("teleport".to_owned(), Vec::new());
        assert!(matches!(
            Runtime::from_config(config),
            Err(RuntimeError::InvalidValue { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_workflow_and_shutdown() {
        let runtime = Runtime::new();
        runtime.start().unwrap();
        let completed = collector(&runtime, EventType::WorkflowCompleted);

        let definition = runtime.register_workflow(|| {
            Workflow::new("double")
                .with_name("en", "Double")
                .step(Step::from_fn("double", |ctx| {
                    let n = ctx.get("n").and_then(Value::as_i64).unwrap_or_default();
                    Ok(Some(Value::from(n.saturating_mul(2))))
                }))
        });
        assert_eq!(definition.id, "double");
        assert_eq!(runtime.get_available_workflows().len(), 1);

        let instance = runtime
            .start_workflow("double", test_data([("n", 21.into())]))
            .unwrap();
        let status = runtime.engine().wait_for(instance).await.unwrap();
        assert_eq!(status, WorkflowStatus::Completed);
        let summary = runtime.engine().find_summary(instance).unwrap();
        assert_eq!(summary.context["double_result"], 42);
        assert!(wait_until(Duration::from_secs(1), || completed.count() == 1).await);

        assert!(runtime.start_workflow("missing", Data::new()).is_err());

        runtime.shutdown().await.unwrap();
        assert!(!runtime.coordinator().is_running());
        assert!(!runtime.bus().is_consumer_running());
        assert!(runtime.start_workflow("double", Data::new()).is_err());
    }

    #[tokio::test]
    async fn test_events_reach_coordinator_once_started() {
        let runtime = Runtime::new();
        let agent = MockAgent::new([AgentCapability::EmailAnalysis]);
        runtime
            .register_agent("mail", Arc::new(agent.clone()), None, None, None)
            .await;
        runtime.start().unwrap();

        runtime
            .publish_event(EventType::EmailReceived, Data::new(), None, None, false)
            .await;
        assert_eq!(agent.call_count(), 1);

        runtime.shutdown().await.unwrap();
        let history = runtime.bus().history(&HistoryFilter::default());
        assert!(history.iter().any(|e| e.event_type == EventType::EmailReceived));
    }
}
