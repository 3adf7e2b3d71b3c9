//! The request coordinator.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use maestro_agents::{AgentHandle, AgentRegistry, AgentStatus};
use maestro_core::{AgentCapability, Data, EventType, Priority, RequestType, panic_message};
use maestro_events::{Event, EventBus, EventHandler, HandlerError, HandlerResult, SubscriptionId};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::hooks::{PostProcessHook, PreProcessHook, run_post_hook, run_pre_hook};
use crate::request::{Request, Response};
use crate::routing::RoutingTable;

/// Subscription id the coordinator uses on the event bus.
pub const COORDINATOR_SUBSCRIPTION_ID: &str = "coordinator";

/// Coordinator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How often the idle request worker re-checks its stop signal.
    pub queue_poll_interval: Duration,
    /// How long `stop` waits for the request worker.
    pub join_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue_poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// Counters describing coordinator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatistics {
    /// Requests that went through the synchronous path.
    pub processed: u64,
    /// Requests an agent handled successfully.
    pub succeeded: u64,
    /// Requests that failed for any reason.
    pub failed: u64,
    /// Requests that failed before reaching an agent.
    pub routing_failures: u64,
    /// Requests waiting for the worker.
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    routing_failures: AtomicU64,
}

/// A request waiting for the worker.
#[derive(Debug)]
struct QueuedRequest {
    seq: u64,
    request: Request,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct RequestQueue {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

impl RequestQueue {
    fn push(&mut self, request: Request) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(QueuedRequest { seq, request });
    }

    fn pop(&mut self) -> Option<Request> {
        self.heap.pop().map(|q| q.request)
    }
}

#[derive(Debug)]
struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Routes requests to agents by capability.
///
/// The coordinator resolves the first ACTIVE agent for a request type's
/// capabilities, dispatches through [`Agent::handle`](maestro_agents::Agent::handle)
/// and wraps the outcome in a [`Response`]. Routing and dispatch failures
/// never escape as errors; they come back as a failed response.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    bus: EventBus,
    routing: RoutingTable,
    config: CoordinatorConfig,
    pre_hooks: RwLock<Vec<Arc<dyn PreProcessHook>>>,
    post_hooks: RwLock<Vec<Arc<dyn PostProcessHook>>>,
    counters: Counters,
    queue: Mutex<RequestQueue>,
    notify: Arc<Notify>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("routing", &self.routing)
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator with the default routing tables.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, bus: EventBus) -> Self {
        Self {
            registry,
            bus,
            routing: RoutingTable::default(),
            config: CoordinatorConfig::default(),
            pre_hooks: RwLock::new(Vec::new()),
            post_hooks: RwLock::new(Vec::new()),
            counters: Counters::default(),
            queue: Mutex::new(RequestQueue::default()),
            notify: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the routing tables.
    #[must_use]
    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    /// Override the capabilities that serve a request type.
    #[must_use]
    pub fn with_capability_mapping(
        mut self,
        request_type: RequestType,
        capabilities: Vec<AgentCapability>,
    ) -> Self {
        self.routing.set_capabilities(request_type, capabilities);
        self
    }

    /// Route an event type to a request type.
    #[must_use]
    pub fn with_event_mapping(mut self, event_type: EventType, request_type: RequestType) -> Self {
        self.routing.set_event(event_type, request_type);
        self
    }

    /// The routing tables in use.
    #[must_use]
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// The agent registry this coordinator dispatches through.
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Append a pre-process hook. Hooks run in registration order.
    pub fn add_pre_hook(&self, hook: Arc<dyn PreProcessHook>) {
        debug!(hook = %hook.name(), "Pre-process hook added");
        self.pre_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Append a post-process hook. Hooks run in registration order.
    pub fn add_post_hook(&self, hook: Arc<dyn PostProcessHook>) {
        debug!(hook = %hook.name(), "Post-process hook added");
        self.post_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    fn lock_queue(&self) -> MutexGuard<'_, RequestQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process a request built from its parts.
    ///
    /// With `asynchronous` set the request is queued for the worker and
    /// `None` is returned; otherwise it is dispatched on the caller's task.
    pub async fn process_request(
        &self,
        request_type: RequestType,
        data: Data,
        priority: Priority,
        asynchronous: bool,
    ) -> Option<Response> {
        let request = Request::new(request_type, data).with_priority(priority);
        if asynchronous {
            self.submit(request);
            None
        } else {
            Some(self.dispatch(request).await)
        }
    }

    /// Queue a request for the worker.
    pub fn submit(&self, request: Request) {
        debug!(
            request_id = %request.id,
            request_type = %request.request_type,
            priority = %request.priority,
            "Request queued"
        );
        self.lock_queue().push(request);
        self.notify.notify_one();
    }

    /// Number of requests waiting for the worker.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_queue().heap.len()
    }

    /// Dispatch a request on the caller's task.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let Some(capabilities) = self.routing.required_capabilities(request.request_type) else {
            warn!(
                request_id = %request.id,
                request_type = %request.request_type,
                "No capability mapping for request type"
            );
            self.counters.routing_failures.fetch_add(1, Ordering::Relaxed);
            let response = Response::failure(
                request.id,
                format!("no capability mapping for request type {}", request.request_type),
            );
            return self.finish(&request, response);
        };

        let candidate = capabilities.iter().find_map(|capability| {
            self.registry
                .get_agent_by_capability(*capability, Some(AgentStatus::Active))
        });
        let Some(AgentHandle { id: agent_id, agent }) = candidate else {
            warn!(
                request_id = %request.id,
                request_type = %request.request_type,
                capabilities = ?capabilities,
                "No agent available for request"
            );
            self.counters.routing_failures.fetch_add(1, Ordering::Relaxed);
            let response = Response::failure(
                request.id,
                format!("no agent available for request type {}", request.request_type),
            );
            return self.finish(&request, response);
        };

        self.set_status(&agent_id, AgentStatus::Busy);
        let request = self.apply_pre_hooks(request);

        debug!(
            request_id = %request.id,
            request_type = %request.request_type,
            agent_id = %agent_id,
            "Dispatching request"
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(agent.handle(request.request_type.as_str(), request.data.clone()))
            .catch_unwind()
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.set_status(&agent_id, AgentStatus::Active);

        let response = match outcome {
            Ok(Ok(data)) => Response::success(request.id, data, agent_id.clone(), elapsed_ms),
            Ok(Err(e)) => {
                error!(
                    request_id = %request.id,
                    agent_id = %agent_id,
                    error = ?e,
                    "Agent failed to handle request"
                );
                Response::failure(request.id, e.to_string()).with_agent(agent_id.clone(), elapsed_ms)
            },
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    request_id = %request.id,
                    agent_id = %agent_id,
                    panic = %message,
                    "Agent panicked while handling request"
                );
                Response::failure(request.id, format!("agent panicked: {message}"))
                    .with_agent(agent_id.clone(), elapsed_ms)
            },
        };

        if let Err(e) = self
            .registry
            .record_usage(&agent_id, elapsed_ms, response.success)
        {
            debug!(agent_id = %agent_id, error = %e, "Usage not recorded");
        }

        self.finish(&request, response)
    }

    fn set_status(&self, agent_id: &str, status: AgentStatus) {
        if let Err(e) = self.registry.update_agent_status(agent_id, status) {
            debug!(agent_id = %agent_id, status = %status, error = %e, "Status not updated");
        }
    }

    fn apply_pre_hooks(&self, request: Request) -> Request {
        let hooks = self
            .pre_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        hooks
            .iter()
            .fold(request, |request, hook| run_pre_hook(hook.as_ref(), request))
    }

    fn finish(&self, request: &Request, response: Response) -> Response {
        let hooks = self
            .post_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let response = hooks
            .iter()
            .fold(response, |response, hook| run_post_hook(hook.as_ref(), request, response));

        if response.success {
            self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        response
    }

    /// Translate an event into a request and dispatch it.
    ///
    /// Returns `None` for event types with no route.
    pub async fn handle_event(&self, event: &Event) -> Option<Response> {
        let Some(request_type) = self.routing.request_for_event(event.event_type) else {
            debug!(event_type = %event.event_type, "No request route for event");
            return None;
        };

        let request = Request::new(request_type, event.data.clone())
            .with_priority(event.priority)
            .with_source(event.source.clone());
        Some(self.dispatch(request).await)
    }

    /// Subscribe to the bus for every routed event type and start the
    /// request worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is already running or no tokio runtime
    /// is available.
    pub fn start(self: &Arc<Self>) -> CoordinatorResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoordinatorError::NoRuntime(e.to_string()))?;

        {
            let mut worker = self.lock_worker();
            if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
                return Err(CoordinatorError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            let handle = runtime.spawn(work(
                Arc::downgrade(self),
                Arc::clone(&self.notify),
                cancel.clone(),
                self.config.queue_poll_interval,
            ));
            *worker = Some(WorkerHandle { cancel, handle });
        }

        let handler: Arc<dyn EventHandler> = Arc::new(CoordinatorEventHandler {
            coordinator: Arc::downgrade(self),
        });
        let event_types = self.routing.event_types();
        for event_type in &event_types {
            self.bus.subscribe(
                *event_type,
                Arc::clone(&handler),
                Some(SubscriptionId::from(COORDINATOR_SUBSCRIPTION_ID)),
                0,
            );
        }

        info!(event_types = ?event_types, "Coordinator started");
        Ok(())
    }

    /// Unsubscribe from the bus and stop the request worker.
    ///
    /// Requests still queued stay queued; [`drain_pending`](Self::drain_pending)
    /// processes them.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker does not stop within the join timeout.
    pub async fn stop(&self) -> CoordinatorResult<()> {
        self.bus
            .unsubscribe_all(&SubscriptionId::from(COORDINATOR_SUBSCRIPTION_ID));

        let taken = self.lock_worker().take();
        let Some(WorkerHandle { cancel, mut handle }) = taken else {
            return Ok(());
        };

        cancel.cancel();
        let timeout = self.config.join_timeout;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Coordinator stopped");
                Ok(())
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Coordinator worker ended abnormally");
                Ok(())
            },
            Err(_) => {
                handle.abort();
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "Coordinator worker did not stop in time, aborted");
                Err(CoordinatorError::WorkerJoinTimeout { timeout_ms })
            },
        }
    }

    /// Check whether the request worker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Process every queued request on the caller's task.
    ///
    /// Returns the responses in processing order.
    pub async fn drain_pending(&self) -> Vec<Response> {
        let mut responses = Vec::new();
        loop {
            let next = self.lock_queue().pop();
            let Some(request) = next else {
                break;
            };
            responses.push(self.dispatch(request).await);
        }
        responses
    }

    /// Activity counters.
    #[must_use]
    pub fn statistics(&self) -> CoordinatorStatistics {
        CoordinatorStatistics {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            routing_failures: self.counters.routing_failures.load(Ordering::Relaxed),
            queued: self.pending_count(),
        }
    }
}

/// Request worker loop. Holds only a weak reference to the coordinator.
async fn work(
    coordinator: Weak<Coordinator>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let Some(strong) = coordinator.upgrade() else {
            debug!("Coordinator dropped, request worker exiting");
            break;
        };
        let next = strong.lock_queue().pop();
        if let Some(request) = next {
            let response = strong.dispatch(request).await;
            debug!(
                request_id = %response.request_id,
                success = response.success,
                "Queued request processed"
            );
            continue;
        }
        drop(strong);

        tokio::select! {
            () = cancel.cancelled() => break,
            () = notify.notified() => {},
            () = tokio::time::sleep(poll_interval) => {},
        }
    }
}

/// Bus subscriber that forwards routed events to the coordinator.
struct CoordinatorEventHandler {
    coordinator: Weak<Coordinator>,
}

#[async_trait]
impl EventHandler for CoordinatorEventHandler {
    async fn handle(&self, event: &Event) -> HandlerResult {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return Err(HandlerError::new("coordinator is no longer running"));
        };
        match coordinator.handle_event(event).await {
            Some(response) => serde_json::to_value(&response)
                .map(Some)
                .map_err(|e| HandlerError::new(e.to_string())),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        COORDINATOR_SUBSCRIPTION_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::display_names;
    use maestro_events::HistoryFilter;
    use maestro_test::{MockAgent, test_data};
    use serde_json::json;

    fn setup() -> (Arc<AgentRegistry>, EventBus) {
        (Arc::new(AgentRegistry::new()), EventBus::new())
    }

    #[tokio::test]
    async fn test_unmapped_request_type_never_consults_registry() {
        let (registry, bus) = setup();
        let coordinator = Coordinator::new(Arc::clone(&registry), bus);

        let response = coordinator
            .process_request(RequestType::Custom, Data::new(), Priority::Normal, false)
            .await
            .unwrap();

        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("no capability mapping"));
        assert_eq!(registry.statistics().capability_lookups, 0);
    }

    #[tokio::test]
    async fn test_no_agent_available() {
        let (registry, bus) = setup();
        let coordinator = Coordinator::new(registry, bus);

        let response = coordinator
            .process_request(RequestType::SaveData, Data::new(), Priority::Normal, false)
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("no agent available"));
        assert_eq!(coordinator.statistics().routing_failures, 1);
    }

    #[tokio::test]
    async fn test_successful_dispatch_records_usage() {
        let (registry, bus) = setup();
        let agent = MockAgent::new([AgentCapability::DatabaseWrite])
            .with_response(test_data([("saved", json!(true))]));
        registry.register_declared("db", Arc::new(agent.clone()), 0);
        let coordinator = Coordinator::new(Arc::clone(&registry), bus);

        let response = coordinator
            .process_request(
                RequestType::SaveData,
                test_data([("record", json!(1))]),
                Priority::High,
                false,
            )
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.agent_id.as_deref(), Some("db"));
        assert_eq!(response.data.get("saved"), Some(&json!(true)));

        let calls = agent.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].task_type, "save_data");
        assert_eq!(calls[0].data.get("record"), Some(&json!(1)));

        let info = registry.get_agent_info("db").unwrap();
        assert_eq!(info.usage_count, 1);
        assert_eq!(info.error_count, 0);
        assert_eq!(info.status, AgentStatus::Active);
        assert_eq!(agent.statuses(), vec![AgentStatus::Busy, AgentStatus::Active]);
    }

    #[tokio::test]
    async fn test_agent_error_and_panic_become_failed_responses() {
        let (registry, bus) = setup();
        registry.register_declared(
            "failing",
            Arc::new(MockAgent::new([AgentCapability::Notification]).failing("smtp down")),
            0,
        );
        registry.register_declared(
            "panicking",
            Arc::new(MockAgent::new([AgentCapability::Scheduling]).panicking("scheduler bug")),
            0,
        );
        let coordinator = Coordinator::new(Arc::clone(&registry), bus);

        let response = coordinator
            .dispatch(Request::new(RequestType::SendNotification, Data::new()))
            .await;
        assert!(!response.success);
        assert_eq!(response.agent_id.as_deref(), Some("failing"));
        assert!(response.error.unwrap().contains("smtp down"));

        let response = coordinator
            .dispatch(Request::new(RequestType::ScheduleTask, Data::new()))
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("scheduler bug"));

        for id in ["failing", "panicking"] {
            let info = registry.get_agent_info(id).unwrap();
            assert_eq!(info.usage_count, 1);
            assert_eq!(info.error_count, 1);
            assert_eq!(info.status, AgentStatus::Active);
        }
        assert_eq!(coordinator.statistics().failed, 2);
    }

    #[tokio::test]
    async fn test_first_match_across_capabilities() {
        let (registry, bus) = setup();
        // GenerateReport prefers ReportGeneration, then DatabaseRead.
        registry.register_declared(
            "reader",
            Arc::new(MockAgent::new([AgentCapability::DatabaseRead])),
            100,
        );
        registry.register_declared(
            "reporter",
            Arc::new(MockAgent::new([AgentCapability::ReportGeneration])),
            1,
        );
        let coordinator = Coordinator::new(Arc::clone(&registry), bus);

        let response = coordinator
            .dispatch(Request::new(RequestType::GenerateReport, Data::new()))
            .await;
        assert_eq!(response.agent_id.as_deref(), Some("reporter"));

        registry
            .update_agent_status("reporter", AgentStatus::Disabled)
            .unwrap();
        let response = coordinator
            .dispatch(Request::new(RequestType::GenerateReport, Data::new()))
            .await;
        assert_eq!(response.agent_id.as_deref(), Some("reader"));
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let (registry, bus) = setup();
        let agent = MockAgent::new([AgentCapability::DataValidation]).echo();
        registry.register_declared("validator", Arc::new(agent), 0);
        let coordinator = Coordinator::new(registry, bus);

        coordinator.add_pre_hook(Arc::new(|mut request: Request| {
            request.data.insert("trail".to_string(), json!("a"));
            request
        }));
        coordinator.add_pre_hook(Arc::new(|mut request: Request| {
            let trail = request.data["trail"].as_str().unwrap_or_default().to_string();
            request.data.insert("trail".to_string(), json!(format!("{trail}b")));
            request
        }));
        coordinator.add_post_hook(Arc::new(|request: &Request, mut response: Response| {
            response
                .data
                .insert("source".to_string(), json!(request.source.clone()));
            response
        }));

        let response = coordinator
            .dispatch(Request::new(RequestType::ValidateData, Data::new()).with_source("form"))
            .await;
        assert!(response.success);
        assert_eq!(response.data.get("trail"), Some(&json!("ab")));
        assert_eq!(response.data.get("source"), Some(&json!("form")));
    }

    #[tokio::test]
    async fn test_capability_override() {
        let (registry, bus) = setup();
        registry.register_declared(
            "ui",
            Arc::new(MockAgent::new([AgentCapability::UserInteraction])),
            0,
        );
        let coordinator = Coordinator::new(registry, bus)
            .with_capability_mapping(RequestType::Custom, vec![AgentCapability::UserInteraction]);

        let response = coordinator
            .dispatch(Request::new(RequestType::Custom, Data::new()))
            .await;
        assert!(response.success);
        assert_eq!(response.agent_id.as_deref(), Some("ui"));
    }

    #[tokio::test]
    async fn test_handle_event_via_bus_subscription() {
        let (registry, bus) = setup();
        let agent = MockAgent::new([AgentCapability::EmailAnalysis])
            .with_names(display_names([("en", "Mail analyser")]))
            .with_response(test_data([("spam", json!(false))]));
        registry.register_declared("mail", Arc::new(agent.clone()), 0);
        let coordinator = Arc::new(Coordinator::new(registry, bus.clone()));
        coordinator.start().unwrap();

        assert_eq!(bus.subscriber_count(EventType::EmailReceived), 1);
        assert_eq!(bus.subscriber_count(EventType::DataSaved), 0);

        let results = bus
            .publish(Event::new(EventType::EmailReceived, "inbox").with_field("subject", "hi"))
            .await;
        assert_eq!(results.len(), 1);
        let response: Response =
            serde_json::from_value(results[0].result.clone().unwrap()).unwrap();
        assert!(response.success);
        assert_eq!(response.data.get("spam"), Some(&json!(false)));
        assert_eq!(agent.calls()[0].task_type, "analyze_email");

        // Unrouted events are ignored.
        assert!(
            coordinator
                .handle_event(&Event::new(EventType::DataSaved, "db"))
                .await
                .is_none()
        );

        coordinator.stop().await.unwrap();
        assert_eq!(bus.subscriber_count(EventType::EmailReceived), 0);
        assert_eq!(bus.history(&HistoryFilter::new()).len(), 1);
    }

    #[tokio::test]
    async fn test_async_path_runs_on_worker() {
        let (registry, bus) = setup();
        let agent = MockAgent::new([AgentCapability::FileProcessing]);
        registry.register_declared("files", Arc::new(agent.clone()), 0);
        let coordinator = Arc::new(
            Coordinator::new(registry, bus).with_config(CoordinatorConfig {
                queue_poll_interval: Duration::from_millis(10),
                ..CoordinatorConfig::default()
            }),
        );
        coordinator.start().unwrap();
        assert!(matches!(
            coordinator.start(),
            Err(CoordinatorError::AlreadyRunning)
        ));

        for _ in 0..3 {
            let returned = coordinator
                .process_request(RequestType::ProcessFile, Data::new(), Priority::Low, true)
                .await;
            assert!(returned.is_none());
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while agent.calls().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        coordinator.stop().await.unwrap();
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_drain_pending_orders_by_priority() {
        let (registry, bus) = setup();
        let agent = MockAgent::new([AgentCapability::DatabaseRead]).echo();
        registry.register_declared("reader", Arc::new(agent.clone()), 0);
        let coordinator = Coordinator::new(registry, bus);

        for (priority, tag) in [
            (Priority::Low, "low"),
            (Priority::Urgent, "urgent"),
            (Priority::Normal, "normal"),
        ] {
            coordinator.submit(
                Request::new(RequestType::QueryData, test_data([("tag", json!(tag))]))
                    .with_priority(priority),
            );
        }
        assert_eq!(coordinator.statistics().queued, 3);

        let tags: Vec<_> = coordinator
            .drain_pending()
            .await
            .into_iter()
            .map(|r| r.data["tag"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["urgent", "normal", "low"]);
    }
}
