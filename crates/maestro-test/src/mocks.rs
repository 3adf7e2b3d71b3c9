//! Mock implementations for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use maestro_agents::{Agent, AgentError, AgentStatus};
use maestro_core::{AgentCapability, Data, DisplayNames};
use maestro_events::{Event, EventHandler, HandlerError, HandlerResult};

/// A call received by a [`MockAgent`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCall {
    /// Task type passed to `handle`.
    pub task_type: String,
    /// Data passed to `handle`.
    pub data: Data,
}

#[derive(Debug, Clone)]
enum Behavior {
    Respond(Data),
    Echo,
    Fail(String),
    Panic(String),
}

/// Mock implementation of the `Agent` trait for testing.
///
/// Clones share their call log, status log and scripted responses, so a
/// test can keep one clone and register another.
#[derive(Debug, Clone)]
pub struct MockAgent {
    capabilities: BTreeSet<AgentCapability>,
    names: DisplayNames,
    description: String,
    behavior: Behavior,
    latency: Option<Duration>,
    /// Responses returned before falling back to `behavior`.
    scripted: Arc<Mutex<VecDeque<Result<Data, AgentError>>>>,
    /// Captured calls.
    calls: Arc<Mutex<Vec<AgentCall>>>,
    /// Captured status notifications.
    statuses: Arc<Mutex<Vec<AgentStatus>>>,
}

impl MockAgent {
    /// Create a mock agent that returns an empty map.
    #[must_use]
    pub fn new(capabilities: impl IntoIterator<Item = AgentCapability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
            names: DisplayNames::new(),
            description: String::new(),
            behavior: Behavior::Respond(Data::new()),
            latency: None,
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always return this data.
    #[must_use]
    pub fn with_response(mut self, data: Data) -> Self {
        self.behavior = Behavior::Respond(data);
        self
    }

    /// Return the input data unchanged.
    #[must_use]
    pub fn echo(mut self) -> Self {
        self.behavior = Behavior::Echo;
        self
    }

    /// Always fail with this message.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    /// Always panic with this message.
    #[must_use]
    pub fn panicking(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Panic(message.into());
        self
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set the display names.
    #[must_use]
    pub fn with_names(mut self, names: DisplayNames) -> Self {
        self.names = names;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Queue a one-off response, returned before the default behavior.
    #[must_use]
    pub fn with_scripted(self, response: Result<Data, AgentError>) -> Self {
        self.queue(response);
        self
    }

    /// Queue a one-off response.
    pub fn queue(&self, response: Result<Data, AgentError>) {
        if let Ok(mut guard) = self.scripted.lock() {
            guard.push_back(response);
        }
    }

    /// Get captured calls.
    #[must_use]
    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Get captured status notifications, oldest first.
    #[must_use]
    pub fn statuses(&self) -> Vec<AgentStatus> {
        self.statuses.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn capabilities(&self) -> BTreeSet<AgentCapability> {
        self.capabilities.clone()
    }

    async fn handle(&self, task_type: &str, data: Data) -> Result<Data, AgentError> {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(AgentCall {
                task_type: task_type.to_string(),
                data: data.clone(),
            });
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.scripted.lock().ok().and_then(|mut g| g.pop_front());
        if let Some(response) = scripted {
            return response;
        }

        match &self.behavior {
            Behavior::Respond(response) => Ok(response.clone()),
            Behavior::Echo => Ok(data),
            Behavior::Fail(message) => Err(AgentError::failed(message.clone())),
            Behavior::Panic(message) => panic!("{message}"),
        }
    }

    fn display_names(&self) -> DisplayNames {
        self.names.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn set_status(&self, status: AgentStatus) {
        if let Ok(mut guard) = self.statuses.lock() {
            guard.push(status);
        }
    }
}

/// Event handler that records every event it receives.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    name: String,
    result: Option<Value>,
    failure: Option<String>,
    /// Captured events.
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    /// Create a handler that returns no value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: None,
            failure: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Return this value from every delivery.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Fail every delivery with this message (after recording the event).
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Get captured events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of events received.
    #[must_use]
    pub fn count(&self) -> usize {
        self.events.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Clear captured events.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.clear();
        }
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) -> HandlerResult {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
        match &self.failure {
            Some(message) => Err(HandlerError::new(message.clone())),
            None => Ok(self.result.clone()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
