//! Requests submitted to the coordinator and their responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maestro_core::{Data, Priority, RequestId, RequestType};

/// A typed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier.
    pub id: RequestId,
    /// Kind of work requested.
    #[serde(rename = "type")]
    pub request_type: RequestType,
    /// Request payload.
    #[serde(default)]
    pub data: Data,
    /// Queue priority for asynchronous submission.
    #[serde(default)]
    pub priority: Priority,
    /// Component that submitted the request.
    pub source: String,
    /// When the request was created.
    pub timestamp: DateTime<Utc>,
}

impl Request {
    /// Create a request with normal priority.
    #[must_use]
    pub fn new(request_type: RequestType, data: Data) -> Self {
        Self {
            id: RequestId::new(),
            request_type,
            data,
            priority: Priority::Normal,
            source: "coordinator".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Outcome of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request this answers.
    pub request_id: RequestId,
    /// Whether an agent handled the request successfully.
    pub success: bool,
    /// Data returned by the agent.
    #[serde(default)]
    pub data: Data,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
    /// Agent that handled the request, if one was found.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Time spent in the agent, in milliseconds.
    #[serde(default)]
    pub processing_time_ms: f64,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
}

impl Response {
    /// A successful response carrying agent output.
    #[must_use]
    pub fn success(
        request_id: RequestId,
        data: Data,
        agent_id: impl Into<String>,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            request_id,
            success: true,
            data,
            error: None,
            agent_id: Some(agent_id.into()),
            processing_time_ms,
            timestamp: Utc::now(),
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(request_id: RequestId, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            data: Data::new(),
            error: Some(error.into()),
            agent_id: None,
            processing_time_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Attach the agent and timing to a failed dispatch.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>, processing_time_ms: f64) -> Self {
        self.agent_id = Some(agent_id.into());
        self.processing_time_ms = processing_time_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = Request::new(RequestType::SaveData, Data::new())
            .with_priority(Priority::High)
            .with_source("form");
        assert_eq!(request.priority, Priority::High);
        assert_eq!(request.source, "form");
    }

    #[test]
    fn test_response_constructors() {
        let id = RequestId::new();
        let ok = Response::success(id, Data::new(), "db", 4.0);
        assert!(ok.success);
        assert_eq!(ok.agent_id.as_deref(), Some("db"));

        let failed = Response::failure(id, "no agent available").with_agent("db", 2.5);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("no agent available"));
        assert!((failed.processing_time_ms - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_response_serializes_request_type_names() {
        let request = Request::new(RequestType::AnalyzeEmail, Data::new());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], json!("analyze_email"));
    }
}
