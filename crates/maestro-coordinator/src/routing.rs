//! Request-type and event-type routing tables.

use std::collections::HashMap;

use maestro_core::{AgentCapability, EventType, RequestType};

/// Maps request types to the capabilities that can serve them and event
/// types to the request they trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    capabilities: HashMap<RequestType, Vec<AgentCapability>>,
    events: HashMap<EventType, RequestType>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        use AgentCapability as C;
        use RequestType as R;

        let capabilities = HashMap::from([
            (R::AnalyzeEmail, vec![C::EmailAnalysis]),
            (R::DetectPatterns, vec![C::PatternDetection, C::EmailAnalysis]),
            (R::SaveData, vec![C::DatabaseWrite]),
            (R::QueryData, vec![C::DatabaseRead]),
            (R::ValidateData, vec![C::DataValidation]),
            (R::SendNotification, vec![C::Notification]),
            (R::GenerateReport, vec![C::ReportGeneration, C::DatabaseRead]),
            (R::ProcessFile, vec![C::FileProcessing]),
            (R::ScheduleTask, vec![C::Scheduling]),
        ]);

        let events = HashMap::from([
            (EventType::EmailReceived, R::AnalyzeEmail),
            (EventType::EmailAnalyzed, R::DetectPatterns),
            (EventType::DataSubmitted, R::SaveData),
            (EventType::ValidationRequested, R::ValidateData),
            (EventType::ReportRequested, R::GenerateReport),
            (EventType::FileUploaded, R::ProcessFile),
            (EventType::NotificationRequested, R::SendNotification),
        ]);

        Self {
            capabilities,
            events,
        }
    }
}

impl RoutingTable {
    /// A table with no routes at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            capabilities: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Capabilities able to serve a request type, in preference order.
    #[must_use]
    pub fn required_capabilities(&self, request_type: RequestType) -> Option<&[AgentCapability]> {
        self.capabilities
            .get(&request_type)
            .map(Vec::as_slice)
            .filter(|caps| !caps.is_empty())
    }

    /// Request type triggered by an event type.
    #[must_use]
    pub fn request_for_event(&self, event_type: EventType) -> Option<RequestType> {
        self.events.get(&event_type).copied()
    }

    /// Event types the coordinator listens to, in stable order.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.events.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Set the capabilities for a request type. An empty list unmaps it.
    pub fn set_capabilities(&mut self, request_type: RequestType, capabilities: Vec<AgentCapability>) {
        if capabilities.is_empty() {
            self.capabilities.remove(&request_type);
        } else {
            self.capabilities.insert(request_type, capabilities);
        }
    }

    /// Route an event type to a request type.
    pub fn set_event(&mut self, event_type: EventType, request_type: RequestType) {
        self.events.insert(event_type, request_type);
    }

    /// Stop routing an event type.
    pub fn remove_event(&mut self, event_type: EventType) -> Option<RequestType> {
        self.events.remove(&event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities() {
        let table = RoutingTable::default();
        assert_eq!(
            table.required_capabilities(RequestType::DetectPatterns),
            Some(&[AgentCapability::PatternDetection, AgentCapability::EmailAnalysis][..])
        );
        assert!(table.required_capabilities(RequestType::Custom).is_none());
        for request_type in RequestType::ALL {
            if request_type != RequestType::Custom {
                assert!(table.required_capabilities(request_type).is_some());
            }
        }
    }

    #[test]
    fn test_default_events() {
        let table = RoutingTable::default();
        assert_eq!(
            table.request_for_event(EventType::EmailReceived),
            Some(RequestType::AnalyzeEmail)
        );
        assert!(table.request_for_event(EventType::DataSaved).is_none());
        assert_eq!(table.event_types().len(), 7);
    }

    #[test]
    fn test_overrides() {
        let mut table = RoutingTable::default();
        table.set_capabilities(RequestType::Custom, vec![AgentCapability::UserInteraction]);
        table.set_capabilities(RequestType::SaveData, Vec::new());
        table.set_event(EventType::UserAction, RequestType::Custom);

        assert!(table.required_capabilities(RequestType::Custom).is_some());
        assert!(table.required_capabilities(RequestType::SaveData).is_none());
        assert_eq!(
            table.request_for_event(EventType::UserAction),
            Some(RequestType::Custom)
        );
        assert_eq!(table.remove_event(EventType::UserAction), Some(RequestType::Custom));
        assert!(RoutingTable::empty().event_types().is_empty());
    }
}
