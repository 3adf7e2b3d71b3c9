//! Shared helpers for integration tests.

use std::sync::{Arc, Mutex};

use maestro_core::Priority;
use maestro_events::{Event, EventHandler, FnHandler};

/// Records the order in which handlers see events.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct DeliveryLog {
    entries: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that appends `label` for every event and then fails when
    /// `fail` is set.
    pub fn handler(&self, label: &str, fail: bool) -> Arc<dyn EventHandler> {
        let entries = Arc::clone(&self.entries);
        let label = label.to_string();
        Arc::new(FnHandler::new(label.clone(), move |_event: &Event| {
            entries.lock().unwrap().push(label.clone());
            if fail {
                Err(format!("{label} refused").into())
            } else {
                Ok(None)
            }
        }))
    }

    /// A handler that appends each event's priority.
    pub fn priority_handler(&self) -> Arc<dyn EventHandler> {
        let entries = Arc::clone(&self.entries);
        Arc::new(FnHandler::new("priorities", move |event: &Event| {
            entries.lock().unwrap().push(event.priority.to_string());
            Ok(None)
        }))
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Priority label as recorded by [`DeliveryLog::priority_handler`].
#[allow(dead_code)]
pub fn label(priority: Priority) -> String {
    priority.to_string()
}
