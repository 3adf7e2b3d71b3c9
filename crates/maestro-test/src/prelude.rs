//! Prelude module - commonly used test utilities.
//!
//! Use `use maestro_test::prelude::*;` to import all test helpers.

// Mocks
pub use crate::{AgentCall, MockAgent, RecordingHandler};

// Fixtures
pub use crate::{test_data, test_event, test_event_with};

// Harness
pub use crate::{init_test_logging, wait_until, within};
