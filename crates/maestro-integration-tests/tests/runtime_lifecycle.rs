//! Integration tests for assembling the runtime from configuration.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use maestro_config::Config;
use maestro_core::{AgentCapability, Data, EventType, Priority, RequestType};
use maestro_events::EventHandler;
use maestro_runtime::{Runtime, RuntimeError};
use maestro_test::{MockAgent, RecordingHandler, init_test_logging, test_data, wait_until};
use maestro_workflow::{Step, Workflow, WorkflowStatus};

const CONFIG: &str = r#"
[events]
history_capacity = 5
poll_interval_ms = 10

[coordinator]
queue_poll_interval_ms = 10

[coordinator.capability_overrides]
validate_data = ["pattern_detection"]

[workflows]
max_concurrent = 2
history_capacity = 3

[shutdown]
join_timeout_ms = 500
"#;

fn runtime_from_file() -> Runtime {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("maestro.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = Config::load_file(&path).unwrap();
    Runtime::from_config(config).unwrap()
}

#[tokio::test]
async fn test_config_file_shapes_components() {
    init_test_logging();
    let runtime = runtime_from_file();

    assert_eq!(runtime.bus().config().history_capacity, 5);
    assert_eq!(runtime.bus().config().join_timeout, Duration::from_millis(500));
    assert_eq!(runtime.engine().config().max_concurrent, 2);
    assert_eq!(
        runtime
            .coordinator()
            .routing()
            .required_capabilities(RequestType::ValidateData),
        Some(&[AgentCapability::PatternDetection][..])
    );

    let detector = MockAgent::new([AgentCapability::PatternDetection]);
    assert!(
        runtime
            .register_agent("detector", Arc::new(detector.clone()), None, None, None)
            .await
    );
    let response = runtime
        .process_request(RequestType::ValidateData, Data::new(), None, false)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(detector.call_count(), 1);

    for _ in 0..10 {
        runtime
            .publish_event(EventType::UserAction, Data::new(), None, None, false)
            .await;
    }
    assert_eq!(runtime.bus().history_len(), 5);
}

#[test]
fn test_invalid_override_is_rejected() {
    let config = Config::from_toml_str(
        r#"
        [coordinator.capability_overrides]
        query_data = ["mind_reading"]
    "#,
    )
    .unwrap();
    let err = Runtime::from_config(config).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidValue { .. }));
    assert!(err.to_string().contains("query_data"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_lifecycle() {
    init_test_logging();
    let runtime = runtime_from_file();
    runtime.start().unwrap();

    let saved = Arc::new(RecordingHandler::new("saved"));
    runtime.bus().subscribe(
        EventType::DataSaved,
        Arc::clone(&saved) as Arc<dyn EventHandler>,
        None,
        0,
    );

    let writer = MockAgent::new([AgentCapability::DatabaseWrite]).echo();
    runtime
        .register_agent("writer", Arc::new(writer.clone()), None, Some(3), None)
        .await;

    // Async event reaches the coordinator through the consumer.
    runtime
        .publish_event(
            EventType::DataSubmitted,
            test_data([("id", 1.into())]),
            Some(Priority::High),
            Some("form"),
            true,
        )
        .await;
    assert!(wait_until(Duration::from_secs(2), || writer.call_count() == 1).await);

    // A workflow step publishes a follow-up event through the bus.
    let bus = runtime.bus().clone();
    runtime.register_workflow(move || {
        let bus = bus.clone();
        Workflow::new("save_and_announce")
            .step(Step::agent("save", AgentCapability::DatabaseWrite, "save_data"))
            .step(Step::from_fn("announce", move |ctx| {
                bus.publish_async(
                    maestro_events::Event::new(EventType::DataSaved, "workflow")
                        .with_data(ctx.clone()),
                );
                Ok(None)
            }))
    });

    let instance = runtime
        .start_workflow("save_and_announce", test_data([("id", 2.into())]))
        .unwrap();
    let status = runtime.engine().wait_for(instance).await.unwrap();
    assert_eq!(status, WorkflowStatus::Completed);
    assert!(wait_until(Duration::from_secs(2), || saved.count() == 1).await);
    assert_eq!(saved.events()[0].data["id"], 2);
    assert_eq!(writer.call_count(), 2);

    runtime.shutdown().await.unwrap();
    assert!(!runtime.bus().is_consumer_running());
    assert!(!runtime.coordinator().is_running());
    assert!(runtime.engine().is_shut_down());
}
