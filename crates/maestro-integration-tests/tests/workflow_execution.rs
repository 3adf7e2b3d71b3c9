//! Integration tests for workflows running through the engine.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use maestro_agents::AgentRegistry;
use maestro_core::{AgentCapability, Data, EventType};
use maestro_events::{EventBus, HistoryFilter};
use maestro_test::{MockAgent, init_test_logging, test_data, within};
use maestro_workflow::{
    Condition, EngineConfig, HistoryKind, Step, StepError, StepStatus, Workflow,
    WorkflowEngine, WorkflowStatus,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_exhausted_retries_fail_the_workflow() {
    init_test_logging();
    let engine = WorkflowEngine::new();
    let third_runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&third_runs);
    engine.register_workflow(move || {
        let counter = Arc::clone(&counter);
        Workflow::new("import")
            .step(Step::from_fn("fetch", |_| Ok(Some(json!("rows")))))
            .step(
                Step::from_fn("parse", |_| Err(StepError::new("bad header")))
                    .with_max_retries(2),
            )
            .step(Step::from_fn("store", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }))
    });

    let instance = engine.start_workflow("import", Data::new()).unwrap();
    let status = within(WAIT, "import run", engine.wait_for(instance))
        .await
        .unwrap();
    assert_eq!(status, WorkflowStatus::Failed);

    let summary = engine.find_summary(instance).unwrap();
    let parse_attempts: Vec<_> = summary
        .history
        .iter()
        .filter(|h| h.item_id == "parse")
        .collect();
    assert_eq!(parse_attempts.len(), 3);
    assert!(parse_attempts.iter().all(|h| h.success == Some(false)));
    assert!(summary.error.as_deref().unwrap().contains("bad header"));
    assert!(summary.history.iter().all(|h| h.item_id != "store"));
    assert_eq!(third_runs.load(Ordering::SeqCst), 0);
    assert!(engine.running_workflows().is_empty());
}

#[tokio::test]
async fn test_agent_steps_and_branching() {
    let registry = Arc::new(AgentRegistry::new());
    let analyzer = MockAgent::new([AgentCapability::EmailAnalysis])
        .with_response(test_data([("spam", true.into())]));
    let notifier = MockAgent::new([AgentCapability::Notification]);
    registry.register_declared("analyzer", Arc::new(analyzer.clone()), 0);
    registry.register_declared("notifier", Arc::new(notifier.clone()), 0);

    let bus = EventBus::new();
    let engine = WorkflowEngine::new()
        .with_registry(Arc::clone(&registry))
        .with_bus(bus.clone());

    engine.register_workflow(|| {
        Workflow::new("triage")
            .with_name("en", "Mail triage")
            .step(Step::agent("analyze", AgentCapability::EmailAnalysis, "analyze_email"))
            .condition(
                Condition::new(
                    "is_spam",
                    |ctx| Ok(ctx.get("spam").and_then(Value::as_bool).unwrap_or(false)),
                    "quarantine",
                )
                .otherwise("notify"),
            )
            .step(Step::from_fn("notify_skipped", |_| Ok(Some(json!("unreachable")))))
            .step(Step::from_fn("quarantine", |_| Ok(Some(json!("moved")))))
            .step(Step::agent("notify", AgentCapability::Notification, "notify"))
    });

    let instance = engine
        .start_workflow("triage", test_data([("message_id", "m-1".into())]))
        .unwrap();
    let status = within(WAIT, "triage run", engine.wait_for(instance))
        .await
        .unwrap();
    assert_eq!(status, WorkflowStatus::Completed);

    let summary = engine.find_summary(instance).unwrap();
    assert_eq!(summary.context["spam"], true);
    assert_eq!(summary.context["quarantine_result"], "moved");
    assert!(!summary.context.contains_key("notify_skipped_result"));
    assert!(
        summary
            .history
            .iter()
            .any(|h| h.kind == HistoryKind::Condition && h.outcome == "true")
    );

    let notify_skipped = summary.steps.iter().find(|(id, _)| id == "notify_skipped");
    assert_eq!(
        notify_skipped.map(|(_, status)| *status),
        Some(StepStatus::Skipped)
    );

    assert_eq!(analyzer.calls()[0].data["message_id"], "m-1");
    assert_eq!(notifier.call_count(), 1);
    assert_eq!(registry.get_agent_info("analyzer").unwrap().usage_count, 1);

    let started = bus.history(&HistoryFilter {
        event_type: Some(EventType::WorkflowStarted),
        ..HistoryFilter::default()
    });
    let completed = bus.history(&HistoryFilter {
        event_type: Some(EventType::WorkflowCompleted),
        ..HistoryFilter::default()
    });
    assert_eq!(started.len(), 1);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].data["workflow_id"], "triage");
}

#[tokio::test]
async fn test_condition_loop_polls_until_ready() {
    let engine = WorkflowEngine::new();
    engine.register_workflow(|| {
        Workflow::new("poll_export")
            .step(Step::from_fn("poll", |ctx| {
                let polls = ctx.get("polls").and_then(Value::as_i64).unwrap_or(0);
                Ok(Some(json!({"polls": polls + 1})))
            }))
            .condition(
                Condition::new(
                    "pending",
                    |ctx| Ok(ctx.get("polls").and_then(Value::as_i64).unwrap_or(0) < 3),
                    "poll",
                )
                .otherwise("download"),
            )
            .step(Step::from_fn("download", |_| Ok(Some(json!("export.csv")))))
    });

    let instance = engine.start_workflow("poll_export", Data::new()).unwrap();
    let status = within(WAIT, "polling run", engine.wait_for(instance))
        .await
        .unwrap();
    assert_eq!(status, WorkflowStatus::Completed);

    let summary = engine.find_summary(instance).unwrap();
    assert_eq!(summary.context["polls"], 3);
    assert_eq!(summary.context["download_result"], "export.csv");
    let count = |id: &str| summary.history.iter().filter(|h| h.item_id == id).count();
    assert_eq!(count("poll"), 3);
    assert_eq!(count("pending"), 3);
    assert_eq!(count("download"), 1);
    assert!(
        summary
            .steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Completed)
    );
}

#[tokio::test]
async fn test_forward_branch_reports_skipped_steps() {
    let engine = WorkflowEngine::new();
    engine.register_workflow(|| {
        Workflow::new("order")
            .condition(
                Condition::new(
                    "prepaid",
                    |ctx| Ok(ctx.get("prepaid").and_then(Value::as_bool).unwrap_or(false)),
                    "ship",
                )
                .otherwise("invoice"),
            )
            .step(Step::from_fn("invoice", |_| Ok(Some(json!("inv-1")))))
            .step(Step::from_fn("collect", |_| Ok(Some(json!("paid")))))
            .step(Step::from_fn("ship", |_| Ok(Some(json!("shipped")))))
    });

    let prepaid = engine
        .start_workflow("order", test_data([("prepaid", true.into())]))
        .unwrap();
    assert_eq!(
        within(WAIT, "prepaid order", engine.wait_for(prepaid))
            .await
            .unwrap(),
        WorkflowStatus::Completed
    );
    let summary = engine.find_summary(prepaid).unwrap();
    assert_eq!(
        summary.steps,
        vec![
            ("invoice".to_string(), StepStatus::Skipped),
            ("collect".to_string(), StepStatus::Skipped),
            ("ship".to_string(), StepStatus::Completed),
        ]
    );
    assert!(!summary.context.contains_key("invoice_result"));

    let billed = engine.start_workflow("order", Data::new()).unwrap();
    within(WAIT, "billed order", engine.wait_for(billed))
        .await
        .unwrap();
    let summary = engine.find_summary(billed).unwrap();
    assert!(
        summary
            .steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Completed)
    );
}

#[tokio::test]
async fn test_user_input_resumes_parked_workflow() {
    let engine = WorkflowEngine::new();
    engine.register_workflow(|| {
        Workflow::new("approval")
            .step(Step::from_fn("draft", |_| Ok(Some(json!("draft-1")))))
            .step(Step::user_input("approve"))
            .step(Step::from_fn("publish", |ctx| {
                let approved = ctx.get("approved").and_then(Value::as_bool).unwrap_or(false);
                if approved {
                    Ok(Some(json!("published")))
                } else {
                    Err(StepError::new("not approved"))
                }
            }))
    });

    let instance = engine.start_workflow("approval", Data::new()).unwrap();
    let status = within(WAIT, "first run", engine.wait_for(instance))
        .await
        .unwrap();
    assert_eq!(status, WorkflowStatus::WaitingUser);
    assert_eq!(engine.get_workflow_status(instance), Some(WorkflowStatus::WaitingUser));

    engine
        .provide_user_input(instance, "approve", test_data([("approved", true.into())]))
        .unwrap();
    let status = within(WAIT, "resumed run", engine.wait_for(instance))
        .await
        .unwrap();
    assert_eq!(status, WorkflowStatus::Completed);

    let summary = engine.find_summary(instance).unwrap();
    assert_eq!(summary.context["publish_result"], "published");
    assert_eq!(
        summary.history.iter().filter(|h| h.item_id == "draft").count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_queues_runs() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let engine = WorkflowEngine::with_config(EngineConfig {
        max_concurrent: 2,
        ..EngineConfig::default()
    });

    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
    engine.register_workflow(move || {
        let (a, p) = (Arc::clone(&a), Arc::clone(&p));
        Workflow::new("slow").step(Step::new(
            "work",
            Arc::new(SlowStep {
                active: a,
                peak: p,
            }),
        ))
    });

    let instances: Vec<_> = (0..6)
        .map(|_| engine.start_workflow("slow", Data::new()).unwrap())
        .collect();
    for instance in instances {
        let status = within(WAIT, "slow run", engine.wait_for(instance))
            .await
            .unwrap();
        assert_eq!(status, WorkflowStatus::Completed);
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(engine.history().len(), 6);
}

struct SlowStep {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl maestro_workflow::StepHandler for SlowStep {
    async fn run(&self, _context: &Data) -> maestro_workflow::StepOutput {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}
