//! Demo: building a workflow and running it through the engine loop
//!
//! What this shows:
//! 1. Authoring a workflow with `WorkflowBuilder` (start -> agent -> if_else,
//!    branching on `{{input.score}}`).
//! 2. Wiring `Engine` against in-memory stores and a `HandlerEnv` with the
//!    `EchoProvider` stub LLM.
//! 3. Subscribing to the event bus and watching a run progress to
//!    completion on the "high score" branch.
//! 4. A second run that lands on `user_approval` and is resumed once a
//!    decision comes in, exactly as the HTTP layer's `approve_node` handler
//!    would do it.
//!
//! Run it:
//! ```bash
//! cargo run --example basic_workflow
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use workflow_engine::context::Context;
use workflow_engine::engine::Engine;
use workflow_engine::event_bus::EventHub;
use workflow_engine::graph::WorkflowBuilder;
use workflow_engine::ledger::InMemoryLedger;
use workflow_engine::llm::{EchoProvider, NoopToolExecutor};
use workflow_engine::node::HandlerEnv;
use workflow_engine::queue::{InMemoryJobQueue, Job, JobQueue};
use workflow_engine::run::{InMemoryRunStore, Run, RunStatus, RunStore};
use workflow_engine::types::NodeType;
use workflow_engine::workflow_store::InMemoryWorkflowStore;

fn build_workflow() -> workflow_engine::model::Workflow {
    let mut check_config = workflow_engine::model::NodeConfig::new();
    check_config.insert("lhs".into(), json!("{{input.score}}"));
    check_config.insert("condition".into(), json!(">="));
    check_config.insert("rhs".into(), json!("50"));

    let mut agent_config = workflow_engine::model::NodeConfig::new();
    agent_config.insert("llm_model".into(), json!("demo-echo"));
    agent_config.insert("system_prompt".into(), json!("You summarize applicant scores."));
    agent_config.insert("user_prompt".into(), json!("Summarize the applicant's score of {{input.score}}."));

    let mut approval_config = workflow_engine::model::NodeConfig::new();
    approval_config.insert("message".into(), json!("Score {{input.score}} is below threshold, approve manually?"));

    WorkflowBuilder::new("wf-scoring", "demo", "scoring pipeline")
        .description("Routes applicants above a score threshold straight through, others to manual approval.")
        .node("start", NodeType::Start)
        .node_with_config("summarize", NodeType::Agent, agent_config)
        .node_with_config("check", NodeType::IfElse, check_config)
        .node_with_config("manual_review", NodeType::UserApproval, approval_config)
        .node("end_auto", NodeType::End)
        .node("end_reviewed", NodeType::End)
        .edge("e1", "start", "summarize")
        .edge("e2", "summarize", "check")
        .edge_with_handle("e3", "check", "end_auto", "true")
        .edge_with_handle("e4", "check", "manual_review", "false")
        .edge_with_handle("e5", "manual_review", "end_reviewed", "yes")
        .edge_with_handle("e6", "manual_review", "end_reviewed", "no")
        .build()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_target(false).with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let workflows = Arc::new(InMemoryWorkflowStore::new());
    workflows.insert(build_workflow());

    let queue = Arc::new(InMemoryJobQueue::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let runs: Arc<InMemoryRunStore> = Arc::new(InMemoryRunStore::new());
    let hub = EventHub::new(1024);

    let engine = Engine::new(
        queue.clone(),
        ledger,
        runs.clone(),
        workflows,
        Arc::new(hub.emitter()),
        HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor)),
    );

    let mut events = hub.subscribe_all();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(kind = event.kind(), "{event}");
        }
    });

    info!("--- run 1: score 85, should auto-complete on the true branch ---");
    let run_high = Run::new("wf-scoring", json!({ "score": 85 }));
    let run_high_id = run_high.id;
    runs.create(run_high).await.expect("create run");
    queue.enqueue(Job::new(run_high_id, "start", json!({ "score": 85 }))).await.expect("enqueue");
    // start -> summarize -> check -> end_auto: four hops to drain.
    for _ in 0..4 {
        drive_queue_once(&engine, &queue).await;
    }
    let run_high = runs.get(run_high_id).await.expect("run exists");
    info!(status = ?run_high.status, "run 1 finished");

    info!("--- run 2: score 20, should suspend for manual approval ---");
    let run_low = Run::new("wf-scoring", json!({ "score": 20 }));
    let run_low_id = run_low.id;
    runs.create(run_low).await.expect("create run");
    queue.enqueue(Job::new(run_low_id, "start", json!({ "score": 20 }))).await.expect("enqueue");
    // start -> summarize -> check -> manual_review (suspends): four hops to drain.
    for _ in 0..4 {
        drive_queue_once(&engine, &queue).await;
    }

    let run_low = runs.get(run_low_id).await.expect("run exists");
    assert_eq!(run_low.status, RunStatus::AwaitingApproval);
    info!("run 2 is suspended, resuming with a \"yes\" decision");

    let approval = runs.take_approval(run_low_id).await.expect("pending approval");
    runs.set_status(run_low_id, RunStatus::Running, None).await.expect("set status");
    let mut ctx = Context::from_value(approval.pending_input);
    let mut produced = FxHashMap::default();
    produced.insert("approval_decision".to_string(), json!("yes"));
    produced.insert("approval_message".to_string(), json!(approval.message));
    ctx.merge(produced);
    queue.enqueue(Job::new(run_low_id, approval.node_id, ctx.to_value())).await.expect("enqueue resume");
    // manual_review (resumed) -> end_reviewed: two hops to drain.
    for _ in 0..2 {
        drive_queue_once(&engine, &queue).await;
    }

    let run_low = runs.get(run_low_id).await.expect("run exists");
    info!(status = ?run_low.status, "run 2 finished");

    // Let the event-printing task flush its backlog before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

/// Pulls and processes exactly one job, matching the one-job-per-dequeue
/// shape `Engine::run_forever` uses internally, without looping forever.
async fn drive_queue_once(engine: &Engine, queue: &InMemoryJobQueue) {
    let delivery = match queue.dequeue().await {
        Ok(delivery) => delivery,
        Err(_) => return,
    };
    if let Err(err) = engine.process_job(delivery.job.clone()).await {
        tracing::error!(error = %err, "job failed");
    }
    delivery.ack();
}
