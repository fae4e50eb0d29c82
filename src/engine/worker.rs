use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, instrument, warn};

use crate::context::Context;
use crate::event_bus::Event;
use crate::event_bus::emitter::EventEmitter;
use crate::ledger::{LedgerEntry, LedgerError, LedgerStore};
use crate::model::Workflow;
use crate::node::{self, DEFAULT_NODE_TIMEOUT, HandlerEnv, NextNodes, Outcome};
use crate::queue::{Job, JobQueue, QueueError};
use crate::run::{ApprovalRequest, RunError, RunStatus, RunStore};
use crate::workflow_store::WorkflowStore;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    UnknownWorkflow(String),

    #[error("node {node_id} not found in workflow {workflow_id}")]
    UnknownNode { node_id: String, workflow_id: String },

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("run error: {0}")]
    Run(#[from] RunError),
}

/// Wires the node-handler framework to the durable stores and event bus
/// that back one engine process. Stateless beyond its `Arc` handles, so it
/// can be cloned and run from as many worker tasks as the deployment wants
/// (spec §4.7: "many worker processes can dequeue from the same queue").
#[derive(Clone)]
pub struct Engine {
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn LedgerStore>,
    runs: Arc<dyn RunStore>,
    workflows: Arc<dyn WorkflowStore>,
    events: Arc<dyn EventEmitter>,
    handlers: HandlerEnv,
    node_timeout: std::time::Duration,
}

impl Engine {
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn LedgerStore>,
        runs: Arc<dyn RunStore>,
        workflows: Arc<dyn WorkflowStore>,
        events: Arc<dyn EventEmitter>,
        handlers: HandlerEnv,
    ) -> Self {
        Self {
            queue,
            ledger,
            runs,
            workflows,
            events,
            handlers,
            node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }

    /// Overrides the per-node wall-clock budget (spec §5), e.g. from
    /// [`crate::config::EngineConfig::node_timeout`]. Defaults to
    /// [`DEFAULT_NODE_TIMEOUT`].
    #[must_use]
    pub fn with_node_timeout(mut self, node_timeout: std::time::Duration) -> Self {
        self.node_timeout = node_timeout;
        self
    }

    /// Dequeues and processes jobs until the queue closes. Intended to be
    /// spawned as a long-lived task; a deployment typically runs several of
    /// these concurrently (spec §4.7).
    pub async fn run_forever(&self) {
        loop {
            let delivery = match self.queue.dequeue().await {
                Ok(delivery) => delivery,
                Err(_) => {
                    warn!(target: "workflow_engine::engine", "job queue closed, stopping worker");
                    return;
                }
            };
            let job = delivery.job.clone();
            if let Err(err) = self.process_job(job).await {
                error!(target: "workflow_engine::engine", error = %err, "failed to process job");
            }
            delivery.ack();
        }
    }

    /// Executes one job end to end (spec §4.1 steps 1-6): fetch the workflow
    /// and node definitions, append a ledger entry, dispatch the handler,
    /// then record and route on the outcome.
    #[instrument(skip(self, job), fields(run_id = %job.run_id, node_id = %job.node_id))]
    pub async fn process_job(&self, job: Job) -> Result<(), EngineError> {
        let run = self.runs.get(job.run_id).await?;
        let workflow = self
            .workflows
            .get(&run.workflow_id)
            .await
            .ok_or_else(|| EngineError::UnknownWorkflow(run.workflow_id.clone()))?;
        let node = workflow
            .node(&job.node_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNode {
                node_id: job.node_id.clone(),
                workflow_id: workflow.id.clone(),
            })?;

        let ctx = Context::from_value(job.input.clone());
        let started_at = Utc::now();
        let entry = LedgerEntry::start(job.run_id, node.id.clone(), node.node_type, 0, job.input.clone());
        let entry_id = entry.id;
        self.ledger.append(entry).await?;

        let _ = self.events.emit(Event::NodeStarted {
            run_id: job.run_id,
            workflow_id: workflow.id.clone(),
            node_id: node.id.clone(),
            node_type: node.node_type,
            input_data: job.input.clone(),
            timestamp: started_at,
        });

        let outcome = match tokio::time::timeout(self.node_timeout, node::dispatch(&node, &ctx, &self.handlers)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Fail { error: "node execution timed out".to_string() },
        };

        match outcome {
            Outcome::Continue { produced, next, tool_calls } => {
                self.on_continue(&workflow, &run, &node, entry_id, started_at, ctx, produced, next, tool_calls)
                    .await
            }
            Outcome::Suspend { message } => self.on_suspend(&workflow, &run, &node, job.input, message).await,
            Outcome::Fail { error } => self.on_fail(&workflow, &run, &node, entry_id, started_at, error).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_continue(
        &self,
        workflow: &Workflow,
        run: &crate::run::Run,
        node: &crate::model::Node,
        entry_id: uuid::Uuid,
        started_at: chrono::DateTime<Utc>,
        ctx: Context,
        produced: rustc_hash::FxHashMap<String, serde_json::Value>,
        next: NextNodes,
        tool_calls: Option<serde_json::Value>,
    ) -> Result<(), EngineError> {
        let next_ctx = ctx.merged(produced);
        let output = next_ctx.to_value();
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds();

        self.ledger.mark_completed(entry_id, output.clone(), tool_calls, finished_at).await?;

        let _ = self.events.emit(Event::NodeCompleted {
            run_id: run.id,
            workflow_id: workflow.id.clone(),
            node_id: node.id.clone(),
            node_type: node.node_type,
            output_data: output.clone(),
            duration_ms,
            timestamp: finished_at,
        });

        let next_ids: Vec<String> = match next {
            NextNodes::None => Vec::new(),
            NextNodes::All => workflow.outgoing(&node.id).into_iter().map(|e| e.target_node.clone()).collect(),
            NextNodes::Handle(handle) => workflow
                .outgoing_with_handle(&node.id, handle)
                .into_iter()
                .map(|e| e.target_node.clone())
                .collect(),
        };
        let is_dead_end = next_ids.is_empty();
        for next_id in next_ids {
            self.queue.enqueue(Job::new(run.id, next_id, output.clone())).await?;
        }

        // Spec §8 scenario S3: a dead end (no successors enqueued) completes
        // the run exactly as an explicit `end` node would, even though no
        // `end` node was reached.
        if node.node_type.is_end() || is_dead_end {
            self.runs.set_status(run.id, RunStatus::Completed, Some(finished_at)).await?;
            let _ = self.events.emit(Event::RunCompleted {
                run_id: run.id,
                workflow_id: workflow.id.clone(),
                final_output: output,
                timestamp: finished_at,
            });
        }

        Ok(())
    }

    /// Spec §4.8: a `user_approval` node leaves its ledger row unfinished
    /// (no `mark_completed`/`mark_failed`) and parks the run. The resume
    /// entry point re-enqueues the same node id with `approval_decision`
    /// merged into the input.
    async fn on_suspend(
        &self,
        workflow: &Workflow,
        run: &crate::run::Run,
        node: &crate::model::Node,
        pending_input: serde_json::Value,
        message: String,
    ) -> Result<(), EngineError> {
        let timestamp = Utc::now();
        self.runs
            .create_approval(ApprovalRequest {
                run_id: run.id,
                node_id: node.id.clone(),
                message: message.clone(),
                pending_input,
            })
            .await?;
        self.runs.set_status(run.id, RunStatus::AwaitingApproval, None).await?;

        let _ = self.events.emit(Event::ApprovalNeeded {
            run_id: run.id,
            workflow_id: workflow.id.clone(),
            node_id: node.id.clone(),
            message,
            timestamp,
        });
        Ok(())
    }

    async fn on_fail(
        &self,
        workflow: &Workflow,
        run: &crate::run::Run,
        node: &crate::model::Node,
        entry_id: uuid::Uuid,
        _started_at: chrono::DateTime<Utc>,
        error: String,
    ) -> Result<(), EngineError> {
        let finished_at = Utc::now();
        self.ledger.mark_failed(entry_id, error.clone(), finished_at).await?;
        self.runs.set_status(run.id, RunStatus::Failed, Some(finished_at)).await?;

        let _ = self.events.emit(Event::NodeError {
            run_id: run.id,
            workflow_id: workflow.id.clone(),
            node_id: node.id.clone(),
            message: error.clone(),
            timestamp: finished_at,
        });
        let _ = self.events.emit(Event::RunFailed {
            run_id: run.id,
            workflow_id: workflow.id.clone(),
            error,
            timestamp: finished_at,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventHub;
    use crate::graph::WorkflowBuilder;
    use crate::ledger::InMemoryLedger;
    use crate::llm::{EchoProvider, NoopToolExecutor};
    use crate::queue::InMemoryJobQueue;
    use crate::run::{InMemoryRunStore, Run};
    use crate::types::NodeType;
    use crate::workflow_store::InMemoryWorkflowStore;
    use serde_json::json;

    struct Harness {
        engine: Engine,
        ledger: Arc<InMemoryLedger>,
        runs: Arc<InMemoryRunStore>,
        hub: Arc<EventHub>,
        workflow_id: String,
    }

    fn harness(workflow: crate::model::Workflow) -> Harness {
        let workflow_id = workflow.id.clone();
        let queue = Arc::new(InMemoryJobQueue::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let runs = Arc::new(InMemoryRunStore::new());
        let store = Arc::new(InMemoryWorkflowStore::new());
        store.insert(workflow);
        let hub = EventHub::new(16);
        let handlers = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor));
        let engine = Engine::new(queue, ledger.clone(), runs.clone(), store, Arc::new(hub.emitter()), handlers);
        Harness { engine, ledger, runs, hub, workflow_id }
    }

    #[tokio::test]
    async fn start_to_end_run_completes_and_fires_events() {
        let workflow = WorkflowBuilder::new("wf-1", "owner", "demo")
            .node("start", NodeType::Start)
            .node("end", NodeType::End)
            .edge("e1", "start", "end")
            .build();
        let h = harness(workflow);
        let mut stream = h.hub.subscribe(&h.workflow_id);

        let run = Run::new("wf-1", json!({"name": "Ada"}));
        let run_id = run.id;
        h.runs.create(run).await.unwrap();

        h.engine.process_job(Job::new(run_id, "start", json!({"name": "Ada"}))).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().kind(), "node_started");
        assert_eq!(stream.recv().await.unwrap().kind(), "node_completed");

        h.engine.process_job(Job::new(run_id, "end", json!({"name": "Ada"}))).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().kind(), "node_started");
        assert_eq!(stream.recv().await.unwrap().kind(), "node_completed");
        assert_eq!(stream.recv().await.unwrap().kind(), "run_completed");

        let run_after = h.runs.get(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Completed);

        let entries = h.ledger.list_for_run(run_id).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn if_else_with_no_matching_branch_completes_the_run_as_a_dead_end() {
        let mut check_config = crate::model::NodeConfig::new();
        check_config.insert("lhs".into(), json!("{{input.age}}"));
        check_config.insert("condition".into(), json!(">"));
        check_config.insert("rhs".into(), json!("18"));
        let workflow = WorkflowBuilder::new("wf-3b", "owner", "if_else dead end")
            .node("start", NodeType::Start)
            .node_with_config("check", NodeType::IfElse, check_config)
            .node("end_true", NodeType::End)
            .edge("e1", "start", "check")
            .edge_with_handle("e2", "check", "end_true", "true")
            .build();
        let h = harness(workflow);
        let mut stream = h.hub.subscribe(&h.workflow_id);

        let run = Run::new("wf-3b", json!({"age": 5}));
        let run_id = run.id;
        h.runs.create(run).await.unwrap();

        h.engine.process_job(Job::new(run_id, "check", json!({"age": 5}))).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().kind(), "node_started");
        assert_eq!(stream.recv().await.unwrap().kind(), "node_completed");
        assert_eq!(stream.recv().await.unwrap().kind(), "run_completed");

        let run_after = h.runs.get(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Completed);

        let entries = h.ledger.list_for_run(run_id).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn user_approval_suspends_run_without_finishing_ledger_entry() {
        let mut gate_config = crate::model::NodeConfig::new();
        gate_config.insert("message".into(), json!("Proceed?"));
        let workflow = WorkflowBuilder::new("wf-2", "owner", "approval demo")
            .node("start", NodeType::Start)
            .node_with_config("gate", NodeType::UserApproval, gate_config)
            .node("end", NodeType::End)
            .edge("e1", "start", "gate")
            .edge("e2", "gate", "end")
            .build();

        let h = harness(workflow);
        let mut stream = h.hub.subscribe(&h.workflow_id);

        let run = Run::new("wf-2", json!({}));
        let run_id = run.id;
        h.runs.create(run).await.unwrap();

        h.engine.process_job(Job::new(run_id, "gate", json!({}))).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().kind(), "node_started");
        assert_eq!(stream.recv().await.unwrap().kind(), "approval_needed");

        let run_after = h.runs.get(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::AwaitingApproval);

        let entries = h.ledger.list_for_run(run_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_orphan());

        let pending = h.runs.get_approval(run_id).await.unwrap().unwrap();
        assert_eq!(pending.message, "Proceed?");
    }

    #[tokio::test]
    async fn agent_node_failure_marks_run_failed() {
        let workflow = WorkflowBuilder::new("wf-3", "owner", "fail demo")
            .node("agent", NodeType::Agent)
            .build();
        let h = harness(workflow);
        let mut stream = h.hub.subscribe(&h.workflow_id);

        let run = Run::new("wf-3", json!({}));
        let run_id = run.id;
        h.runs.create(run).await.unwrap();

        // Missing `llm_model` config: the agent handler fails without ever
        // calling the LLM (spec §4.4.3).
        h.engine.process_job(Job::new(run_id, "agent", json!({}))).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().kind(), "node_started");
        assert_eq!(stream.recv().await.unwrap().kind(), "node_error");
        assert_eq!(stream.recv().await.unwrap().kind(), "run_failed");

        let run_after = h.runs.get(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Failed);

        let entries = h.ledger.list_for_run(run_id).await.unwrap();
        assert!(entries[0].error.is_some());
    }
}
