//! REST handlers for run initiation, approval resume, replay, and the
//! read-only run/ledger listing endpoints (spec §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::context::Context;
use crate::event_bus::Event;
use crate::ledger::{LedgerEntry, LedgerError};
use crate::queue::{Job, QueueError};
use crate::run::{Run, RunError, RunStatus};

use super::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("workflow {0} not found")]
    UnknownWorkflow(String),

    #[error("workflow {workflow_id} has no start node")]
    NoStartNode { workflow_id: String },

    #[error("run error: {0}")]
    Run(#[from] RunError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("run {run_id} is not awaiting approval")]
    NotAwaitingApproval { run_id: Uuid },

    #[error("no pending approval for node {node_id} on run {run_id}")]
    ApprovalMismatch { run_id: Uuid, node_id: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownWorkflow(_) | ApiError::NoStartNode { .. } | ApiError::ApprovalMismatch { .. } => {
                StatusCode::NOT_FOUND
            }
            ApiError::Run(RunError::NotFound(_) | RunError::NoPendingApproval(_)) => StatusCode::NOT_FOUND,
            ApiError::Run(RunError::AlreadyResumed(_)) | ApiError::NotAwaitingApproval { .. } => StatusCode::CONFLICT,
            ApiError::Run(RunError::Backend { .. }) | ApiError::Ledger(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub decision: String,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub success: bool,
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub run_id: Uuid,
}

/// `POST /workflows/{id}/execute`.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let workflow = state
        .workflows
        .get(&workflow_id)
        .await
        .ok_or_else(|| ApiError::UnknownWorkflow(workflow_id.clone()))?;
    let start = workflow
        .start_node()
        .ok_or_else(|| ApiError::NoStartNode { workflow_id: workflow_id.clone() })?;

    let run = Run::new(workflow_id.clone(), body.clone());
    let run_id = run.id;
    let timestamp = run.created_at;
    state.runs.create(run).await?;

    let _ = state.hub.publish(Event::RunStarted {
        run_id,
        workflow_id: workflow_id.clone(),
        initial_input: body.clone(),
        timestamp,
    });

    state.queue.enqueue(Job::new(run_id, start.id.clone(), body)).await?;

    Ok(Json(ExecuteResponse { run_id }))
}

/// `POST /workflows/{id}/runs/{run_id}/nodes/{node_id}/approve` (spec §4.8
/// resume path). Validates the approval before consuming it so a mismatched
/// node id never destroys a still-pending approval for a different node.
pub async fn approve_node(
    State(state): State<AppState>,
    Path((workflow_id, run_id, node_id)): Path<(String, Uuid, String)>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let run = state.runs.get(run_id).await?;
    if run.workflow_id != workflow_id {
        return Err(ApiError::UnknownWorkflow(workflow_id));
    }
    if run.status != RunStatus::AwaitingApproval {
        return Err(ApiError::NotAwaitingApproval { run_id });
    }

    let pending = state
        .runs
        .get_approval(run_id)
        .await?
        .ok_or_else(|| ApiError::ApprovalMismatch { run_id, node_id: node_id.clone() })?;
    if pending.node_id != node_id {
        return Err(ApiError::ApprovalMismatch { run_id, node_id });
    }

    let approval = state.runs.take_approval(run_id).await?;
    state.runs.set_status(run_id, RunStatus::Running, None).await?;

    let mut ctx = Context::from_value(approval.pending_input);
    let mut produced = FxHashMap::default();
    produced.insert("approval_decision".to_string(), json!(body.decision));
    produced.insert("approval_message".to_string(), json!(approval.message));
    ctx.merge(produced);

    state.queue.enqueue(Job::new(run_id, approval.node_id, ctx.to_value())).await?;

    Ok(Json(ApproveResponse { success: true, run_id }))
}

/// `POST /runs/{run_id}/replay`.
pub async fn replay_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let original = state.runs.get(run_id).await?;
    let workflow = state
        .workflows
        .get(&original.workflow_id)
        .await
        .ok_or_else(|| ApiError::UnknownWorkflow(original.workflow_id.clone()))?;
    let start = workflow
        .start_node()
        .ok_or_else(|| ApiError::NoStartNode { workflow_id: original.workflow_id.clone() })?;

    let new_run = Run::new(original.workflow_id.clone(), original.initial_input.clone());
    let new_run_id = new_run.id;
    let timestamp = new_run.created_at;
    state.runs.create(new_run).await?;

    let _ = state.hub.publish(Event::RunStarted {
        run_id: new_run_id,
        workflow_id: original.workflow_id.clone(),
        initial_input: original.initial_input.clone(),
        timestamp,
    });

    state
        .queue
        .enqueue(Job::new(new_run_id, start.id.clone(), original.initial_input))
        .await?;

    Ok(Json(ReplayResponse { run_id: new_run_id }))
}

/// `GET /workflows/{id}/runs`.
pub async fn list_runs(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<Run>>, ApiError> {
    Ok(Json(state.runs.list_for_workflow(&workflow_id).await?))
}

/// `GET /runs/{run_id}/ledger`, ordered by `sequence` per [`crate::ledger::LedgerStore::list_for_run`].
pub async fn get_ledger(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(state.ledger.list_for_run(run_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventHub;
    use crate::graph::WorkflowBuilder;
    use crate::ledger::InMemoryLedger;
    use crate::queue::InMemoryJobQueue;
    use crate::api::AllowAllAuth;
    use crate::run::{ApprovalRequest, InMemoryRunStore};
    use crate::types::NodeType;
    use crate::workflow_store::InMemoryWorkflowStore;
    use std::sync::Arc;

    fn state_with(workflow: crate::model::Workflow) -> (AppState, Arc<InMemoryRunStore>, Arc<InMemoryJobQueue>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let runs = Arc::new(InMemoryRunStore::new());
        let store = Arc::new(InMemoryWorkflowStore::new());
        store.insert(workflow);
        let hub = EventHub::new(16);
        let state = AppState::new(
            queue.clone(),
            ledger,
            runs.clone(),
            store,
            hub,
            Arc::new(AllowAllAuth),
        );
        (state, runs, queue)
    }

    fn demo_workflow(id: &str) -> crate::model::Workflow {
        WorkflowBuilder::new(id, "owner", "demo")
            .node("start", NodeType::Start)
            .node("end", NodeType::End)
            .edge("e1", "start", "end")
            .build()
    }

    #[tokio::test]
    async fn execute_creates_run_and_enqueues_start_job() {
        let (state, runs, queue) = state_with(demo_workflow("wf-1"));
        let response = execute_workflow(State(state), Path("wf-1".to_string()), Json(json!({"x": 1})))
            .await
            .unwrap();

        let run = runs.get(response.0.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);

        let delivery = queue.dequeue().await.unwrap();
        assert_eq!(delivery.job.node_id, "start");
        assert_eq!(delivery.job.input, json!({"x": 1}));
    }

    #[tokio::test]
    async fn execute_against_unknown_workflow_is_not_found() {
        let (state, _runs, _queue) = state_with(demo_workflow("wf-1"));
        let err = execute_workflow(State(state), Path("missing".to_string()), Json(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn approve_resumes_and_re_enqueues_with_decision() {
        let (state, runs, queue) = state_with(demo_workflow("wf-2"));
        let run = Run::new("wf-2", json!({"x": 1}));
        let run_id = run.id;
        runs.create(run).await.unwrap();
        runs.set_status(run_id, RunStatus::AwaitingApproval, None).await.unwrap();
        runs.create_approval(ApprovalRequest {
            run_id,
            node_id: "gate".into(),
            message: "Proceed?".into(),
            pending_input: json!({"x": 1}),
        })
        .await
        .unwrap();

        let response = approve_node(
            State(state),
            Path(("wf-2".to_string(), run_id, "gate".to_string())),
            Json(ApproveRequest { decision: "yes".into() }),
        )
        .await
        .unwrap();
        assert!(response.0.success);

        let run_after = runs.get(run_id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Running);
        assert!(runs.get_approval(run_id).await.unwrap().is_none());

        let delivery = queue.dequeue().await.unwrap();
        assert_eq!(delivery.job.node_id, "gate");
        assert_eq!(delivery.job.input["approval_decision"], json!("yes"));
    }

    #[tokio::test]
    async fn approve_on_non_suspended_run_conflicts() {
        let (state, runs, _queue) = state_with(demo_workflow("wf-3"));
        let run = Run::new("wf-3", json!({}));
        let run_id = run.id;
        runs.create(run).await.unwrap();

        let err = approve_node(
            State(state),
            Path(("wf-3".to_string(), run_id, "gate".to_string())),
            Json(ApproveRequest { decision: "yes".into() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotAwaitingApproval { .. }));
    }
}
