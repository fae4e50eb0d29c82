//! HTTP entry points (spec §6): run initiation, the approval resume path,
//! replay, run/ledger listing, and the WebSocket event broadcaster.
//!
//! Grounded on the teacher's `demo7_axum_sse` wiring (`Router::new().route(...)
//! .with_state(Arc<_>)`, `axum::extract::ws`), generalized from one SSE demo
//! route to the engine's full external surface (spec §1: "the only HTTP-facing
//! surface that is in scope").

mod routes;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::event_bus::EventHub;
use crate::ledger::LedgerStore;
use crate::queue::JobQueue;
use crate::run::RunStore;
use crate::workflow_store::WorkflowStore;

pub use routes::ApiError;
pub use ws::{AllowAllAuth, AuthValidator};

/// Shared state threaded through every handler. This is the "run initiator /
/// approval responder" collaborator from spec §2 item 8: a thin layer over
/// the same stores and queue the engine loop uses, never the engine itself.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub ledger: Arc<dyn LedgerStore>,
    pub runs: Arc<dyn RunStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub hub: Arc<EventHub>,
    pub auth: Arc<dyn AuthValidator>,
}

impl AppState {
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn LedgerStore>,
        runs: Arc<dyn RunStore>,
        workflows: Arc<dyn WorkflowStore>,
        hub: Arc<EventHub>,
        auth: Arc<dyn AuthValidator>,
    ) -> Self {
        Self { queue, ledger, runs, workflows, hub, auth }
    }
}

/// Builds the router described by the endpoint table in spec §6.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows/:id/execute", post(routes::execute_workflow))
        .route("/workflows/:id/runs/:run_id/nodes/:node_id/approve", post(routes::approve_node))
        .route("/runs/:run_id/replay", post(routes::replay_run))
        .route("/workflows/:id/runs", get(routes::list_runs))
        .route("/runs/:run_id/ledger", get(routes::get_ledger))
        .route("/api/ws/workflows/:id", get(ws::ws_handler))
        .with_state(state)
}
