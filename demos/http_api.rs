//! Demo: serving the engine's HTTP/WebSocket surface (spec §6)
//!
//! Wires `api::router` over the same stores an `Engine` worker drains,
//! starts the worker as a background task, and serves both on one
//! listener. Grounded on the teacher's `demo7_axum_sse` wiring shape
//! (`Router::new().with_state(...)`, `axum::serve`), generalized from one
//! SSE route to the full endpoint table.
//!
//! Run it, then in another shell:
//! ```bash
//! cargo run --example http_api
//! curl -s -X POST localhost:8080/workflows/wf-greeting/execute -d '{"name":"Ada"}'
//! curl -s localhost:8080/workflows/wf-greeting/runs
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use workflow_engine::api::{self, AllowAllAuth, AppState};
use workflow_engine::config::EngineConfig;
use workflow_engine::engine::Engine;
use workflow_engine::event_bus::EventHub;
use workflow_engine::graph::WorkflowBuilder;
use workflow_engine::ledger::InMemoryLedger;
use workflow_engine::llm::{EchoProvider, NoopToolExecutor};
use workflow_engine::node::HandlerEnv;
use workflow_engine::queue::InMemoryJobQueue;
use workflow_engine::run::InMemoryRunStore;
use workflow_engine::types::NodeType;
use workflow_engine::workflow_store::InMemoryWorkflowStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_target(false).with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = EngineConfig::default();

    let workflows = Arc::new(InMemoryWorkflowStore::new());
    workflows.insert(
        WorkflowBuilder::new("wf-greeting", "demo", "greeting")
            .node("start", NodeType::Start)
            .node("end", NodeType::End)
            .edge("e1", "start", "end")
            .build(),
    );

    let queue = Arc::new(InMemoryJobQueue::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let runs = Arc::new(InMemoryRunStore::new());
    let hub = EventHub::new(config.event_bus_buffer_capacity);

    let handlers = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor))
        .with_tool_call_cap(config.tool_call_cap)
        .with_llm_max_retries(config.llm_max_retries);
    let engine = Engine::new(
        queue.clone(),
        ledger.clone(),
        runs.clone(),
        workflows.clone(),
        Arc::new(hub.emitter()),
        handlers,
    )
    .with_node_timeout(config.node_timeout);
    tokio::spawn(async move { engine.run_forever().await });

    let state = AppState::new(queue, ledger, runs, workflows, hub, Arc::new(AllowAllAuth));
    let router = api::router(state);

    let addr: SocketAddr = config.http_bind_address.parse().expect("valid bind address");
    let listener = TcpListener::bind(addr).await.expect("bind listener");
    info!(%addr, "serving workflow engine HTTP/WS surface");
    axum::serve(listener, router.into_make_service()).await.expect("server error");
}
