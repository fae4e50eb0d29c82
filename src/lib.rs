//! # workflow-engine: a job-queue-driven workflow execution engine
//!
//! This crate is the execution core described in the system's spec: a
//! worker that dequeues node-execution jobs, dispatches them to typed node
//! handlers, accumulates an inter-node [`context::Context`], persists every
//! step to an append-only [`ledger`], publishes lifecycle [`event_bus::Event`]s,
//! suspends on human-approval gates, and resumes on external signals.
//!
//! Surrounding concerns — graph authoring, auth/identity, the LLM provider
//! and tool HTTP stack, and the wider observability surface — are treated as
//! external collaborators this crate only defines seams for (traits, not
//! implementations): [`llm::LlmProvider`], [`api::AuthValidator`],
//! [`workflow_store::WorkflowStore`].
//!
//! ## Quick Start
//!
//! ### Defining a workflow
//!
//! ```
//! use workflow_engine::graph::WorkflowBuilder;
//! use workflow_engine::types::NodeType;
//!
//! let workflow = WorkflowBuilder::new("wf-1", "owner", "greeting")
//!     .node("start", NodeType::Start)
//!     .node("end", NodeType::End)
//!     .edge("e1", "start", "end")
//!     .build();
//! ```
//!
//! ### Wiring and running the engine
//!
//! ```
//! use std::sync::Arc;
//! use workflow_engine::engine::Engine;
//! use workflow_engine::event_bus::EventHub;
//! use workflow_engine::graph::WorkflowBuilder;
//! use workflow_engine::ledger::InMemoryLedger;
//! use workflow_engine::llm::{EchoProvider, NoopToolExecutor};
//! use workflow_engine::node::HandlerEnv;
//! use workflow_engine::queue::InMemoryJobQueue;
//! use workflow_engine::run::InMemoryRunStore;
//! use workflow_engine::types::NodeType;
//! use workflow_engine::workflow_store::InMemoryWorkflowStore;
//!
//! # async fn doc() {
//! let workflow = WorkflowBuilder::new("wf-1", "owner", "greeting")
//!     .node("start", NodeType::Start)
//!     .node("end", NodeType::End)
//!     .edge("e1", "start", "end")
//!     .build();
//!
//! let workflows = Arc::new(InMemoryWorkflowStore::new());
//! workflows.insert(workflow);
//!
//! let hub = EventHub::new(1024);
//! let engine = Engine::new(
//!     Arc::new(InMemoryJobQueue::new()),
//!     Arc::new(InMemoryLedger::new()),
//!     Arc::new(InMemoryRunStore::new()),
//!     workflows,
//!     Arc::new(hub.emitter()),
//!     HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor)),
//! );
//! # let _ = engine;
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] — the `NodeType` taxonomy shared by the data model and node dispatch.
//! - [`model`] — `Workflow`/`Node`/`Edge`, the persisted graph shape.
//! - [`context`] — the accumulated per-run context and its shallow-merge rule.
//! - [`template`] — `{{input.path}}` interpolation and comparison used by `agent`/`if_else`.
//! - [`graph`] — the authoring-time builder and save-time validator.
//! - [`ledger`] — the append-only record of node executions.
//! - [`run`] — run lifecycle state and the approval-gate row.
//! - [`queue`] — the broker-agnostic job queue adapter.
//! - [`node`] — one handler per node type, dispatched by [`node::dispatch`].
//! - [`llm`] — the LLM provider and tool-executor seams `agent`/`cognitive` depend on.
//! - [`workflow_store`] — read-only access to authored workflow definitions.
//! - [`engine`] — the worker loop tying the above together.
//! - [`event_bus`] — the typed pub/sub bus events are published on.
//! - [`api`] — the HTTP/WebSocket surface: run initiation, approval resume, broadcaster.
//! - [`config`] — runtime configuration: backend selection, timeouts, bind address.
//! - [`telemetry`] — plain-text rendering of events and error chains for log sinks.
//! - [`errors`] — the shared error-chain type used across node handlers.
//! - [`message`] — chat message type passed to [`llm::LlmProvider`].

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod event_bus;
pub mod graph;
pub mod ledger;
pub mod llm;
pub mod message;
pub mod model;
pub mod node;
pub mod queue;
pub mod run;
pub mod telemetry;
pub mod template;
pub mod types;
pub mod workflow_store;
