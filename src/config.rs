//! Runtime configuration (spec §9 ambient concerns): backend selection,
//! timeouts, and HTTP bind address.
//!
//! Grounded on the teacher's `runtimes::runtime_config::RuntimeConfig`
//! (env-resolved SQLite path via `dotenvy`, builder-style `with_*` methods),
//! generalized from a single checkpointer choice to the engine's three
//! swappable durable stores (queue, ledger, run store all share one
//! backend choice here — a deployment running SQLite runs all three there).

use std::time::Duration;

use crate::node::{DEFAULT_NODE_TIMEOUT, DEFAULT_TOOL_CALL_CAP};

/// Which backend the durable stores (ledger, run store) use.
///
/// `JobQueue` has no SQLite implementation (spec §4.7 assumes an
/// out-of-process broker for real deployments); `Sqlite` here only selects
/// [`crate::ledger::sqlite::SqliteLedger`] and [`crate::run::sqlite::SqliteRunStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

/// Top-level engine configuration: one value threaded through wherever a
/// binary wires up an [`crate::engine::Engine`] and its HTTP surface.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub storage: StorageBackend,
    pub sqlite_db_name: Option<String>,
    pub http_bind_address: String,
    /// Per-node wall-clock budget (spec §5). Default 5 minutes.
    pub node_timeout: Duration,
    /// Tool-call loop cap for `agent` nodes (spec §4.4.3, §5). Default 8.
    pub tool_call_cap: usize,
    /// LLM/tool transient-error retry budget (spec §5, §7). Default 3.
    pub llm_max_retries: u32,
    pub event_bus_buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::InMemory,
            sqlite_db_name: Self::resolve_env("SQLITE_DB_NAME", "workflow_engine.db"),
            http_bind_address: Self::resolve_env("WORKFLOW_ENGINE_BIND", "127.0.0.1:8080")
                .expect("default bind address is always Some"),
            node_timeout: DEFAULT_NODE_TIMEOUT,
            tool_call_cap: DEFAULT_TOOL_CALL_CAP,
            llm_max_retries: 3,
            event_bus_buffer_capacity: 1024,
        }
    }
}

impl EngineConfig {
    fn resolve_env(var: &str, default: &str) -> Option<String> {
        dotenvy::dotenv().ok();
        Some(std::env::var(var).unwrap_or_else(|_| default.to_string()))
    }

    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn with_sqlite(mut self, db_name: impl Into<String>) -> Self {
        self.storage = StorageBackend::Sqlite;
        self.sqlite_db_name = Some(db_name.into());
        self
    }

    #[must_use]
    pub fn with_http_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.http_bind_address = addr.into();
        self
    }

    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tool_call_cap(mut self, cap: usize) -> Self {
        self.tool_call_cap = cap;
        self
    }
}
