//! Append-only ledger of node executions (spec §3, §4.1, §8 property 3).
//!
//! Grounded on the teacher's `runtimes::checkpointer` trait shape (`save`,
//! `load_latest` → here `append`, `list_for_run`) and its in-memory/SQLite
//! split (`InMemoryCheckpointer` / `SQLiteCheckpointer`).

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::types::NodeType;

/// One row of the ledger: one node execution attempt.
///
/// Append-only per spec §3: created at node start with `output = None`,
/// mutated exactly once at node finish, then never touched again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub run_id: Uuid,
    pub node_id: String,
    pub node_type: NodeType,
    pub sequence: u64,
    pub input: Value,
    pub output: Option<Value>,
    pub tool_calls: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl LedgerEntry {
    #[must_use]
    pub fn start(run_id: Uuid, node_id: impl Into<String>, node_type: NodeType, sequence: u64, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            node_id: node_id.into(),
            node_type,
            sequence,
            input,
            output: None,
            tool_calls: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error: None,
        }
    }

    /// An orphan is a row left `output = None, finished_at = None`: either a
    /// worker crashed mid-dispatch (spec §7) or a `user_approval` node is
    /// suspended awaiting resume. Operators distinguish the two via the Run's
    /// status, not the ledger row alone.
    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.output.is_none() && self.finished_at.is_none()
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("ledger entry {0} not found")]
    #[diagnostic(code(workflow_engine::ledger::not_found))]
    NotFound(Uuid),

    #[error("ledger backend error: {message}")]
    #[diagnostic(
        code(workflow_engine::ledger::backend),
        help("Check the ledger store's connection and schema.")
    )]
    Backend { message: String },

    #[error("ledger serialization error: {message}")]
    #[diagnostic(code(workflow_engine::ledger::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Durable append-only store of [`LedgerEntry`] rows, keyed by run.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a freshly-started entry and return the per-run sequence number
    /// assigned to it (spec §5: "assign at row creation time via an atomic
    /// per-run counter").
    async fn append(&self, entry: LedgerEntry) -> Result<u64>;

    /// Record a successful node finish. Mutated exactly once (spec §8 property 3).
    async fn mark_completed(
        &self,
        id: Uuid,
        output: Value,
        tool_calls: Option<Value>,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a failed node finish.
    async fn mark_failed(&self, id: Uuid, error: String, finished_at: DateTime<Utc>) -> Result<()>;

    /// All entries for a run, ordered by `sequence` (spec §8 property 2).
    async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<LedgerEntry>>;

    /// The most recently appended entry for a run, if any.
    async fn latest_for_run(&self, run_id: Uuid) -> Result<Option<LedgerEntry>> {
        Ok(self.list_for_run(run_id).await?.into_iter().max_by_key(|e| e.sequence))
    }
}

/// In-process ledger, suitable for tests and single-process deployments.
///
/// Grounded on `InMemoryCheckpointer`'s lock-guarded `FxHashMap` shape.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: RwLock<FxHashMap<Uuid, LedgerEntry>>,
    counters: RwLock<FxHashMap<Uuid, AtomicU64>>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self, run_id: Uuid) -> u64 {
        if let Some(counter) = self.counters.read().get(&run_id) {
            return counter.fetch_add(1, AtomicOrdering::SeqCst);
        }
        let mut counters = self.counters.write();
        let counter = counters.entry(run_id).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    #[instrument(skip(self, entry), fields(run_id = %entry.run_id, node_id = %entry.node_id))]
    async fn append(&self, mut entry: LedgerEntry) -> Result<u64> {
        let sequence = self.next_sequence(entry.run_id);
        entry.sequence = sequence;
        self.entries.write().insert(entry.id, entry);
        Ok(sequence)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        output: Value,
        tool_calls: Option<Value>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        let duration_ms = (finished_at - entry.started_at).num_milliseconds();
        entry.output = Some(output);
        entry.tool_calls = tool_calls;
        entry.finished_at = Some(finished_at);
        entry.duration_ms = Some(duration_ms);
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: String, finished_at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        let duration_ms = (finished_at - entry.started_at).num_milliseconds();
        entry.error = Some(error);
        entry.finished_at = Some(finished_at);
        entry.duration_ms = Some(duration_ms);
        Ok(())
    }

    async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let mut rows: Vec<LedgerEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.sequence);
        Ok(rows)
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite-backed ledger. Grounded on `runtimes::checkpointer_sqlite`'s
    //! pool-holding struct and manual row (de)serialization, simplified to
    //! one table (`ledger`) since this store does not need step/session
    //! pagination, only per-run ordering.

    use super::{LedgerEntry, LedgerError, LedgerStore, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use sqlx::{Row, SqlitePool};
    use std::str::FromStr;
    use tracing::instrument;
    use uuid::Uuid;

    use crate::types::NodeType;

    pub struct SqliteLedger {
        pool: SqlitePool,
    }

    impl SqliteLedger {
        /// Connect (or create) a SQLite database at `database_url` and ensure
        /// the `ledger` table exists.
        #[instrument(skip(database_url))]
        pub async fn connect(database_url: &str) -> Result<Self> {
            let pool = SqlitePool::connect(database_url)
                .await
                .map_err(|e| LedgerError::Backend { message: format!("connect: {e}") })?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS ledger (
                    id TEXT PRIMARY KEY,
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    node_type TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    input_json TEXT NOT NULL,
                    output_json TEXT,
                    tool_calls_json TEXT,
                    started_at TEXT NOT NULL,
                    finished_at TEXT,
                    duration_ms INTEGER,
                    error TEXT
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(|e| LedgerError::Backend { message: format!("create table: {e}") })?;
            sqlx::query("CREATE INDEX IF NOT EXISTS ledger_run_sequence ON ledger (run_id, sequence)")
                .execute(&pool)
                .await
                .map_err(|e| LedgerError::Backend { message: format!("create index: {e}") })?;
            Ok(Self { pool })
        }

        fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
            let id: String = row.get("id");
            let run_id: String = row.get("run_id");
            let node_type_str: String = row.get("node_type");
            let input_json: String = row.get("input_json");
            let output_json: Option<String> = row.get("output_json");
            let tool_calls_json: Option<String> = row.get("tool_calls_json");
            let started_at: String = row.get("started_at");
            let finished_at: Option<String> = row.get("finished_at");

            Ok(LedgerEntry {
                id: Uuid::from_str(&id).map_err(|e| LedgerError::Other { message: e.to_string() })?,
                run_id: Uuid::from_str(&run_id).map_err(|e| LedgerError::Other { message: e.to_string() })?,
                node_id: row.get("node_id"),
                node_type: NodeType::decode(&node_type_str)
                    .ok_or_else(|| LedgerError::Other { message: format!("unknown node_type {node_type_str}") })?,
                sequence: row.get::<i64, _>("sequence") as u64,
                input: serde_json::from_str(&input_json).map_err(|e| LedgerError::Other { message: e.to_string() })?,
                output: output_json
                    .map(|s| serde_json::from_str(&s))
                    .transpose()
                    .map_err(|e| LedgerError::Other { message: e.to_string() })?,
                tool_calls: tool_calls_json
                    .map(|s| serde_json::from_str(&s))
                    .transpose()
                    .map_err(|e| LedgerError::Other { message: e.to_string() })?,
                started_at: DateTime::parse_from_rfc3339(&started_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| LedgerError::Other { message: e.to_string() })?,
                finished_at: finished_at
                    .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                    .transpose()
                    .map_err(|e| LedgerError::Other { message: e.to_string() })?,
                duration_ms: row.get("duration_ms"),
                error: row.get("error"),
            })
        }
    }

    #[async_trait]
    impl LedgerStore for SqliteLedger {
        #[instrument(skip(self, entry), fields(run_id = %entry.run_id, node_id = %entry.node_id))]
        async fn append(&self, entry: LedgerEntry) -> Result<u64> {
            let sequence: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(sequence), -1) + 1 FROM ledger WHERE run_id = ?1",
            )
            .bind(entry.run_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend { message: format!("sequence alloc: {e}") })?;

            let input_json = serde_json::to_string(&entry.input).map_err(|e| LedgerError::Other { message: e.to_string() })?;

            sqlx::query(
                r#"
                INSERT INTO ledger (id, run_id, node_id, node_type, sequence, input_json, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(entry.id.to_string())
            .bind(entry.run_id.to_string())
            .bind(&entry.node_id)
            .bind(entry.node_type.encode())
            .bind(sequence)
            .bind(input_json)
            .bind(entry.started_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend { message: format!("insert: {e}") })?;

            Ok(sequence as u64)
        }

        async fn mark_completed(
            &self,
            id: Uuid,
            output: Value,
            tool_calls: Option<Value>,
            finished_at: DateTime<Utc>,
        ) -> Result<()> {
            let output_json = serde_json::to_string(&output).map_err(|e| LedgerError::Other { message: e.to_string() })?;
            let tool_calls_json = tool_calls
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| LedgerError::Other { message: e.to_string() })?;

            let started_at: String = sqlx::query_scalar("SELECT started_at FROM ledger WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Backend { message: format!("lookup: {e}") })?
                .ok_or(LedgerError::NotFound(id))?;
            let started_at = DateTime::parse_from_rfc3339(&started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| LedgerError::Other { message: e.to_string() })?;
            let duration_ms = (finished_at - started_at).num_milliseconds();

            sqlx::query(
                r#"
                UPDATE ledger
                SET output_json = ?1, tool_calls_json = ?2, finished_at = ?3, duration_ms = ?4
                WHERE id = ?5
                "#,
            )
            .bind(output_json)
            .bind(tool_calls_json)
            .bind(finished_at.to_rfc3339())
            .bind(duration_ms)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend { message: format!("update: {e}") })?;
            Ok(())
        }

        async fn mark_failed(&self, id: Uuid, error: String, finished_at: DateTime<Utc>) -> Result<()> {
            let started_at: String = sqlx::query_scalar("SELECT started_at FROM ledger WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Backend { message: format!("lookup: {e}") })?
                .ok_or(LedgerError::NotFound(id))?;
            let started_at = DateTime::parse_from_rfc3339(&started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| LedgerError::Other { message: e.to_string() })?;
            let duration_ms = (finished_at - started_at).num_milliseconds();

            sqlx::query(
                r#"UPDATE ledger SET error = ?1, finished_at = ?2, duration_ms = ?3 WHERE id = ?4"#,
            )
            .bind(error)
            .bind(finished_at.to_rfc3339())
            .bind(duration_ms)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend { message: format!("update: {e}") })?;
            Ok(())
        }

        async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<LedgerEntry>> {
            let rows = sqlx::query("SELECT * FROM ledger WHERE run_id = ?1 ORDER BY sequence ASC")
                .bind(run_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| LedgerError::Backend { message: format!("select: {e}") })?;
            rows.iter().map(Self::row_to_entry).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_assigns_monotonic_sequence() {
        let store = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let first = LedgerEntry::start(run_id, "start", NodeType::Start, 0, json!({}));
        let second = LedgerEntry::start(run_id, "agent", NodeType::Agent, 0, json!({}));
        let seq0 = store.append(first).await.unwrap();
        let seq1 = store.append(second).await.unwrap();
        assert_eq!(seq0, 0);
        assert_eq!(seq1, 1);
    }

    #[tokio::test]
    async fn mark_completed_sets_output_once() {
        let store = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let entry = LedgerEntry::start(run_id, "start", NodeType::Start, 0, json!({"a": 1}));
        let id = entry.id;
        store.append(entry).await.unwrap();
        store.mark_completed(id, json!({"a": 1}), None, Utc::now()).await.unwrap();
        let rows = store.list_for_run(run_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].output, Some(json!({"a": 1})));
        assert!(rows[0].duration_ms.unwrap() >= 0);
    }

    #[tokio::test]
    async fn list_for_run_is_sequence_ordered() {
        let store = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        for node_id in ["start", "agent", "end"] {
            store
                .append(LedgerEntry::start(run_id, node_id, NodeType::Agent, 0, json!({})))
                .await
                .unwrap();
        }
        let rows = store.list_for_run(run_id).await.unwrap();
        let sequences: Vec<u64> = rows.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }
}
