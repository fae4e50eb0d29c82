//! Run and approval-gate state (spec §3, §4.8).
//!
//! Grounded on the same in-memory/SQLite split as [`crate::ledger`], which
//! itself follows the teacher's `runtimes::checkpointer` session-store shape.

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

/// A run's lifecycle status (spec §3). Transitions monotonically except the
/// single `awaiting_approval → running` edge taken on resume (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
}

/// One execution of a workflow against a specific initial input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub initial_input: Value,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, initial_input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Running,
            initial_input,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Exists only while a run is suspended at a `user_approval` node (spec §3).
/// `run_id` is the key: at most one pending approval per run at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: Uuid,
    pub node_id: String,
    pub message: String,
    pub pending_input: Value,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("run {0} not found")]
    #[diagnostic(code(workflow_engine::run::not_found))]
    NotFound(Uuid),

    #[error("no pending approval for run {0}")]
    #[diagnostic(
        code(workflow_engine::run::no_approval),
        help("The run may already have been resumed, or never suspended.")
    )]
    NoPendingApproval(Uuid),

    /// Spec §4.8: resuming an already-resumed approval is a user error, not
    /// an engine failure — surfaced as 409, never as `run_failed`.
    #[error("run {0} was already resumed")]
    #[diagnostic(code(workflow_engine::run::already_resumed))]
    AlreadyResumed(Uuid),

    #[error("run backend error: {message}")]
    #[diagnostic(code(workflow_engine::run::backend))]
    Backend { message: String },
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Durable store of [`Run`] rows and their at-most-one [`ApprovalRequest`].
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: Run) -> Result<()>;
    async fn get(&self, run_id: Uuid) -> Result<Run>;
    async fn set_status(&self, run_id: Uuid, status: RunStatus, finished_at: Option<DateTime<Utc>>) -> Result<()>;
    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Run>>;

    /// Create the single pending approval for a run. Spec §4.8: the suspend
    /// path writes this alongside setting status to `awaiting_approval`.
    async fn create_approval(&self, approval: ApprovalRequest) -> Result<()>;
    async fn get_approval(&self, run_id: Uuid) -> Result<Option<ApprovalRequest>>;

    /// Atomically consume the pending approval, returning it. `Err(AlreadyResumed)`
    /// if none exists (spec §4.8 idempotency: a second resume call fails this way).
    async fn take_approval(&self, run_id: Uuid) -> Result<ApprovalRequest>;
}

struct RunRow {
    run: Run,
    approval: Option<ApprovalRequest>,
}

/// In-process run store, suitable for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<FxHashMap<Uuid, RunRow>>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    #[instrument(skip(self, run), fields(run_id = %run.id, workflow_id = %run.workflow_id))]
    async fn create(&self, run: Run) -> Result<()> {
        self.runs.write().insert(run.id, RunRow { run, approval: None });
        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> Result<Run> {
        self.runs
            .read()
            .get(&run_id)
            .map(|row| row.run.clone())
            .ok_or(RunError::NotFound(run_id))
    }

    async fn set_status(&self, run_id: Uuid, status: RunStatus, finished_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut runs = self.runs.write();
        let row = runs.get_mut(&run_id).ok_or(RunError::NotFound(run_id))?;
        row.run.status = status;
        if finished_at.is_some() {
            row.run.finished_at = finished_at;
        }
        Ok(())
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Run>> {
        Ok(self
            .runs
            .read()
            .values()
            .filter(|row| row.run.workflow_id == workflow_id)
            .map(|row| row.run.clone())
            .collect())
    }

    async fn create_approval(&self, approval: ApprovalRequest) -> Result<()> {
        let mut runs = self.runs.write();
        let row = runs.get_mut(&approval.run_id).ok_or(RunError::NotFound(approval.run_id))?;
        row.approval = Some(approval);
        Ok(())
    }

    async fn get_approval(&self, run_id: Uuid) -> Result<Option<ApprovalRequest>> {
        Ok(self.runs.read().get(&run_id).and_then(|row| row.approval.clone()))
    }

    async fn take_approval(&self, run_id: Uuid) -> Result<ApprovalRequest> {
        let mut runs = self.runs.write();
        let row = runs.get_mut(&run_id).ok_or(RunError::NotFound(run_id))?;
        row.approval.take().ok_or(RunError::AlreadyResumed(run_id))
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite-backed run/approval store, mirroring [`super::InMemoryRunStore`]'s
    //! contract over the `runs`/`approvals` tables (spec §6).

    use super::{ApprovalRequest, Run, RunError, RunStatus, RunStore, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::{Row, SqlitePool};
    use std::str::FromStr;
    use tracing::instrument;
    use uuid::Uuid;

    pub struct SqliteRunStore {
        pool: SqlitePool,
    }

    impl SqliteRunStore {
        #[instrument(skip(database_url))]
        pub async fn connect(database_url: &str) -> Result<Self> {
            let pool = SqlitePool::connect(database_url)
                .await
                .map_err(|e| RunError::Backend { message: format!("connect: {e}") })?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    workflow_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    initial_input_json TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    finished_at TEXT
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(|e| RunError::Backend { message: format!("create runs table: {e}") })?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS approvals (
                    run_id TEXT PRIMARY KEY,
                    node_id TEXT NOT NULL,
                    message TEXT NOT NULL,
                    pending_input_json TEXT NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(|e| RunError::Backend { message: format!("create approvals table: {e}") })?;
            Ok(Self { pool })
        }

        fn status_str(status: RunStatus) -> &'static str {
            match status {
                RunStatus::Running => "running",
                RunStatus::AwaitingApproval => "awaiting_approval",
                RunStatus::Completed => "completed",
                RunStatus::Failed => "failed",
            }
        }

        fn status_from_str(s: &str) -> Result<RunStatus> {
            match s {
                "running" => Ok(RunStatus::Running),
                "awaiting_approval" => Ok(RunStatus::AwaitingApproval),
                "completed" => Ok(RunStatus::Completed),
                "failed" => Ok(RunStatus::Failed),
                other => Err(RunError::Backend { message: format!("unknown status {other}") }),
            }
        }
    }

    #[async_trait]
    impl RunStore for SqliteRunStore {
        #[instrument(skip(self, run), fields(run_id = %run.id, workflow_id = %run.workflow_id))]
        async fn create(&self, run: Run) -> Result<()> {
            let input_json =
                serde_json::to_string(&run.initial_input).map_err(|e| RunError::Backend { message: e.to_string() })?;
            sqlx::query(
                r#"
                INSERT INTO runs (id, workflow_id, status, initial_input_json, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(run.id.to_string())
            .bind(&run.workflow_id)
            .bind(Self::status_str(run.status))
            .bind(input_json)
            .bind(run.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Backend { message: format!("insert run: {e}") })?;
            Ok(())
        }

        async fn get(&self, run_id: Uuid) -> Result<Run> {
            let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RunError::Backend { message: format!("select run: {e}") })?
                .ok_or(RunError::NotFound(run_id))?;

            let started_at: String = row.get("started_at");
            let finished_at: Option<String> = row.get("finished_at");
            let status: String = row.get("status");
            let input_json: String = row.get("initial_input_json");

            Ok(Run {
                id: run_id,
                workflow_id: row.get("workflow_id"),
                status: Self::status_from_str(&status)?,
                initial_input: serde_json::from_str(&input_json).map_err(|e| RunError::Backend { message: e.to_string() })?,
                created_at: DateTime::parse_from_rfc3339(&started_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| RunError::Backend { message: e.to_string() })?,
                finished_at: finished_at
                    .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                    .transpose()
                    .map_err(|e| RunError::Backend { message: e.to_string() })?,
            })
        }

        async fn set_status(&self, run_id: Uuid, status: RunStatus, finished_at: Option<DateTime<Utc>>) -> Result<()> {
            let result = sqlx::query("UPDATE runs SET status = ?1, finished_at = COALESCE(?2, finished_at) WHERE id = ?3")
                .bind(Self::status_str(status))
                .bind(finished_at.map(|dt| dt.to_rfc3339()))
                .bind(run_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| RunError::Backend { message: format!("update run: {e}") })?;
            if result.rows_affected() == 0 {
                return Err(RunError::NotFound(run_id));
            }
            Ok(())
        }

        async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Run>> {
            let rows = sqlx::query("SELECT id FROM runs WHERE workflow_id = ?1")
                .bind(workflow_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RunError::Backend { message: format!("select runs: {e}") })?;
            let mut runs = Vec::with_capacity(rows.len());
            for row in rows {
                let id_str: String = row.get("id");
                let id = Uuid::from_str(&id_str).map_err(|e| RunError::Backend { message: e.to_string() })?;
                runs.push(self.get(id).await?);
            }
            Ok(runs)
        }

        async fn create_approval(&self, approval: ApprovalRequest) -> Result<()> {
            let input_json = serde_json::to_string(&approval.pending_input)
                .map_err(|e| RunError::Backend { message: e.to_string() })?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO approvals (run_id, node_id, message, pending_input_json)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(approval.run_id.to_string())
            .bind(&approval.node_id)
            .bind(&approval.message)
            .bind(input_json)
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Backend { message: format!("insert approval: {e}") })?;
            Ok(())
        }

        async fn get_approval(&self, run_id: Uuid) -> Result<Option<ApprovalRequest>> {
            let row = sqlx::query("SELECT * FROM approvals WHERE run_id = ?1")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RunError::Backend { message: format!("select approval: {e}") })?;
            let Some(row) = row else { return Ok(None) };
            let input_json: String = row.get("pending_input_json");
            Ok(Some(ApprovalRequest {
                run_id,
                node_id: row.get("node_id"),
                message: row.get("message"),
                pending_input: serde_json::from_str(&input_json).map_err(|e| RunError::Backend { message: e.to_string() })?,
            }))
        }

        async fn take_approval(&self, run_id: Uuid) -> Result<ApprovalRequest> {
            let approval = self.get_approval(run_id).await?.ok_or(RunError::AlreadyResumed(run_id))?;
            sqlx::query("DELETE FROM approvals WHERE run_id = ?1")
                .bind(run_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| RunError::Backend { message: format!("delete approval: {e}") })?;
            Ok(approval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn approval_round_trip_leaves_none_pending() {
        let store = InMemoryRunStore::new();
        let run = Run::new("wf-1", json!({"x": 1}));
        let run_id = run.id;
        store.create(run).await.unwrap();
        store
            .create_approval(ApprovalRequest {
                run_id,
                node_id: "gate".into(),
                message: "Proceed?".into(),
                pending_input: json!({"x": 1}),
            })
            .await
            .unwrap();

        assert!(store.get_approval(run_id).await.unwrap().is_some());
        store.take_approval(run_id).await.unwrap();
        assert!(store.get_approval(run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_resume_fails_as_already_resumed() {
        let store = InMemoryRunStore::new();
        let run = Run::new("wf-1", json!({}));
        let run_id = run.id;
        store.create(run).await.unwrap();
        store
            .create_approval(ApprovalRequest {
                run_id,
                node_id: "gate".into(),
                message: "Proceed?".into(),
                pending_input: json!({}),
            })
            .await
            .unwrap();

        store.take_approval(run_id).await.unwrap();
        let second = store.take_approval(run_id).await;
        assert!(matches!(second, Err(RunError::AlreadyResumed(_))));
    }
}
