//! Read-only access to authored `Workflow` snapshots (spec §3, §4.1 step 1).
//!
//! Graph authoring itself (CRUD of workflows/nodes/edges) is out of scope
//! (spec §1); this store is the engine's read seam onto whatever owns that
//! authoring surface. Grounded on the same trait-object store idiom as
//! [`crate::ledger`]/[`crate::run`], reduced to a single `get` — the engine
//! only ever needs to fetch a node by `(workflow_id, node_id)` at dequeue
//! time (spec §9: "new definitions take effect" — no snapshot is cached
//! across job boundaries).

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::model::Workflow;

/// Read access to workflow definitions. The engine loop calls `get` once per
/// dequeued job, so an edit made mid-run is visible to the very next job for
/// that run (spec §9 open question 2).
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, workflow_id: &str) -> Option<Workflow>;
}

/// In-process workflow store, suitable for tests and single-process
/// deployments, or as the read side of an authoring layer that writes here
/// directly.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<FxHashMap<String, Workflow>>,
}

impl InMemoryWorkflowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workflow: Workflow) {
        self.workflows.write().insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows.read().get(workflow_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowBuilder;
    use crate::types::NodeType;

    #[tokio::test]
    async fn stores_and_fetches_by_id() {
        let store = InMemoryWorkflowStore::new();
        let wf = WorkflowBuilder::new("wf-1", "owner", "demo")
            .node("start", NodeType::Start)
            .node("end", NodeType::End)
            .edge("e1", "start", "end")
            .build();
        store.insert(wf);

        let fetched = store.get("wf-1").await.unwrap();
        assert_eq!(fetched.id, "wf-1");
        assert!(store.get("missing").await.is_none());
    }
}
