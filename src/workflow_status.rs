//! Workflow Status Store — C15.
//!
//! The only persistence the human-controlled workflow (C11) touches. Deliberately stores nothing
//! but a status tag and a timestamp — never the objective string, which is always re-supplied by
//! the caller (§4.11, §4.15).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// The phase a human-controlled workflow run is currently in (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    PreVerification,
    PostVerification,
    PostVerificationTodoRefinement,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::PreVerification => "pre-verification",
            WorkflowStatus::PostVerification => "post-verification",
            WorkflowStatus::PostVerificationTodoRefinement => "post-verification-todo-refinement",
            WorkflowStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pre-verification" => Some(WorkflowStatus::PreVerification),
            "post-verification" => Some(WorkflowStatus::PostVerification),
            "post-verification-todo-refinement" => Some(WorkflowStatus::PostVerificationTodoRefinement),
            "completed" => Some(WorkflowStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowStatusRecord {
    pub status: WorkflowStatus,
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary for workflow phase transitions. Implementations must not store the
/// objective string — only `status` and `updated_at` (§4.15).
#[async_trait]
pub trait WorkflowStatusStore: Send + Sync {
    async fn get(&self, workflow_id: &str) -> Option<WorkflowStatusRecord>;
    async fn set(&self, workflow_id: &str, status: WorkflowStatus);
}

/// In-memory reference implementation backing local runs and tests.
#[derive(Default)]
pub struct InMemoryWorkflowStatusStore {
    statuses: RwLock<HashMap<String, WorkflowStatusRecord>>,
}

impl InMemoryWorkflowStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStatusStore for InMemoryWorkflowStatusStore {
    async fn get(&self, workflow_id: &str) -> Option<WorkflowStatusRecord> {
        self.statuses.read().await.get(workflow_id).cloned()
    }

    async fn set(&self, workflow_id: &str, status: WorkflowStatus) {
        self.statuses.write().await.insert(
            workflow_id.to_string(),
            WorkflowStatusRecord {
                status,
                updated_at: Utc::now(),
            },
        );
    }
}
