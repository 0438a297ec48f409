//! Workflow document lookup.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::WorkflowDefinition;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("workflow '{0}' not found")]
    NotFound(String),
}

/// Read side of the persisted workflow collection.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find(&self, name: &str) -> Result<WorkflowDefinition, StoreError>;
}

/// Workflows held in process memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow.
    pub fn save(&self, workflow: WorkflowDefinition) {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.name.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn find(&self, name: &str) -> Result<WorkflowDefinition, StoreError> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(name: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn saved_workflows_can_be_found_by_name() {
        let store = MemoryWorkflowStore::new();
        store.save(workflow("release"));

        assert_eq!(store.find("release").await.unwrap().name, "release");
        assert_eq!(
            store.find("rollback").await,
            Err(StoreError::NotFound("rollback".into()))
        );
    }
}
