//! In-process store, for tests and one-shot runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use checklist_engine::Assignment;
use checklist_types::{Execution, Result};

use crate::{ensure_execution_id, sort_assignments, sort_executions, ExecutionStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    executions: RwLock<HashMap<String, Execution>>,
    assignments: RwLock<HashMap<String, Assignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn save_execution(&self, execution: &mut Execution) -> Result<String> {
        let id = ensure_execution_id(execution);
        self.executions
            .write()
            .await
            .insert(id.clone(), execution.clone());
        tracing::debug!(execution = %id, "Execution stored in memory");
        Ok(id)
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions_by_assignment(&self, assignment_id: &str) -> Result<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.assignment_id == assignment_id)
            .cloned()
            .collect();
        sort_executions(&mut executions);
        Ok(executions)
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.assignments
            .write()
            .await
            .insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        Ok(self.assignments.read().await.get(id).cloned())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> =
            self.assignments.read().await.values().cloned().collect();
        sort_assignments(&mut assignments);
        Ok(assignments)
    }
}
