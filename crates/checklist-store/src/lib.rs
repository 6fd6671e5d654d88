//! Persistence for checklist executions and assignments.
//!
//! The engine is synchronous and never touches storage; callers hand it a
//! document and save what it produces through an [`ExecutionStore`]. Two
//! implementations are provided: [`FileStore`] keeps one JSON file per record
//! under a root directory, [`MemoryStore`] keeps everything in process.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use checklist_engine::Assignment;
use checklist_types::{ChecklistError, Execution, Result};

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist an execution and return its id. A missing id is filled with a
    /// fresh UUID; an existing id overwrites the stored record.
    async fn save_execution(&self, execution: &mut Execution) -> Result<String>;

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;

    /// Executions of one assignment, oldest first.
    async fn list_executions_by_assignment(&self, assignment_id: &str) -> Result<Vec<Execution>>;

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>>;

    /// All assignments, oldest first.
    async fn list_assignments(&self) -> Result<Vec<Assignment>>;

    async fn require_execution(&self, id: &str) -> Result<Execution> {
        self.get_execution(id).await?.ok_or_else(|| not_found("execution", id))
    }

    async fn require_assignment(&self, id: &str) -> Result<Assignment> {
        self.get_assignment(id).await?.ok_or_else(|| not_found("assignment", id))
    }
}

fn not_found(kind: &str, id: &str) -> ChecklistError {
    ChecklistError::NotFound {
        kind: kind.into(),
        id: id.into(),
    }
}

/// Fill in a missing execution id.
fn ensure_execution_id(execution: &mut Execution) -> String {
    execution
        .id
        .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
        .clone()
}

fn sort_executions(executions: &mut [Execution]) {
    executions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

fn sort_assignments(assignments: &mut [Assignment]) {
    assignments.sort_by(|a, b| {
        a.fecha_creacion
            .cmp(&b.fecha_creacion)
            .then_with(|| a.id.cmp(&b.id))
    });
}
