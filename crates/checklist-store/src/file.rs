//! JSON-file store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/executions/<id>.json
//! <root>/assignments/<id>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use checklist_engine::Assignment;
use checklist_types::{ChecklistError, Execution, Result};

use crate::{ensure_execution_id, sort_assignments, sort_executions, ExecutionStore};

const EXECUTIONS_DIR: &str = "executions";
const ASSIGNMENTS_DIR: &str = "assignments";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, dir: &str, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(dir).join(format!("{id}.json")))
    }

    async fn write_record<T: Serialize + Sync>(&self, dir: &str, id: &str, record: &T) -> Result<()> {
        let path = self.record_path(dir, id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!(path = %path.display(), "Record saved");
        Ok(())
    }

    async fn read_record<T: DeserializeOwned>(&self, dir: &str, id: &str) -> Result<Option<T>> {
        let path = self.record_path(dir, id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn read_all<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>> {
        let dir = self.root.join(dir);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                }
            }
        }
        Ok(records)
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ChecklistError::Other(format!("invalid record id '{id}'")))
    }
}

#[async_trait]
impl ExecutionStore for FileStore {
    async fn save_execution(&self, execution: &mut Execution) -> Result<String> {
        let id = ensure_execution_id(execution);
        self.write_record(EXECUTIONS_DIR, &id, execution).await?;
        tracing::info!(execution = %id, assignment = %execution.assignment_id, "Execution saved");
        Ok(id)
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        self.read_record(EXECUTIONS_DIR, id).await
    }

    async fn list_executions_by_assignment(&self, assignment_id: &str) -> Result<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .read_all(EXECUTIONS_DIR)
            .await?
            .into_iter()
            .filter(|e: &Execution| e.assignment_id == assignment_id)
            .collect();
        sort_executions(&mut executions);
        Ok(executions)
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.write_record(ASSIGNMENTS_DIR, &assignment.id, assignment).await?;
        tracing::info!(assignment = %assignment.id, status = %assignment.estado, "Assignment saved");
        Ok(())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        self.read_record(ASSIGNMENTS_DIR, id).await
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> = self.read_all(ASSIGNMENTS_DIR).await?;
        sort_assignments(&mut assignments);
        Ok(assignments)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
