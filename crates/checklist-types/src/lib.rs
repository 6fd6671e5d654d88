//! Shared types, errors, and execution records for the checklist engine.
//!
//! This crate provides the foundational types used across all other checklist crates:
//! - `ChecklistError`: unified error taxonomy
//! - `ChecklistDocument` / `Step` / `FieldKind`: the checklist schema
//! - `FieldValidation`: per-field verdict returned by validators
//! - `Execution`: serializable snapshot of one checklist run

pub mod document;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use document::{
    ChecklistDocument, Condition, DateRules, FieldKind, FieldType, NumberRules, Step, TextRules,
    CHECKBOX_DEFAULT_VALUE,
};

/// Unified error type for all checklist subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ChecklistError {
    // === Authoring Errors ===
    /// A fail-fast builder error. `step` is the 1-based step number, or 0 when
    /// the problem is in the task header.
    #[error("{message}")]
    Build { step: usize, message: String },

    // === Document Errors ===
    #[error("Checklist document is invalid: {0}")]
    InvalidDocument(String),

    #[error("Step {0} does not exist in this checklist")]
    UnknownStep(u32),

    // === Workflow Errors ===
    #[error("Checklist cannot be submitted: steps {} are missing or invalid", join_ids(.blocking))]
    NotSubmittable { blocking: Vec<u32> },

    #[error("Cannot {action} an assignment in status '{status}'")]
    InvalidTransition { action: String, status: String },

    #[error("Review incomplete: {0}")]
    ReviewIncomplete(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ChecklistError {
    /// Returns `true` for errors whose message is meant for the person filling
    /// in a form rather than for an operator.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ChecklistError::Build { .. }
                | ChecklistError::NotSubmittable { .. }
                | ChecklistError::ReviewIncomplete(_)
        )
    }

    /// Maps the error to a process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChecklistError::Build { .. } | ChecklistError::InvalidDocument(_) => 2,
            ChecklistError::NotSubmittable { .. } => 3,
            ChecklistError::InvalidTransition { .. } | ChecklistError::ReviewIncomplete(_) => 4,
            ChecklistError::NotFound { .. } => 5,
            _ => 1,
        }
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A convenience alias for `Result<T, ChecklistError>`.
pub type Result<T> = std::result::Result<T, ChecklistError>;

// ---------------------------------------------------------------------------
// Response and derived maps
// ---------------------------------------------------------------------------

/// Current answers keyed by step id. Values keep the shape the field produced.
pub type ResponseMap = BTreeMap<u32, serde_json::Value>;

/// Step id -> currently visible. Always recomputed as a whole.
pub type VisibilityMap = BTreeMap<u32, bool>;

/// Step id -> verdict, only for visible steps.
pub type ValidationMap = BTreeMap<u32, FieldValidation>;

// ---------------------------------------------------------------------------
// FieldValidation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Per-subfield verdicts, keyed by subfield name. Only groups fill this.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subfield_results: BTreeMap<String, FieldValidation>,
    /// Set when the field type is unknown and nothing was checked.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unsupported: bool,
}

impl FieldValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            subfield_results: BTreeMap::new(),
            unsupported: false,
        }
    }

    /// Valid when `errors` is empty, invalid otherwise.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            subfield_results: BTreeMap::new(),
            unsupported: false,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self::from_errors(vec![error.into()])
    }

    /// Sentinel for field types the engine cannot check. Never blocks.
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::valid()
        }
    }
}

impl Default for FieldValidation {
    fn default() -> Self {
        Self::valid()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assignment_id: String,
    /// Name of the checklist that was executed.
    pub checklist: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub user: String,
    pub respuestas: Vec<ExecutionEntry>,
}

/// One flattened row of an [`Execution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEntry {
    pub paso_id: u32,
    #[serde(default)]
    pub valor: serde_json::Value,
    #[serde(default = "default_true")]
    pub valido: bool,
    #[serde(default)]
    pub errores: Vec<String>,
    #[serde(default)]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

impl Execution {
    /// Responses to resume from: only entries recorded as visible with a
    /// non-null value.
    pub fn hydrate_responses(&self) -> ResponseMap {
        self.respuestas
            .iter()
            .filter(|entry| entry.visible && !entry.valor.is_null())
            .map(|entry| (entry.paso_id, entry.valor.clone()))
            .collect()
    }

    /// Number of rows that were visible and invalid when the snapshot was taken.
    pub fn invalid_count(&self) -> usize {
        self.respuestas
            .iter()
            .filter(|entry| entry.visible && !entry.valido)
            .count()
    }

    pub fn recorded_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// slugify
// ---------------------------------------------------------------------------

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-]+").expect("static non-word pattern"));
static HYPHEN_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("static hyphen pattern"));

/// Catalog slug: lowercase, whitespace runs to `-`, non-word characters
/// dropped, hyphen runs collapsed.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    let stripped = NON_WORD.replace_all(&hyphenated, "");
    HYPHEN_RUNS.replace_all(&stripped, "-").into_owned()
}
