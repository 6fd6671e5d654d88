//! Assignment review lifecycle.
//!
//! ```text
//! Asignada --progress--> En ejecución --submit--> Enviada --approve--> Aprobada
//!                             ^                      |
//!                             +-------reject---------+
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use checklist_types::{ChecklistDocument, ChecklistError, Result};

use crate::aggregate::SubmitCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    #[serde(rename = "Asignada")]
    Assigned,
    #[serde(rename = "En ejecución", alias = "En ejecucion")]
    InProgress,
    #[serde(rename = "Enviada", alias = "En revisión", alias = "En revision")]
    Submitted,
    #[serde(rename = "Aprobada")]
    Approved,
    #[serde(rename = "Rechazada")]
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "Asignada",
            AssignmentStatus::InProgress => "En ejecución",
            AssignmentStatus::Submitted => "Enviada",
            AssignmentStatus::Approved => "Aprobada",
            AssignmentStatus::Rejected => "Rechazada",
        }
    }

    /// Statuses in which the assignee may fill in the checklist.
    pub fn is_executable(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Assigned | AssignmentStatus::InProgress | AssignmentStatus::Rejected
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "Alta", alias = "alta")]
    High,
    #[default]
    #[serde(rename = "Media", alias = "media")]
    Medium,
    #[serde(rename = "Baja", alias = "baja")]
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "Alta",
            Priority::Medium => "Media",
            Priority::Low => "Baja",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub fecha: DateTime<Utc>,
    pub comentarios: String,
    pub revisor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// A checklist delegated to one collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub checklist_slug: String,
    pub checklist_nombre: String,
    pub asignado_a: String,
    pub fecha_vencimiento: DateTime<Utc>,
    #[serde(default)]
    pub prioridad: Priority,
    #[serde(default)]
    pub notas: String,
    pub creado_por: String,
    pub fecha_creacion: DateTime<Utc>,
    pub estado: AssignmentStatus,
    #[serde(default)]
    pub rechazos: Vec<Rejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_id: Option<String>,
}

impl Assignment {
    pub fn new(
        id: impl Into<String>,
        checklist: &ChecklistDocument,
        assignee: impl Into<String>,
        due: DateTime<Utc>,
        priority: Priority,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            checklist_slug: checklist.slug(),
            checklist_nombre: checklist.name.clone(),
            asignado_a: assignee.into(),
            fecha_vencimiento: due,
            prioridad: priority,
            notas: String::new(),
            creado_por: created_by.into(),
            fecha_creacion: now,
            estado: AssignmentStatus::Assigned,
            rechazos: Vec::new(),
            last_execution_id: None,
        }
    }

    /// Email comparison is case-insensitive.
    pub fn is_assigned_to(&self, email: &str) -> bool {
        self.asignado_a.eq_ignore_ascii_case(email.trim())
    }

    fn transition_error(&self, action: &str) -> ChecklistError {
        ChecklistError::InvalidTransition {
            action: action.into(),
            status: self.estado.to_string(),
        }
    }

    /// A progress save. The first one moves the assignment into execution.
    pub fn record_progress(&mut self, execution_id: &str) -> Result<()> {
        if !self.estado.is_executable() {
            return Err(self.transition_error("save progress on"));
        }
        self.last_execution_id = Some(execution_id.to_string());
        if self.estado == AssignmentStatus::Assigned {
            self.estado = AssignmentStatus::InProgress;
        }
        Ok(())
    }

    /// Hand the execution over for review. `check` must come from the same
    /// session that produced `execution_id`.
    pub fn submit(&mut self, execution_id: &str, check: &SubmitCheck) -> Result<()> {
        if !self.estado.is_executable() {
            return Err(self.transition_error("submit"));
        }
        if !check.can_submit {
            return Err(ChecklistError::NotSubmittable {
                blocking: check.blocking(),
            });
        }
        self.last_execution_id = Some(execution_id.to_string());
        self.estado = AssignmentStatus::Submitted;
        info!(assignment = %self.id, execution = execution_id, "assignment submitted");
        Ok(())
    }

    /// Apply a supervisor's decision to a submitted assignment.
    pub fn review(
        &mut self,
        decision: Option<ReviewDecision>,
        comments: &str,
        signature_confirmed: bool,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.estado != AssignmentStatus::Submitted {
            return Err(self.transition_error("review"));
        }
        if self.last_execution_id.is_none() {
            return Err(ChecklistError::ReviewIncomplete(
                "the assignment has no associated execution".into(),
            ));
        }
        let Some(decision) = decision else {
            return Err(ChecklistError::ReviewIncomplete(
                "a decision must be selected".into(),
            ));
        };
        let comments = comments.trim();
        if decision == ReviewDecision::Reject && comments.is_empty() {
            return Err(ChecklistError::ReviewIncomplete(
                "comments are required to reject an execution".into(),
            ));
        }
        if !signature_confirmed {
            return Err(ChecklistError::ReviewIncomplete(
                "the decision must be confirmed with a signature".into(),
            ));
        }

        match decision {
            ReviewDecision::Approve => {
                self.estado = AssignmentStatus::Approved;
            }
            ReviewDecision::Reject => {
                self.rechazos.push(Rejection {
                    fecha: now,
                    comentarios: comments.to_string(),
                    revisor: reviewer.to_string(),
                });
                self.estado = AssignmentStatus::InProgress;
            }
        }
        info!(assignment = %self.id, status = %self.estado, reviewer, "assignment reviewed");
        Ok(())
    }

    /// Due before the start of `now`'s day and not yet approved.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        self.estado != AssignmentStatus::Approved && self.fecha_vencimiento < start_of_day
    }
}
