//! Whole-checklist results built from the per-field validators: the
//! validation map over visible steps, the submit check, and the error index.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use checklist_types::{
    ChecklistError, ResponseMap, Step, ValidationMap, VisibilityMap,
};

use crate::validators::{is_absent, validate_field};

/// Run the field validators over visible steps only.
pub fn compute_validation_map(
    steps: &[Step],
    responses: &ResponseMap,
    visibility: &VisibilityMap,
    now: DateTime<Utc>,
) -> ValidationMap {
    steps
        .iter()
        .filter(|step| visibility.get(&step.id).copied().unwrap_or(false))
        .map(|step| (step.id, validate_field(responses.get(&step.id), step, now)))
        .collect()
}

/// Result of checking whether a checklist can be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCheck {
    pub can_submit: bool,
    /// Visible required steps with no answer.
    pub missing: Vec<u32>,
    /// Visible required steps whose answer failed validation.
    pub invalid: Vec<u32>,
}

impl SubmitCheck {
    /// Every blocking step id, in ascending order.
    pub fn blocking(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.missing.iter().chain(&self.invalid).copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Check every visible required step. Hidden or optional steps never block.
/// All steps are inspected so the result names every blocker.
pub fn check_submission(
    steps: &[Step],
    responses: &ResponseMap,
    visibility: &VisibilityMap,
    validation: &ValidationMap,
) -> SubmitCheck {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for step in steps {
        let visible = visibility.get(&step.id).copied().unwrap_or(false);
        if !visible || !step.required {
            continue;
        }
        if is_absent(responses.get(&step.id)) {
            missing.push(step.id);
        }
        if validation.get(&step.id).is_some_and(|v| !v.is_valid) {
            invalid.push(step.id);
        }
    }

    SubmitCheck {
        can_submit: missing.is_empty() && invalid.is_empty(),
        missing,
        invalid,
    }
}

pub fn can_submit(
    steps: &[Step],
    responses: &ResponseMap,
    visibility: &VisibilityMap,
    validation: &ValidationMap,
) -> bool {
    check_submission(steps, responses, visibility, validation).can_submit
}

/// Like [`check_submission`], but an unsubmittable checklist is an error.
pub fn enforce_submittable(
    steps: &[Step],
    responses: &ResponseMap,
    visibility: &VisibilityMap,
    validation: &ValidationMap,
) -> Result<SubmitCheck, ChecklistError> {
    let check = check_submission(steps, responses, visibility, validation);
    if !check.can_submit {
        return Err(ChecklistError::NotSubmittable {
            blocking: check.blocking(),
        });
    }
    Ok(check)
}

/// Errors to display, keyed by step id. Valid steps are omitted.
pub fn error_index(validation: &ValidationMap) -> BTreeMap<u32, Vec<String>> {
    validation
        .iter()
        .filter(|(_, v)| !v.is_valid)
        .map(|(id, v)| (*id, v.errors.clone()))
        .collect()
}
