//! Conditional checklist evaluation engine.
//!
//! Given a checklist document and a partial response map this crate computes
//! which steps are visible, whether each visible answer is valid, and whether
//! the checklist can be submitted. It also carries the authoring builder that
//! produces documents, document lint, the catalog lookup, and the assignment
//! review lifecycle. Everything here is synchronous.

pub mod aggregate;
pub mod assignment;
pub mod builder;
pub mod catalog;
pub mod clock;
pub mod lint;
pub mod reconcile;
pub mod session;
pub mod validators;
pub mod visibility;

pub use aggregate::{
    can_submit, check_submission, compute_validation_map, enforce_submittable, error_index,
    SubmitCheck,
};
pub use assignment::{Assignment, AssignmentStatus, Priority, Rejection, ReviewDecision};
pub use builder::{build_task, validate_draft, StepDraft, TaskDocument, TaskDraft};
pub use catalog::ChecklistPackage;
pub use clock::{Clock, FixedClock, SystemClock};
pub use lint::{lint, lint_or_raise, Diagnostic, LintRule, Severity};
pub use reconcile::{reconcile, Reconciliation};
pub use session::ExecutionSession;
pub use validators::validate_field;
pub use visibility::{
    compute_visibility_map, dependents_of, evaluate_condition, is_step_visible, visible_steps,
};
