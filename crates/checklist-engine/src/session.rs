//! One user's in-memory run of a checklist.
//!
//! The session owns the response map and keeps the derived maps current:
//! every mutation recomputes visibility, purges hidden answers and re-runs the
//! validators over what is left visible. Nothing is patched incrementally.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use checklist_types::{
    ChecklistDocument, ChecklistError, Execution, ExecutionEntry, FieldKind, FieldValidation,
    ResponseMap, Result, Step, ValidationMap, VisibilityMap,
};

use crate::aggregate::{check_submission, compute_validation_map, error_index, SubmitCheck};
use crate::clock::{Clock, SystemClock};
use crate::lint::lint;
use crate::reconcile::reconcile;
use crate::visibility::dependents_of;

pub struct ExecutionSession {
    document: ChecklistDocument,
    responses: ResponseMap,
    visibility: VisibilityMap,
    validation: ValidationMap,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("checklist", &self.document.name)
            .field("responses", &self.responses)
            .finish_non_exhaustive()
    }
}

impl ExecutionSession {
    /// Start an empty session.
    pub fn new(document: ChecklistDocument, clock: Arc<dyn Clock>) -> Self {
        warn_duplicate_ids(&document);
        let mut session = Self {
            document,
            responses: ResponseMap::new(),
            visibility: VisibilityMap::new(),
            validation: ValidationMap::new(),
            clock,
        };
        session.refresh();
        session
    }

    pub fn with_system_clock(document: ChecklistDocument) -> Self {
        Self::new(document, Arc::new(SystemClock))
    }

    /// Continue from a saved execution. Only rows recorded as visible with a
    /// value are restored; rows for ids the document no longer has are dropped.
    pub fn resume(document: ChecklistDocument, prior: &Execution, clock: Arc<dyn Clock>) -> Self {
        warn_duplicate_ids(&document);
        let mut responses = prior.hydrate_responses();
        responses.retain(|id, _| document.step(*id).is_some());
        debug!(
            checklist = %document.name,
            restored = responses.len(),
            "resuming execution"
        );

        let mut session = Self {
            document,
            responses,
            visibility: VisibilityMap::new(),
            validation: ValidationMap::new(),
            clock,
        };
        session.refresh();
        session
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Record an answer. `Value::Null` clears the step instead. Checkbox steps
    /// also take a boolean: `true` stores the step's checked value and `false`
    /// clears it.
    pub fn set_response(&mut self, step_id: u32, value: Value) -> Result<()> {
        self.ensure_step(step_id)?;
        self.store_answer(step_id, value);
        let dependents = dependents_of(&self.document.steps, step_id);
        if !dependents.is_empty() {
            debug!(step_id, ?dependents, "answer controls conditional steps");
        }
        self.refresh();
        Ok(())
    }

    pub fn clear_response(&mut self, step_id: u32) -> Result<()> {
        self.ensure_step(step_id)?;
        self.responses.remove(&step_id);
        self.refresh();
        Ok(())
    }

    /// Apply several answers in order, recomputing once at the end. Stops at
    /// the first unknown step id without applying anything.
    pub fn apply_responses<I>(&mut self, answers: I) -> Result<()>
    where
        I: IntoIterator<Item = (u32, Value)>,
    {
        let answers: Vec<(u32, Value)> = answers.into_iter().collect();
        for (step_id, _) in &answers {
            self.ensure_step(*step_id)?;
        }
        for (step_id, value) in answers {
            self.store_answer(step_id, value);
        }
        self.refresh();
        Ok(())
    }

    fn store_answer(&mut self, step_id: u32, value: Value) {
        let value = match (self.document.step(step_id), value) {
            (Some(step), Value::Bool(checked)) if matches!(step.kind, FieldKind::Checkbox { .. }) => {
                if checked {
                    Value::String(step.checked_value().to_string())
                } else {
                    Value::Null
                }
            }
            (_, value) => value,
        };
        if value.is_null() {
            self.responses.remove(&step_id);
        } else {
            self.responses.insert(step_id, value);
        }
    }

    /// Recompute visibility, purge hidden answers and re-validate.
    pub fn refresh(&mut self) {
        let reconciliation = reconcile(&self.document.steps, &mut self.responses);
        if !reconciliation.purged.is_empty() {
            debug!(purged = ?reconciliation.purged, "discarded answers of hidden steps");
        }
        self.visibility = reconciliation.visibility;
        self.validation = compute_validation_map(
            &self.document.steps,
            &self.responses,
            &self.visibility,
            self.clock.now(),
        );
        debug!(
            visible = self.visibility.values().filter(|v| **v).count(),
            invalid = self.validation.values().filter(|v| !v.is_valid).count(),
            "recomputed checklist state"
        );
    }

    fn ensure_step(&self, step_id: u32) -> Result<()> {
        if self.document.step(step_id).is_none() {
            return Err(ChecklistError::UnknownStep(step_id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn document(&self) -> &ChecklistDocument {
        &self.document
    }

    pub fn responses(&self) -> &ResponseMap {
        &self.responses
    }

    pub fn response(&self, step_id: u32) -> Option<&Value> {
        self.responses.get(&step_id)
    }

    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    pub fn validation(&self) -> &ValidationMap {
        &self.validation
    }

    pub fn is_visible(&self, step_id: u32) -> bool {
        self.visibility.get(&step_id).copied().unwrap_or(false)
    }

    /// Visible steps in document order.
    pub fn visible_steps(&self) -> Vec<&Step> {
        self.document
            .steps
            .iter()
            .filter(|step| self.is_visible(step.id))
            .collect()
    }

    pub fn submit_check(&self) -> SubmitCheck {
        check_submission(
            &self.document.steps,
            &self.responses,
            &self.visibility,
            &self.validation,
        )
    }

    pub fn can_submit(&self) -> bool {
        self.submit_check().can_submit
    }

    pub fn error_index(&self) -> std::collections::BTreeMap<u32, Vec<String>> {
        error_index(&self.validation)
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    /// Flatten the current state into an [`Execution`], one row per step in
    /// document order, stamped with the session clock. The id is left for the
    /// store to assign.
    pub fn snapshot(&self, assignment_id: &str, user: &str) -> Execution {
        let respuestas = self
            .document
            .steps
            .iter()
            .map(|step| {
                let visible = self.is_visible(step.id);
                let verdict = if visible {
                    self.validation.get(&step.id).cloned().unwrap_or_default()
                } else {
                    FieldValidation::valid()
                };
                let valor = if visible {
                    self.responses.get(&step.id).cloned().unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                ExecutionEntry {
                    paso_id: step.id,
                    valor,
                    valido: verdict.is_valid,
                    errores: verdict.errors,
                    visible,
                }
            })
            .collect();

        Execution {
            id: None,
            assignment_id: assignment_id.to_string(),
            checklist: self.document.name.clone(),
            timestamp: self.clock.now().timestamp_millis(),
            user: user.to_string(),
            respuestas,
        }
    }
}

/// Later steps sharing an id are unreachable through the response map.
fn warn_duplicate_ids(document: &ChecklistDocument) {
    for diagnostic in lint(document)
        .into_iter()
        .filter(|d| d.rule == "unique_step_ids")
    {
        warn!(
            checklist = %document.name,
            step_id = ?diagnostic.step_id,
            "{}",
            diagnostic.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use checklist_types::{FieldKind, NumberRules, TextRules};
    use serde_json::json;

    use crate::clock::FixedClock;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    fn document() -> ChecklistDocument {
        ChecklistDocument {
            name: "Inspección de pozo".into(),
            objective: "Verificar condiciones".into(),
            steps: vec![
                Step::new(
                    1,
                    "Turno",
                    FieldKind::Select {
                        options: vec!["Día".into(), "Noche".into()],
                    },
                )
                .required(),
                Step::new(2, "Iluminación", FieldKind::Text(TextRules::default()))
                    .when(1, "Noche")
                    .required(),
                Step::new(
                    3,
                    "Presión",
                    FieldKind::Number(NumberRules {
                        min: Some(0.0),
                        max: Some(100.0),
                    }),
                ),
            ],
        }
    }

    fn session() -> ExecutionSession {
        ExecutionSession::new(document(), Arc::new(FixedClock(now())))
    }

    #[test]
    fn new_session_computes_initial_state() {
        let s = session();
        assert!(s.is_visible(1));
        assert!(!s.is_visible(2));
        assert!(!s.can_submit());
        assert_eq!(s.submit_check().missing, vec![1]);
    }

    #[test]
    fn switching_condition_purges_dependent_answer() {
        let mut s = session();
        s.set_response(1, json!("Noche")).unwrap();
        s.set_response(2, json!("Lámparas OK")).unwrap();
        assert!(s.can_submit());

        s.set_response(1, json!("Día")).unwrap();
        assert!(!s.is_visible(2));
        assert!(s.response(2).is_none());
        assert!(!s.validation().contains_key(&2));

        // Re-showing starts empty.
        s.set_response(1, json!("Noche")).unwrap();
        assert!(s.is_visible(2));
        assert!(s.response(2).is_none());
        assert!(!s.can_submit());
    }

    #[test]
    fn null_clears_the_answer() {
        let mut s = session();
        s.set_response(3, json!(50)).unwrap();
        s.set_response(3, Value::Null).unwrap();
        assert!(s.response(3).is_none());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let mut s = session();
        let err = s.set_response(42, json!("x")).unwrap_err();
        assert!(matches!(err, ChecklistError::UnknownStep(42)));
        assert!(s.clear_response(42).is_err());
    }

    #[test]
    fn apply_responses_is_all_or_nothing() {
        let mut s = session();
        let err = s
            .apply_responses([(1, json!("Día")), (9, json!("x"))])
            .unwrap_err();
        assert!(matches!(err, ChecklistError::UnknownStep(9)));
        assert!(s.responses().is_empty());

        s.apply_responses([(1, json!("Noche")), (2, json!("ok"))]).unwrap();
        assert!(s.can_submit());
    }

    #[test]
    fn error_index_reflects_invalid_answers() {
        let mut s = session();
        s.set_response(3, json!(150)).unwrap();
        let index = s.error_index();
        assert_eq!(
            index[&3],
            vec!["Value must be less than or equal to 100".to_string()]
        );
    }

    #[test]
    fn snapshot_flattens_in_step_order() {
        let mut s = session();
        s.set_response(1, json!("Día")).unwrap();
        s.set_response(3, json!(0)).unwrap();

        let execution = s.snapshot("a1", "ana@example.com");
        assert_eq!(execution.id, None);
        assert_eq!(execution.checklist, "Inspección de pozo");
        assert_eq!(execution.timestamp, now().timestamp_millis());

        let ids: Vec<u32> = execution.respuestas.iter().map(|e| e.paso_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let hidden = &execution.respuestas[1];
        assert!(!hidden.visible);
        assert!(hidden.valor.is_null());
        assert!(hidden.valido);

        // Falsy values survive.
        assert_eq!(execution.respuestas[2].valor, json!(0));
    }

    #[test]
    fn resume_restores_visible_answers_only() {
        let mut s = session();
        s.apply_responses([(1, json!("Noche")), (2, json!("Focos")), (3, json!(12))])
            .unwrap();
        let mut saved = s.snapshot("a1", "ana@example.com");
        saved.respuestas[2].visible = false;

        let resumed = ExecutionSession::resume(document(), &saved, Arc::new(FixedClock(now())));
        assert_eq!(resumed.response(1), Some(&json!("Noche")));
        assert_eq!(resumed.response(2), Some(&json!("Focos")));
        assert!(resumed.response(3).is_none());
        assert!(resumed.can_submit());
    }

    #[test]
    fn snapshot_is_stamped_by_session_clock() {
        let later = now() + chrono::Duration::hours(3);
        let s = ExecutionSession::new(document(), Arc::new(FixedClock(later)));
        let execution = s.snapshot("a1", "ana@example.com");
        assert_eq!(execution.timestamp, later.timestamp_millis());
    }

    #[test]
    fn checkbox_booleans_store_checked_value() {
        let doc = ChecklistDocument {
            name: "EPP".into(),
            objective: String::new(),
            steps: vec![
                Step::new(1, "Casco", FieldKind::Checkbox { options: vec![] }).required(),
                Step::new(
                    2,
                    "Guantes",
                    FieldKind::Checkbox {
                        options: vec!["Usa guantes".into()],
                    },
                ),
            ],
        };
        let mut s = ExecutionSession::new(doc, Arc::new(FixedClock(now())));
        s.apply_responses([(1, json!(true)), (2, json!(true))]).unwrap();
        assert_eq!(s.response(1), Some(&json!("Seleccionado")));
        assert_eq!(s.response(2), Some(&json!("Usa guantes")));
        assert!(s.can_submit());

        s.set_response(1, json!(false)).unwrap();
        assert!(s.response(1).is_none());
        assert_eq!(s.submit_check().missing, vec![1]);
    }

    #[test]
    fn booleans_on_other_fields_are_stored_as_given() {
        let mut s = session();
        s.set_response(3, json!(true)).unwrap();
        assert_eq!(s.response(3), Some(&json!(true)));
    }

    #[test]
    fn duplicate_ids_still_open_a_session() {
        let mut doc = document();
        doc.steps.push(Step::new(3, "Presión repetida", FieldKind::Text(TextRules::default())));
        let mut s = ExecutionSession::new(doc, Arc::new(FixedClock(now())));
        s.set_response(3, json!(50)).unwrap();
        assert_eq!(s.response(3), Some(&json!(50)));
        assert_eq!(s.snapshot("a1", "ana@example.com").respuestas.len(), 4);
    }
}
