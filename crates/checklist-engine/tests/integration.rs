//! End-to-end tests for the checklist engine.
//!
//! Each test drives the full flow: load or build a document -> lint -> run a
//! session -> snapshot -> resume or review.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use checklist_engine::{
    build_task, lint_or_raise, Assignment, AssignmentStatus, ChecklistPackage, ExecutionSession,
    FixedClock, Priority, ReviewDecision, Severity, StepDraft, TaskDraft,
};
use checklist_types::{ChecklistDocument, ChecklistError, FieldType};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(now()))
}

fn shift_checklist() -> ChecklistDocument {
    ChecklistDocument::from_json(
        r#"{
            "nombre": "Ronda de Turno",
            "objetivo": "Verificar el área antes del relevo",
            "pasos": [
                { "id": 1, "descripcion": "Turno", "tipo_campo": "select",
                  "obligatorio": true, "valores": ["Día", "Noche"] },
                { "id": 2, "descripcion": "Estado de la iluminación", "tipo_campo": "texto",
                  "obligatorio": true, "validacion": { "max_len": 40 },
                  "condicional": { "cuando": { "paso_id": 1, "igual_a": "Noche" } } },
                { "id": 3, "descripcion": "Fecha de inspección", "tipo_campo": "fecha",
                  "obligatorio": true, "validacion": { "no_futuras": true } },
                { "id": 4, "descripcion": "Firma del operador", "tipo_campo": "firma",
                  "obligatorio": true }
            ]
        }"#,
    )
    .expect("shift checklist should parse")
}

// ---------------------------------------------------------------------------
// Scenario: conditional step follows the controlling answer
// ---------------------------------------------------------------------------

#[test]
fn night_shift_step_follows_controlling_answer() {
    let doc = shift_checklist();
    lint_or_raise(&doc).expect("document should lint clean");

    let mut session = ExecutionSession::new(doc, clock());
    session.set_response(3, json!("2026-10-16")).unwrap();
    session.set_response(4, json!("data:image/png;base64,AAAA")).unwrap();

    session.set_response(1, json!("Día")).unwrap();
    assert_eq!(session.visibility().get(&2), Some(&false));
    assert!(session.can_submit(), "day shift should be complete: {:?}", session.submit_check());

    session.set_response(1, json!("Noche")).unwrap();
    assert_eq!(session.visibility().get(&2), Some(&true));
    assert!(session.response(2).is_none());
    assert!(!session.can_submit());
    assert_eq!(session.submit_check().missing, vec![2]);

    session.set_response(2, json!("Todas las lámparas operativas")).unwrap();
    assert!(session.can_submit());

    // Back to day: the night answer is purged, not hidden.
    session.set_response(1, json!("Día")).unwrap();
    assert!(session.response(2).is_none());
    session.set_response(1, json!("Noche")).unwrap();
    assert!(!session.can_submit());
}

#[test]
fn future_date_blocks_submission() {
    let mut session = ExecutionSession::new(shift_checklist(), clock());
    session
        .apply_responses([
            (1, json!("Día")),
            (3, json!("2026-10-17")),
            (4, json!("firma")),
        ])
        .unwrap();

    let check = session.submit_check();
    assert_eq!(check.invalid, vec![3]);
    assert_eq!(
        session.error_index()[&3],
        vec!["Future dates are not allowed".to_string()]
    );

    // "now" itself is not in the future.
    session.set_response(3, json!(now().to_rfc3339())).unwrap();
    assert!(session.can_submit());
}

// ---------------------------------------------------------------------------
// Snapshot, persist shape, resume
// ---------------------------------------------------------------------------

#[test]
fn snapshot_and_resume_round_trip() {
    let mut session = ExecutionSession::new(shift_checklist(), clock());
    session
        .apply_responses([(1, json!("Noche")), (2, json!("OK")), (3, json!("2026-10-15"))])
        .unwrap();

    let execution = session.snapshot("a1", "ana@example.com");
    let wire = serde_json::to_value(&execution).unwrap();
    assert_eq!(wire["assignmentId"], "a1");
    assert_eq!(wire["respuestas"][3]["pasoId"], 4);
    assert_eq!(wire["respuestas"][3]["valor"], Value::Null);
    assert_eq!(wire["respuestas"][3]["valido"], false);
    assert_eq!(
        wire["respuestas"][3]["errores"],
        json!(["A signature is required"])
    );

    let resumed = ExecutionSession::resume(shift_checklist(), &execution, clock());
    assert_eq!(resumed.responses(), session.responses());
    assert_eq!(resumed.visibility(), session.visibility());
}

#[test]
fn resume_ignores_hidden_rows() {
    let mut session = ExecutionSession::new(shift_checklist(), clock());
    session.set_response(1, json!("Día")).unwrap();
    let mut execution = session.snapshot("a1", "ana@example.com");

    // A tampered row claims a value for the hidden step.
    execution.respuestas[1].valor = json!("stale");
    let resumed = ExecutionSession::resume(shift_checklist(), &execution, clock());
    assert!(resumed.response(2).is_none());
}

// ---------------------------------------------------------------------------
// Fractional rule values
// ---------------------------------------------------------------------------

#[test]
fn fractional_limits_load_and_apply() {
    let doc = ChecklistDocument::from_json(
        r#"{
            "nombre": "Códigos",
            "pasos": [
                { "id": 1, "descripcion": "Código corto", "tipo_campo": "texto",
                  "validacion": { "max_len": 2.5 } },
                { "id": 2, "descripcion": "Última calibración", "tipo_campo": "fecha",
                  "validacion": { "max_antiguedad_dias": 30.5 } }
            ]
        }"#,
    )
    .expect("fractional limits should parse");

    let mut session = ExecutionSession::new(doc, clock());
    session.set_response(1, json!("abc")).unwrap();
    assert!(!session.validation()[&1u32].is_valid);
    assert_eq!(session.submit_check().invalid, vec![1]);

    session.set_response(1, json!("ab")).unwrap();
    session.set_response(2, json!("2026-09-16")).unwrap();
    assert!(session.can_submit());
}

// ---------------------------------------------------------------------------
// Builder -> session
// ---------------------------------------------------------------------------

#[test]
fn built_task_runs_in_a_session() {
    let mut hay_fuga = StepDraft::new("¿Hay fuga?", FieldType::Select);
    hay_fuga.obligatorio = true;
    hay_fuga.opciones_texto = "Sí\nNo".into();

    let mut caudal = StepDraft::new("Caudal estimado", FieldType::Number);
    caudal.obligatorio = true;
    caudal.numero_min = "0".into();
    caudal.numero_max = "50".into();
    caudal.condicion_activa = true;
    caudal.condicion_paso_id = "1".into();
    caudal.condicion_valor = "Sí".into();

    let task = build_task(
        &TaskDraft {
            nombre: "Revisión de Bombas".into(),
            descripcion: "Chequeo semanal".into(),
            pasos: vec![hay_fuga, caudal],
        },
        "supervisor@example.com",
        now(),
    )
    .expect("draft should build");

    let doc = task.to_checklist();
    let diags = lint_or_raise(&doc).expect("built documents lint clean");
    assert!(diags.iter().all(|d| d.severity != Severity::Error));

    let mut session = ExecutionSession::new(doc, clock());
    session.set_response(1, json!("Sí")).unwrap();
    session.set_response(2, json!("75")).unwrap();
    assert_eq!(session.submit_check().invalid, vec![2]);

    session.set_response(2, json!(12.5)).unwrap();
    assert!(session.can_submit());
}

#[test]
fn builder_rejects_inverted_range_with_step_number() {
    let mut presion = StepDraft::new("Presión", FieldType::Number);
    presion.numero_min = "10".into();
    presion.numero_max = "5".into();

    let err = build_task(
        &TaskDraft {
            nombre: "Rango".into(),
            descripcion: String::new(),
            pasos: vec![StepDraft::new("Operador", FieldType::Text), presion],
        },
        "x@example.com",
        now(),
    )
    .unwrap_err();

    match err {
        ChecklistError::Build { step, message } => {
            assert_eq!(step, 2);
            assert_eq!(message, "The minimum cannot be greater than the maximum in step 2.");
        }
        other => panic!("expected Build error, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Catalog -> assignment -> review
// ---------------------------------------------------------------------------

#[test]
fn assignment_review_cycle() {
    let package = ChecklistPackage {
        checklists: vec![shift_checklist()],
    };
    let doc = package
        .find_by_slug("ronda-de-turno")
        .cloned()
        .expect("checklist in catalog");

    let mut assignment = Assignment::new(
        "a1",
        &doc,
        "ana@example.com",
        now() + Duration::days(2),
        Priority::Medium,
        "supervisor@example.com",
        now(),
    );

    let mut session = ExecutionSession::new(doc, clock());
    session.set_response(1, json!("Día")).unwrap();
    assignment.record_progress("e1").unwrap();
    assert_eq!(assignment.estado, AssignmentStatus::InProgress);

    let err = assignment.submit("e1", &session.submit_check()).unwrap_err();
    assert!(matches!(err, ChecklistError::NotSubmittable { .. }));

    session
        .apply_responses([(3, json!("2026-10-16")), (4, json!("firma"))])
        .unwrap();
    assignment.submit("e1", &session.submit_check()).unwrap();

    assignment
        .review(
            Some(ReviewDecision::Reject),
            "Falta detalle",
            true,
            "supervisor@example.com",
            now(),
        )
        .unwrap();
    assert_eq!(assignment.estado, AssignmentStatus::InProgress);
    assert_eq!(assignment.rechazos.len(), 1);

    assignment.submit("e2", &session.submit_check()).unwrap();
    assignment
        .review(
            Some(ReviewDecision::Approve),
            "",
            true,
            "supervisor@example.com",
            now(),
        )
        .unwrap();
    assert_eq!(assignment.estado, AssignmentStatus::Approved);
    assert!(!assignment.is_overdue(now() + Duration::days(10)));
}
