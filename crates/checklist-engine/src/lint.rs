//! Document lint: advisory rules and diagnostics.
//!
//! Documents produced by the builder are well-formed by construction. Catalog
//! files and hand-edited JSON are not, so [`lint`] reports structural problems
//! and [`lint_or_raise`] fails on any `Error`-severity finding. The runtime
//! resolver never depends on lint having run.

use std::collections::HashSet;

use checklist_types::{ChecklistDocument, ChecklistError, FieldKind, Step};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub step_id: Option<u32>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        })
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic>;
}

fn diagnostic(
    rule: &dyn LintRule,
    severity: Severity,
    step_id: Option<u32>,
    message: String,
    fix: Option<&str>,
) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity,
        message,
        step_id,
        fix: fix.map(Into::into),
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct UniqueStepIdsRule;
impl LintRule for UniqueStepIdsRule {
    fn name(&self) -> &str { "unique_step_ids" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        let mut diags = Vec::new();
        for step in &document.steps {
            if step.id == 0 {
                diags.push(diagnostic(
                    self,
                    Severity::Error,
                    None,
                    format!("Step '{}' has no id", step.description),
                    Some("Number steps from 1 in document order"),
                ));
            } else if !seen.insert(step.id) {
                diags.push(diagnostic(
                    self,
                    Severity::Error,
                    Some(step.id),
                    format!("Step id {} is used more than once", step.id),
                    Some("Give every step a distinct id"),
                ));
            }
        }
        diags
    }
}

struct ConditionTargetPriorRule;
impl LintRule for ConditionTargetPriorRule {
    fn name(&self) -> &str { "condition_target_prior" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        let mut earlier = HashSet::new();
        let mut diags = Vec::new();
        for step in &document.steps {
            if let Some(condition) = &step.condition {
                let known = document.step(condition.step_id).is_some();
                if !known {
                    diags.push(diagnostic(
                        self,
                        Severity::Error,
                        Some(step.id),
                        format!(
                            "Step {} depends on step {}, which does not exist",
                            step.id, condition.step_id
                        ),
                        Some("Point the condition at an earlier step"),
                    ));
                } else if condition.step_id >= step.id || !earlier.contains(&condition.step_id) {
                    diags.push(diagnostic(
                        self,
                        Severity::Error,
                        Some(step.id),
                        format!(
                            "Step {} depends on step {}, which does not come before it",
                            step.id, condition.step_id
                        ),
                        Some("Conditions may only reference earlier steps"),
                    ));
                }
            }
            earlier.insert(step.id);
        }
        diags
    }
}

struct OptionsPresentRule;
impl LintRule for OptionsPresentRule {
    fn name(&self) -> &str { "options_present" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        document
            .steps
            .iter()
            .filter_map(|step| match &step.kind {
                FieldKind::Select { options } if options.is_empty() => Some(diagnostic(
                    self,
                    Severity::Warning,
                    Some(step.id),
                    format!("Select step {} has no options; any answer is accepted", step.id),
                    Some("Add a 'valores' list"),
                )),
                _ => None,
            })
            .collect()
    }
}

struct GroupFieldsRule;
impl LintRule for GroupFieldsRule {
    fn name(&self) -> &str { "group_fields" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for step in &document.steps {
            let FieldKind::Group { fields } = &step.kind else {
                continue;
            };
            match fields {
                None => diags.push(diagnostic(
                    self,
                    Severity::Error,
                    Some(step.id),
                    format!("Group step {} has no 'campos'; it can never be valid", step.id),
                    Some("Add the sub-field definitions under 'campos'"),
                )),
                Some(fields) => {
                    let mut keys = HashSet::new();
                    for field in fields {
                        if !keys.insert(field.key()) {
                            diags.push(diagnostic(
                                self,
                                Severity::Error,
                                Some(step.id),
                                format!(
                                    "Group step {} has two sub-fields keyed '{}'",
                                    step.id,
                                    field.key()
                                ),
                                Some("Give each sub-field a distinct 'nombre'"),
                            ));
                        }
                        if matches!(field.kind, FieldKind::Group { .. }) {
                            diags.push(diagnostic(
                                self,
                                Severity::Warning,
                                Some(step.id),
                                format!("Group step {} nests another group", step.id),
                                None,
                            ));
                        }
                    }
                }
            }
        }
        diags
    }
}

struct NumberRangeRule;
impl LintRule for NumberRangeRule {
    fn name(&self) -> &str { "number_range" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        all_steps(&document.steps)
            .filter_map(|step| match &step.kind {
                FieldKind::Number(rules) => match (rules.min, rules.max) {
                    (Some(min), Some(max)) if min > max => Some(diagnostic(
                        self,
                        Severity::Error,
                        Some(step.id),
                        format!(
                            "Step '{}' has min {min} greater than max {max}; no value can pass",
                            step.key()
                        ),
                        Some("Swap or correct the bounds"),
                    )),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

struct SupportedFieldTypeRule;
impl LintRule for SupportedFieldTypeRule {
    fn name(&self) -> &str { "supported_field_type" }
    fn apply(&self, document: &ChecklistDocument) -> Vec<Diagnostic> {
        all_steps(&document.steps)
            .filter_map(|step| match &step.kind {
                FieldKind::Unsupported(raw) => Some(diagnostic(
                    self,
                    Severity::Warning,
                    Some(step.id),
                    format!(
                        "Step '{}' has unknown field type '{raw}'; it will not be validated",
                        step.key()
                    ),
                    Some("Use one of: texto, numero, fecha, checkbox, select, foto, archivo, firma, grupo"),
                )),
                _ => None,
            })
            .collect()
    }
}

/// Top-level steps followed by the sub-fields of every group.
fn all_steps(steps: &[Step]) -> impl Iterator<Item = &Step> {
    steps.iter().flat_map(|step| {
        let nested: &[Step] = match &step.kind {
            FieldKind::Group { fields: Some(fields) } => fields,
            _ => &[],
        };
        std::iter::once(step).chain(nested.iter())
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all lint rules and return every diagnostic.
pub fn lint(document: &ChecklistDocument) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(UniqueStepIdsRule),
        Box::new(ConditionTargetPriorRule),
        Box::new(OptionsPresentRule),
        Box::new(GroupFieldsRule),
        Box::new(NumberRangeRule),
        Box::new(SupportedFieldTypeRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(document));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn lint_or_raise(document: &ChecklistDocument) -> checklist_types::Result<Vec<Diagnostic>> {
    let diagnostics = lint(document);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(ChecklistError::InvalidDocument(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ChecklistDocument {
        serde_json::from_value(value).unwrap()
    }

    fn has(diags: &[Diagnostic], rule: &str, severity: Severity) -> bool {
        diags.iter().any(|d| d.rule == rule && d.severity == severity)
    }

    #[test]
    fn valid_document_passes() {
        let doc = parse(json!({
            "nombre": "Inspección",
            "pasos": [
                { "id": 1, "descripcion": "Turno", "tipo_campo": "select", "valores": ["Día", "Noche"] },
                { "id": 2, "descripcion": "Luz", "tipo_campo": "texto",
                  "condicional": { "cuando": { "paso_id": 1, "igual_a": "Noche" } } }
            ]
        }));
        let diags = lint(&doc);
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
        assert!(lint_or_raise(&doc).is_ok());
    }

    #[test]
    fn duplicate_ids_error() {
        let doc = parse(json!({
            "nombre": "Dup",
            "pasos": [
                { "id": 1, "descripcion": "A", "tipo_campo": "texto" },
                { "id": 1, "descripcion": "B", "tipo_campo": "texto" }
            ]
        }));
        assert!(has(&lint(&doc), "unique_step_ids", Severity::Error));
    }

    #[test]
    fn forward_and_dangling_conditions_error() {
        let doc = parse(json!({
            "nombre": "Refs",
            "pasos": [
                { "id": 1, "descripcion": "A", "tipo_campo": "texto",
                  "condicional": { "cuando": { "paso_id": 2, "igual_a": "x" } } },
                { "id": 2, "descripcion": "B", "tipo_campo": "texto",
                  "condicional": { "cuando": { "paso_id": 9, "igual_a": "x" } } },
                { "id": 3, "descripcion": "C", "tipo_campo": "texto",
                  "condicional": { "cuando": { "paso_id": 3, "igual_a": "x" } } }
            ]
        }));
        let diags: Vec<_> = lint(&doc)
            .into_iter()
            .filter(|d| d.rule == "condition_target_prior")
            .collect();
        let ids: Vec<_> = diags.iter().filter_map(|d| d.step_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn select_without_options_warns() {
        let doc = parse(json!({
            "nombre": "Opc",
            "pasos": [{ "id": 1, "descripcion": "Estado", "tipo_campo": "select" }]
        }));
        let diags = lint(&doc);
        assert!(has(&diags, "options_present", Severity::Warning));
        assert!(lint_or_raise(&doc).is_ok());
    }

    #[test]
    fn group_without_fields_error() {
        let doc = parse(json!({
            "nombre": "Grupo",
            "pasos": [{ "id": 1, "descripcion": "Equipo", "tipo_campo": "grupo" }]
        }));
        assert!(has(&lint(&doc), "group_fields", Severity::Error));
    }

    #[test]
    fn inverted_range_in_group_subfield_error() {
        let doc = parse(json!({
            "nombre": "Rango",
            "pasos": [{
                "id": 1, "descripcion": "Medidas", "tipo_campo": "grupo",
                "campos": [
                    { "nombre": "temp", "descripcion": "Temperatura", "tipo_campo": "numero",
                      "validacion": { "min": 50, "max": 10 } }
                ]
            }]
        }));
        let diags = lint(&doc);
        let d = diags.iter().find(|d| d.rule == "number_range").unwrap();
        assert!(d.message.contains("temp"));
    }

    #[test]
    fn unknown_type_warns() {
        let doc = parse(json!({
            "nombre": "Tipos",
            "pasos": [{ "id": 1, "descripcion": "Mapa", "tipo_campo": "gps" }]
        }));
        let diags = lint(&doc);
        assert!(has(&diags, "supported_field_type", Severity::Warning));
    }

    #[test]
    fn lint_or_raise_joins_errors() {
        let doc = parse(json!({
            "nombre": "Mal",
            "pasos": [
                { "id": 1, "descripcion": "A", "tipo_campo": "grupo" },
                { "id": 1, "descripcion": "B", "tipo_campo": "texto" }
            ]
        }));
        let err = lint_or_raise(&doc).unwrap_err();
        match err {
            ChecklistError::InvalidDocument(msg) => {
                assert!(msg.contains("used more than once"));
                assert!(msg.contains("no 'campos'"));
            }
            other => panic!("expected InvalidDocument, got: {other:?}"),
        }
    }
}
