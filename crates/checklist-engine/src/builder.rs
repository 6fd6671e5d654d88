//! Task/step definition builder.
//!
//! Turns what an author typed into a form (free-text options, numeric bounds as
//! strings, an optional condition) into the normalized step schema the runtime
//! consumes. The authoring gate is fail-fast: the first problem found, in step
//! order, aborts the build with a step-numbered message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use checklist_types::{
    slugify, ChecklistDocument, ChecklistError, FieldKind, FieldType, NumberRules, Result, Step,
    TextRules,
};

/// Author used when the caller does not know who is building the task.
pub const UNKNOWN_AUTHOR: &str = "supervisor@desconocido";

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// A task as entered in the authoring form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub pasos: Vec<StepDraft>,
}

/// One step as entered in the authoring form. Numeric inputs stay raw text
/// until the build so that bad input can be reported against its step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDraft {
    #[serde(default)]
    pub descripcion: String,
    #[serde(rename = "tipo_campo", default = "default_field_type")]
    pub tipo_campo: String,
    #[serde(default)]
    pub obligatorio: bool,
    /// One option per line.
    #[serde(default)]
    pub opciones_texto: String,
    #[serde(default, deserialize_with = "raw_text")]
    pub numero_min: String,
    #[serde(default, deserialize_with = "raw_text")]
    pub numero_max: String,
    #[serde(default, deserialize_with = "raw_text")]
    pub texto_max_len: String,
    #[serde(default)]
    pub condicion_activa: bool,
    /// 1-based position of the controlling step.
    #[serde(default, deserialize_with = "raw_text")]
    pub condicion_paso_id: String,
    #[serde(default)]
    pub condicion_valor: String,
}

fn default_field_type() -> String {
    FieldType::Text.as_str().to_string()
}

/// Accept either a JSON string or a JSON number for form inputs.
fn raw_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

impl Default for StepDraft {
    fn default() -> Self {
        Self {
            descripcion: String::new(),
            tipo_campo: default_field_type(),
            obligatorio: false,
            opciones_texto: String::new(),
            numero_min: String::new(),
            numero_max: String::new(),
            texto_max_len: String::new(),
            condicion_activa: false,
            condicion_paso_id: String::new(),
            condicion_valor: String::new(),
        }
    }
}

impl StepDraft {
    pub fn new(descripcion: impl Into<String>, tipo_campo: FieldType) -> Self {
        Self {
            descripcion: descripcion.into(),
            tipo_campo: tipo_campo.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Non-empty trimmed lines of the options box.
    pub fn options(&self) -> Vec<String> {
        self.opciones_texto
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TaskDocument
// ---------------------------------------------------------------------------

/// Builder output: a checklist plus authoring metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    pub slug: String,
    pub creado_por: String,
    pub fecha_creacion: DateTime<Utc>,
    pub pasos: Vec<Step>,
}

impl TaskDocument {
    /// The runtime view of this task. The description doubles as objective.
    pub fn to_checklist(&self) -> ChecklistDocument {
        ChecklistDocument {
            name: self.nombre.clone(),
            objective: self.descripcion.clone(),
            steps: self.pasos.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn build_error(step: usize, message: impl Into<String>) -> ChecklistError {
    ChecklistError::Build {
        step,
        message: message.into(),
    }
}

/// Parse an optional numeric input. Blank means unset.
fn parse_bound(raw: &str) -> Option<std::result::Result<f64, ()>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.parse::<f64>().ok().filter(|n| n.is_finite()).ok_or(()))
}

fn parse_max_len(raw: &str) -> Option<std::result::Result<f64, ()>> {
    parse_bound(raw).map(|parsed| parsed.and_then(|n| if n > 0.0 { Ok(n) } else { Err(()) }))
}

/// Resolve a step's field type. Groups cannot be authored from the form.
fn draft_field_type(draft: &StepDraft, number: usize) -> Result<FieldType> {
    let raw = draft.tipo_campo.trim();
    if raw.is_empty() {
        return Err(build_error(
            number,
            format!("Select a field type for step {number}."),
        ));
    }
    match raw.parse::<FieldType>() {
        Ok(FieldType::Group) | Err(_) => Err(build_error(
            number,
            format!("Field type '{raw}' cannot be used in step {number}."),
        )),
        Ok(field_type) => Ok(field_type),
    }
}

/// Check a draft without building it. Returns the first problem in step order.
pub fn validate_draft(draft: &TaskDraft) -> Result<()> {
    if draft.nombre.trim().is_empty() {
        return Err(build_error(0, "The task name is required."));
    }

    for (index, step) in draft.pasos.iter().enumerate() {
        let number = index + 1;

        if step.descripcion.trim().is_empty() {
            return Err(build_error(
                number,
                format!("The description of step {number} is required."),
            ));
        }

        let field_type = draft_field_type(step, number)?;

        if field_type.takes_options() && step.options().is_empty() {
            return Err(build_error(
                number,
                format!("Enter at least one option for step {number}."),
            ));
        }

        if field_type == FieldType::Number {
            let min = parse_bound(&step.numero_min);
            let max = parse_bound(&step.numero_max);
            if matches!(min, Some(Err(()))) {
                return Err(build_error(
                    number,
                    format!("The minimum value of step {number} must be numeric."),
                ));
            }
            if matches!(max, Some(Err(()))) {
                return Err(build_error(
                    number,
                    format!("The maximum value of step {number} must be numeric."),
                ));
            }
            if let (Some(Ok(min)), Some(Ok(max))) = (min, max) {
                if min > max {
                    return Err(build_error(
                        number,
                        format!("The minimum cannot be greater than the maximum in step {number}."),
                    ));
                }
            }
        }

        if field_type == FieldType::Text && matches!(parse_max_len(&step.texto_max_len), Some(Err(()))) {
            return Err(build_error(
                number,
                format!("The maximum length of step {number} must be a positive number."),
            ));
        }

        if step.condicion_activa {
            let reference = step.condicion_paso_id.trim();
            if reference.is_empty() {
                return Err(build_error(
                    number,
                    format!("Select the reference step for the condition of step {number}."),
                ));
            }
            if step.condicion_valor.trim().is_empty() {
                return Err(build_error(
                    number,
                    format!("Enter the required value for the condition of step {number}."),
                ));
            }
            match reference.parse::<usize>() {
                Ok(target) if target >= 1 && target < number => {}
                _ => {
                    return Err(build_error(
                        number,
                        format!("The condition of step {number} must reference a previous step."),
                    ));
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

fn build_step(draft: &StepDraft, number: usize) -> Result<Step> {
    let field_type = draft_field_type(draft, number)?;
    let kind = match field_type {
        FieldType::Text => FieldKind::Text(TextRules {
            max_len: parse_max_len(&draft.texto_max_len).and_then(|r| r.ok()),
        }),
        FieldType::Number => FieldKind::Number(NumberRules {
            min: parse_bound(&draft.numero_min).and_then(|r| r.ok()),
            max: parse_bound(&draft.numero_max).and_then(|r| r.ok()),
        }),
        FieldType::Date => FieldKind::Date(Default::default()),
        FieldType::Select => FieldKind::Select {
            options: draft.options(),
        },
        FieldType::Checkbox => FieldKind::Checkbox {
            options: draft.options(),
        },
        FieldType::Photo => FieldKind::Photo,
        FieldType::File => FieldKind::File,
        FieldType::Signature => FieldKind::Signature,
        FieldType::Group => {
            return Err(build_error(
                number,
                format!("Field type '{field_type}' cannot be used in step {number}."),
            ));
        }
    };

    let id = u32::try_from(number).map_err(|_| build_error(number, "Too many steps."))?;
    let mut step = Step::new(id, draft.descripcion.trim(), kind);
    step.required = draft.obligatorio;

    if draft.condicion_activa {
        let target = draft
            .condicion_paso_id
            .trim()
            .parse::<u32>()
            .map_err(|_| {
                build_error(
                    number,
                    format!("The condition of step {number} must reference a previous step."),
                )
            })?;
        step = step.when(target, draft.condicion_valor.trim());
    }

    Ok(step)
}

/// Validate and normalize a draft. Step ids are the 1-based positions.
pub fn build_task(draft: &TaskDraft, author: &str, now: DateTime<Utc>) -> Result<TaskDocument> {
    validate_draft(draft).inspect_err(|e| debug!(error = %e, "task draft rejected"))?;

    let pasos = draft
        .pasos
        .iter()
        .enumerate()
        .map(|(index, step)| build_step(step, index + 1))
        .collect::<Result<Vec<_>>>()?;

    let nombre = draft.nombre.trim().to_string();
    let author = author.trim();
    let task = TaskDocument {
        slug: slugify(&nombre),
        descripcion: draft.descripcion.trim().to_string(),
        creado_por: if author.is_empty() {
            UNKNOWN_AUTHOR.to_string()
        } else {
            author.to_string()
        },
        fecha_creacion: now,
        pasos,
        nombre,
    };

    info!(slug = %task.slug, steps = task.pasos.len(), "built task");
    Ok(task)
}
