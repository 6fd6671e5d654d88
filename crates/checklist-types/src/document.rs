//! Checklist document schema.
//!
//! The on-disk shape keeps the keys authored by supervisors (`nombre`, `pasos`,
//! `tipo_campo`, `validacion`, `condicional.cuando`, ...). In memory each
//! [`Step`] carries a [`FieldKind`] whose variant owns exactly the rules and
//! options that apply to it, so the validator dispatch is an exhaustive match.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{slugify, ChecklistError, Result};

/// Value stored by a checked checkbox whose step declares no options.
pub const CHECKBOX_DEFAULT_VALUE: &str = "Seleccionado";

// ---------------------------------------------------------------------------
// ChecklistDocument
// ---------------------------------------------------------------------------

/// An immutable checklist definition: a name, an objective and ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistDocument {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "objetivo", default)]
    pub objective: String,
    #[serde(rename = "pasos", default)]
    pub steps: Vec<Step>,
}

impl ChecklistDocument {
    /// Catalog identity derived from the name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Look up a top-level step by id.
    pub fn step(&self, id: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a document from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Serialize this document to pretty JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FieldType (`tipo_campo`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "texto")]
    Text,
    #[serde(rename = "numero")]
    Number,
    #[serde(rename = "fecha")]
    Date,
    #[serde(rename = "checkbox")]
    Checkbox,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "foto")]
    Photo,
    #[serde(rename = "archivo")]
    File,
    #[serde(rename = "firma")]
    Signature,
    #[serde(rename = "grupo")]
    Group,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "texto",
            FieldType::Number => "numero",
            FieldType::Date => "fecha",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::Photo => "foto",
            FieldType::File => "archivo",
            FieldType::Signature => "firma",
            FieldType::Group => "grupo",
        }
    }

    /// Select and checkbox steps draw their values from an option list.
    pub fn takes_options(self) -> bool {
        matches!(self, FieldType::Select | FieldType::Checkbox)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ChecklistError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "texto" => Ok(FieldType::Text),
            "numero" => Ok(FieldType::Number),
            "fecha" => Ok(FieldType::Date),
            "checkbox" => Ok(FieldType::Checkbox),
            "select" => Ok(FieldType::Select),
            "foto" => Ok(FieldType::Photo),
            "archivo" => Ok(FieldType::File),
            "firma" => Ok(FieldType::Signature),
            "grupo" => Ok(FieldType::Group),
            other => Err(ChecklistError::Other(format!("unknown field type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-type rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumberRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextRules {
    /// Maximum length in characters. Fractional limits are allowed.
    pub max_len: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRules {
    /// Reject dates later than the evaluation instant.
    pub no_future: bool,
    /// Reject dates older than this many days before the evaluation instant.
    pub max_age_days: Option<f64>,
}

/// Field type plus the payload that only makes sense for that type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text(TextRules),
    Number(NumberRules),
    Date(DateRules),
    Checkbox { options: Vec<String> },
    Select { options: Vec<String> },
    Photo,
    File,
    Signature,
    /// `fields` is `None` when the document omits `campos` entirely.
    Group { fields: Option<Vec<Step>> },
    /// A `tipo_campo` this engine does not know. Carries the raw name.
    Unsupported(String),
}

impl FieldKind {
    /// The discriminant, or `None` for [`FieldKind::Unsupported`].
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldKind::Text(_) => Some(FieldType::Text),
            FieldKind::Number(_) => Some(FieldType::Number),
            FieldKind::Date(_) => Some(FieldType::Date),
            FieldKind::Checkbox { .. } => Some(FieldType::Checkbox),
            FieldKind::Select { .. } => Some(FieldType::Select),
            FieldKind::Photo => Some(FieldType::Photo),
            FieldKind::File => Some(FieldType::File),
            FieldKind::Signature => Some(FieldType::Signature),
            FieldKind::Group { .. } => Some(FieldType::Group),
            FieldKind::Unsupported(_) => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            FieldKind::Unsupported(raw) => raw,
            other => other.field_type().map(FieldType::as_str).unwrap_or_default(),
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            FieldKind::Checkbox { options } | FieldKind::Select { options } => options,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Visibility rule: show the step only when step `step_id` was answered with
/// exactly `equals`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub step_id: u32,
    pub equals: String,
}

/// One question of a checklist. Group sub-fields are also `Step`s, keyed by
/// `name` rather than `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepDef", into = "StepDef")]
pub struct Step {
    pub id: u32,
    pub name: Option<String>,
    pub description: String,
    pub required: bool,
    pub unit: Option<String>,
    pub condition: Option<Condition>,
    pub kind: FieldKind,
}

impl Step {
    pub fn new(id: u32, description: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id,
            name: None,
            description: description.into(),
            required: false,
            unit: None,
            condition: None,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn when(mut self, step_id: u32, equals: impl Into<String>) -> Self {
        self.condition = Some(Condition {
            step_id,
            equals: equals.into(),
        });
        self
    }

    /// Key used for this step inside a group value map.
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.description)
    }

    /// The value a checked checkbox records.
    pub fn checked_value(&self) -> &str {
        self.kind
            .options()
            .first()
            .map(String::as_str)
            .unwrap_or(CHECKBOX_DEFAULT_VALUE)
    }
}

// --- Wire representation ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StepDef {
    #[serde(default, skip_serializing_if = "is_zero")]
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nombre: Option<String>,
    #[serde(default)]
    descripcion: String,
    #[serde(default)]
    tipo_campo: String,
    #[serde(default)]
    obligatorio: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unidad: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    valores: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validacion: Option<RulesDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condicional: Option<ConditionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    campos: Option<Vec<Step>>,
}

/// Rule values that are not usable numbers are dropped rather than failing
/// the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RulesDef {
    #[serde(
        default,
        deserialize_with = "lenient_number",
        serialize_with = "compact_number",
        skip_serializing_if = "Option::is_none"
    )]
    min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        serialize_with = "compact_number",
        skip_serializing_if = "Option::is_none"
    )]
    max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        serialize_with = "compact_number",
        skip_serializing_if = "Option::is_none"
    )]
    max_len: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    no_futuras: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        serialize_with = "compact_number",
        skip_serializing_if = "Option::is_none"
    )]
    max_antiguedad_dias: Option<f64>,
}

/// Numbers and numeric strings; anything else reads as unset.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(serde_json::Value::deserialize(deserializer)?.as_bool())
}

/// Whole numbers are written without a fractional part.
fn compact_number<S>(value: &Option<f64>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    const EXACT: f64 = 9_007_199_254_740_992.0;
    match value {
        Some(n) if n.fract() == 0.0 && n.abs() < EXACT => serializer.serialize_some(&(*n as i64)),
        Some(n) => serializer.serialize_some(n),
        None => serializer.serialize_none(),
    }
}

impl RulesDef {
    fn into_option(self) -> Option<Self> {
        (self != RulesDef::default()).then_some(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConditionDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cuando: Option<WhenDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WhenDef {
    paso_id: u32,
    igual_a: String,
}

fn is_zero(id: &u32) -> bool {
    *id == 0
}

impl From<StepDef> for Step {
    fn from(def: StepDef) -> Self {
        let rules = def.validacion.unwrap_or_default();
        let options = def.valores.unwrap_or_default();
        let kind = match def.tipo_campo.parse::<FieldType>() {
            Ok(FieldType::Text) => FieldKind::Text(TextRules {
                max_len: rules.max_len,
            }),
            Ok(FieldType::Number) => FieldKind::Number(NumberRules {
                min: rules.min,
                max: rules.max,
            }),
            Ok(FieldType::Date) => FieldKind::Date(DateRules {
                no_future: rules.no_futuras.unwrap_or(false),
                max_age_days: rules.max_antiguedad_dias,
            }),
            Ok(FieldType::Checkbox) => FieldKind::Checkbox { options },
            Ok(FieldType::Select) => FieldKind::Select { options },
            Ok(FieldType::Photo) => FieldKind::Photo,
            Ok(FieldType::File) => FieldKind::File,
            Ok(FieldType::Signature) => FieldKind::Signature,
            Ok(FieldType::Group) => FieldKind::Group { fields: def.campos },
            Err(_) => FieldKind::Unsupported(def.tipo_campo),
        };
        let condition = def
            .condicional
            .and_then(|c| c.cuando)
            .map(|w| Condition {
                step_id: w.paso_id,
                equals: w.igual_a,
            });

        Step {
            id: def.id,
            name: def.nombre,
            description: def.descripcion,
            required: def.obligatorio,
            unit: def.unidad,
            condition,
            kind,
        }
    }
}

impl From<Step> for StepDef {
    fn from(step: Step) -> Self {
        let mut def = StepDef {
            id: step.id,
            nombre: step.name,
            descripcion: step.description,
            tipo_campo: step.kind.type_name().to_string(),
            obligatorio: step.required,
            unidad: step.unit,
            condicional: step.condition.map(|c| ConditionDef {
                cuando: Some(WhenDef {
                    paso_id: c.step_id,
                    igual_a: c.equals,
                }),
            }),
            ..StepDef::default()
        };
        match step.kind {
            FieldKind::Text(r) => {
                def.validacion = RulesDef {
                    max_len: r.max_len,
                    ..RulesDef::default()
                }
                .into_option();
            }
            FieldKind::Number(r) => {
                def.validacion = RulesDef {
                    min: r.min,
                    max: r.max,
                    ..RulesDef::default()
                }
                .into_option();
            }
            FieldKind::Date(r) => {
                def.validacion = RulesDef {
                    no_futuras: r.no_future.then_some(true),
                    max_antiguedad_dias: r.max_age_days,
                    ..RulesDef::default()
                }
                .into_option();
            }
            FieldKind::Checkbox { options } | FieldKind::Select { options } => {
                def.valores = (!options.is_empty()).then_some(options);
            }
            FieldKind::Group { fields } => def.campos = fields,
            FieldKind::Photo
            | FieldKind::File
            | FieldKind::Signature
            | FieldKind::Unsupported(_) => {}
        }
        def
    }
}
