//! Field validators: one pure function per field type.
//!
//! Every validator returns a [`FieldValidation`] and never fails. Validators
//! check well-formedness only; whether a required step was answered is the
//! aggregator's job. The exception is photo/file/signature, which treat a
//! missing value as invalid on their own.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use checklist_types::{DateRules, FieldKind, FieldValidation, NumberRules, Step, TextRules};

const NOT_A_NUMBER: &str = "Value must be a valid number";
const INVALID_DATE: &str = "Date is not valid";
const FUTURE_DATE: &str = "Future dates are not allowed";
const NOT_AN_OPTION: &str = "Selected value is not one of the allowed options";
const FILE_REQUIRED: &str = "A file is required";
const SIGNATURE_REQUIRED: &str = "A signature is required";
const INVALID_GROUP: &str = "Invalid group";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// `true` when the value is missing or JSON `null`.
pub fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Coerce a response to a number: JSON numbers, numeric strings and booleans.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn validate_number(value: Option<&Value>, rules: &NumberRules) -> FieldValidation {
    if is_blank(value) {
        return FieldValidation::valid();
    }
    let Some(number) = value.and_then(coerce_number) else {
        return FieldValidation::invalid(NOT_A_NUMBER);
    };

    let mut errors = Vec::new();
    if let Some(min) = rules.min {
        if number < min {
            errors.push(format!("Value must be greater than or equal to {min}"));
        }
    }
    if let Some(max) = rules.max {
        if number > max {
            errors.push(format!("Value must be less than or equal to {max}"));
        }
    }
    FieldValidation::from_errors(errors)
}

/// Only string values are measured; a zero `max_len` means no limit.
pub fn validate_text(value: Option<&Value>, rules: &TextRules) -> FieldValidation {
    let Some(Value::String(text)) = value else {
        return FieldValidation::valid();
    };
    match rules.max_len {
        Some(max_len) if max_len > 0.0 && text.chars().count() as f64 > max_len => {
            FieldValidation::invalid(format!("Text must be at most {max_len} characters"))
        }
        _ => FieldValidation::valid(),
    }
}

/// Membership is only enforced when `options` is non-empty and a value exists.
pub fn validate_select(value: Option<&Value>, options: &[String]) -> FieldValidation {
    if options.is_empty() || is_absent(value) {
        return FieldValidation::valid();
    }
    let member = matches!(value, Some(Value::String(s)) if options.iter().any(|o| o == s));
    if member {
        FieldValidation::valid()
    } else {
        FieldValidation::invalid(NOT_AN_OPTION)
    }
}

pub fn validate_checkbox(_value: Option<&Value>) -> FieldValidation {
    FieldValidation::valid()
}

/// Parse an ISO-8601 date or date-time. Values without an offset are read as UTC.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn validate_date(value: Option<&Value>, rules: &DateRules, now: DateTime<Utc>) -> FieldValidation {
    let date = match value {
        None | Some(Value::Null) => return FieldValidation::valid(),
        Some(Value::String(s)) if s.is_empty() => return FieldValidation::valid(),
        Some(Value::String(s)) => parse_date(s),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Some(_) => None,
    };
    let Some(date) = date else {
        return FieldValidation::invalid(INVALID_DATE);
    };

    let mut errors = Vec::new();
    if rules.no_future && date > now {
        errors.push(FUTURE_DATE.to_string());
    }
    if let Some(days) = rules.max_age_days.filter(|d| *d != 0.0) {
        let oldest = Duration::try_milliseconds((days * MILLIS_PER_DAY) as i64)
            .and_then(|span| now.checked_sub_signed(span));
        if oldest.is_some_and(|oldest| date < oldest) {
            errors.push(format!("Date cannot be older than {days} days"));
        }
    }
    FieldValidation::from_errors(errors)
}

fn has_upload(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Photo and file fields: any non-empty representation (URL, handle, metadata object).
pub fn validate_file(value: Option<&Value>) -> FieldValidation {
    if has_upload(value) {
        FieldValidation::valid()
    } else {
        FieldValidation::invalid(FILE_REQUIRED)
    }
}

pub fn validate_signature(value: Option<&Value>) -> FieldValidation {
    if has_upload(value) {
        FieldValidation::valid()
    } else {
        FieldValidation::invalid(SIGNATURE_REQUIRED)
    }
}

/// Validate a group value map against its sub-field definitions.
///
/// A missing or non-object value, or missing sub-field definitions, yields a
/// single generic error. Otherwise each sub-field is validated with its own
/// type's validator and reported both in `errors` and `subfield_results`.
pub fn validate_group(
    values: Option<&Value>,
    fields: Option<&[Step]>,
    now: DateTime<Utc>,
) -> FieldValidation {
    let (Some(Value::Object(values)), Some(fields)) = (values, fields) else {
        return FieldValidation::invalid(INVALID_GROUP);
    };

    let mut result = FieldValidation::valid();
    for field in fields {
        let key = field.key();
        let verdict = validate_field(values.get(key), field, now);
        if !verdict.is_valid {
            result.is_valid = false;
            result
                .errors
                .push(format!("Error in {key}: {}", verdict.errors.join(", ")));
        }
        result.subfield_results.insert(key.to_string(), verdict);
    }
    result
}

/// Dispatch to the validator for the step's field type.
pub fn validate_field(value: Option<&Value>, step: &Step, now: DateTime<Utc>) -> FieldValidation {
    match &step.kind {
        FieldKind::Number(rules) => validate_number(value, rules),
        FieldKind::Text(rules) => validate_text(value, rules),
        FieldKind::Select { options } => validate_select(value, options),
        FieldKind::Checkbox { .. } => validate_checkbox(value),
        FieldKind::Date(rules) => validate_date(value, rules, now),
        FieldKind::Photo | FieldKind::File => validate_file(value),
        FieldKind::Signature => validate_signature(value),
        FieldKind::Group { fields } => validate_group(value, fields.as_deref(), now),
        FieldKind::Unsupported(_) => FieldValidation::unsupported(),
    }
}
