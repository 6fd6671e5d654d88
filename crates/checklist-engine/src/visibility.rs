//! Visibility resolver.
//!
//! A step without a condition is always visible. A conditional step is visible
//! iff the controlling step's response is present and is the exact string the
//! condition expects. Missing controlling answers fail closed.
//!
//! The predicate reads raw responses only, so each step is evaluated on its own;
//! forward or self references simply find no answer and stay hidden.

use serde_json::Value;

use checklist_types::{Condition, ResponseMap, Step, VisibilityMap};

/// Evaluate a single condition against the current responses.
///
/// Comparison is case-sensitive string equality with no coercion: a numeric
/// or boolean answer never matches, even if it prints the same.
pub fn evaluate_condition(condition: &Condition, responses: &ResponseMap) -> bool {
    match responses.get(&condition.step_id) {
        Some(Value::String(answer)) => *answer == condition.equals,
        _ => false,
    }
}

pub fn is_step_visible(step: &Step, responses: &ResponseMap) -> bool {
    match &step.condition {
        None => true,
        Some(condition) => evaluate_condition(condition, responses),
    }
}

/// Visibility of every step, recomputed from scratch.
pub fn compute_visibility_map(steps: &[Step], responses: &ResponseMap) -> VisibilityMap {
    steps
        .iter()
        .map(|step| (step.id, is_step_visible(step, responses)))
        .collect()
}

/// Steps that are currently visible, in document order.
pub fn visible_steps<'a>(steps: &'a [Step], responses: &ResponseMap) -> Vec<&'a Step> {
    steps
        .iter()
        .filter(|step| is_step_visible(step, responses))
        .collect()
}

/// Steps whose condition reads the answer of `step_id`.
pub fn dependents_of(steps: &[Step], step_id: u32) -> Vec<u32> {
    steps
        .iter()
        .filter(|step| matches!(&step.condition, Some(c) if c.step_id == step_id))
        .map(|step| step.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use checklist_types::{FieldKind, TextRules};
    use serde_json::json;

    fn shift_steps() -> Vec<Step> {
        vec![
            Step::new(
                1,
                "Turno",
                FieldKind::Select {
                    options: vec!["Día".into(), "Noche".into()],
                },
            ),
            Step::new(2, "Iluminación", FieldKind::Text(TextRules::default())).when(1, "Noche"),
            Step::new(3, "Observaciones", FieldKind::Text(TextRules::default())),
        ]
    }

    fn responses(pairs: &[(u32, Value)]) -> ResponseMap {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn unconditional_steps_always_visible() {
        let steps = shift_steps();
        for r in [
            ResponseMap::new(),
            responses(&[(1, json!("Día"))]),
            responses(&[(1, json!("Noche")), (3, json!("ok"))]),
        ] {
            assert!(is_step_visible(&steps[0], &r));
            assert!(is_step_visible(&steps[2], &r));
        }
    }

    #[test]
    fn conditional_visible_on_exact_match_only() {
        let steps = shift_steps();
        assert!(is_step_visible(&steps[1], &responses(&[(1, json!("Noche"))])));
        assert!(!is_step_visible(&steps[1], &responses(&[(1, json!("Día"))])));
        assert!(!is_step_visible(&steps[1], &responses(&[(1, json!("noche"))])));
        assert!(!is_step_visible(&steps[1], &responses(&[(1, json!("Noche "))])));
    }

    #[test]
    fn missing_or_null_controlling_answer_fails_closed() {
        let steps = shift_steps();
        assert!(!is_step_visible(&steps[1], &ResponseMap::new()));
        assert!(!is_step_visible(&steps[1], &responses(&[(1, Value::Null)])));
    }

    #[test]
    fn no_type_coercion() {
        let step = Step::new(4, "Presión", FieldKind::Text(TextRules::default())).when(2, "5");
        assert!(!is_step_visible(&step, &responses(&[(2, json!(5))])));
        assert!(is_step_visible(&step, &responses(&[(2, json!("5"))])));

        let flag = Step::new(5, "Detalle", FieldKind::Text(TextRules::default())).when(2, "true");
        assert!(!is_step_visible(&flag, &responses(&[(2, json!(true))])));
    }

    #[test]
    fn forward_reference_reads_absent_answer() {
        let step = Step::new(1, "Primero", FieldKind::Text(TextRules::default())).when(2, "sí");
        assert!(!is_step_visible(&step, &ResponseMap::new()));
    }

    #[test]
    fn visibility_map_is_idempotent() {
        let steps = shift_steps();
        let r = responses(&[(1, json!("Noche"))]);
        let first = compute_visibility_map(&steps, &r);
        let second = compute_visibility_map(&steps, &r);
        assert_eq!(first, second);
        assert_eq!(first.get(&2), Some(&true));
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn visible_steps_keep_document_order() {
        let steps = shift_steps();
        let ids: Vec<u32> = visible_steps(&steps, &responses(&[(1, json!("Día"))]))
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn dependents_lists_conditional_children() {
        let steps = shift_steps();
        assert_eq!(dependents_of(&steps, 1), vec![2]);
        assert!(dependents_of(&steps, 3).is_empty());
    }
}
