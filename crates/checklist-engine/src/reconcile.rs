//! Response reconciler: keeps the response map consistent with visibility.
//!
//! Answers of hidden steps are deleted, not kept aside. Re-showing a step
//! starts it empty again.

use checklist_types::{ResponseMap, Step, VisibilityMap};

use crate::visibility::compute_visibility_map;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Visibility computed from the responses left after purging.
    pub visibility: VisibilityMap,
    /// Step ids whose answers were removed, in the order they were purged.
    pub purged: Vec<u32>,
}

/// Recompute visibility and delete answers of hidden steps.
///
/// Purging one answer can hide a step that depended on it, so the pass repeats
/// until nothing else is removed. Responses only shrink, which bounds the loop
/// by the number of steps. Entries for ids that are not steps are left alone.
pub fn reconcile(steps: &[Step], responses: &mut ResponseMap) -> Reconciliation {
    let mut purged = Vec::new();
    loop {
        let visibility = compute_visibility_map(steps, responses);
        let before = purged.len();
        for step in steps {
            if visibility.get(&step.id) == Some(&false) && responses.remove(&step.id).is_some() {
                purged.push(step.id);
            }
        }
        if purged.len() == before {
            return Reconciliation { visibility, purged };
        }
    }
}
