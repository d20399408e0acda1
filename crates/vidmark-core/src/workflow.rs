//! Conditional step navigation over a validated config.
//!
//! Conditions only look backwards, so evaluating any step needs nothing but
//! the answers already in the draft. Nothing here is cached: every call
//! re-evaluates against the values it is given.

use crate::config::schema::{normalize_value, Condition, Operator, Step};
use crate::types::StepValues;

/// Step navigator borrowed from a validated config.
#[derive(Debug, Clone, Copy)]
pub struct ConfigWorkflow<'a> {
    steps: &'a [Step],
}

impl<'a> ConfigWorkflow<'a> {
    pub fn new(steps: &'a [Step]) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &'a [Step] {
        self.steps
    }

    pub fn step(&self, index: usize) -> Option<&'a Step> {
        self.steps.get(index)
    }

    /// First qualifying step at or after `from`. `None` means the workflow is done.
    pub fn next_valid_step(&self, from: usize, draft: &StepValues) -> Option<usize> {
        (from..self.steps.len()).find(|&i| evaluate(&self.steps[i], draft))
    }

    /// Last qualifying step at or before `from`. `None` means there is nothing to go back to.
    pub fn prev_valid_step(&self, from: usize, draft: &StepValues) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        let from = from.min(self.steps.len() - 1);
        (0..=from).rev().find(|&i| evaluate(&self.steps[i], draft))
    }

    pub fn first_step(&self, draft: &StepValues) -> Option<usize> {
        self.next_valid_step(0, draft)
    }

    /// Drop answers for steps after `index` whose conditions no longer hold.
    ///
    /// Scans in order so that a purge cascades: a later step gated on a step
    /// purged here is evaluated against the already-reduced draft.
    pub fn purge_invalidated(&self, index: usize, draft: &mut StepValues) -> Vec<String> {
        let mut purged = Vec::new();
        for step in self.steps.iter().skip(index + 1) {
            if draft.contains_key(&step.id) && !evaluate(step, draft) {
                draft.remove(&step.id);
                purged.push(step.id.clone());
            }
        }
        purged
    }
}

/// Whether `step` should be asked given the answers so far.
///
/// A step gated on an unanswered step is skipped, not an error.
pub fn evaluate(step: &Step, draft: &StepValues) -> bool {
    match &step.condition {
        None => true,
        Some(cond) => condition_holds(cond, draft),
    }
}

fn condition_holds(cond: &Condition, draft: &StepValues) -> bool {
    let Some(answer) = draft.get(&cond.step) else {
        return false;
    };
    let answer = normalize_value(answer);
    let expected = || cond.value.as_deref().map(normalize_value);
    let listed = || cond.values.iter().any(|v| normalize_value(v) == answer);
    match cond.operator {
        Operator::Eq => expected().is_some_and(|v| v == answer),
        Operator::Ne => expected().is_some_and(|v| v != answer),
        Operator::In => listed(),
        Operator::NotIn => !listed(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::parser::{parse_config, ConfigFormat};
    use crate::config::schema::WorkflowConfig;
    use proptest::prelude::*;

    pub(crate) fn vehicle_config() -> WorkflowConfig {
        parse_config(
            r#"
name: vehicles
steps:
  - id: vehicle_type
    prompt: "Vehicle type?"
    choices: [car, truck]
  - id: license_plate
    prompt: "Plate"
    kind: text
    condition: { step: vehicle_type, value: truck }
"#,
            ConfigFormat::Yaml,
        )
        .unwrap()
    }

    fn branching_config() -> WorkflowConfig {
        parse_config(
            r#"
name: branching
steps:
  - id: kind
    prompt: "Kind?"
    choices: [car, truck, bus]
  - id: axles
    prompt: "Axles?"
    choices: [2, 3, 4]
    condition: { step: kind, operator: in, values: [truck, bus] }
  - id: trailer
    prompt: "Trailer?"
    choices: [yes, no]
    condition: { step: axles, operator: ne, value: 2 }
  - id: colour
    prompt: "Colour?"
    choices: [red, other]
    condition: { step: kind, operator: not_in, values: [bus] }
  - id: note
    prompt: "Note"
    kind: text
    required: false
"#,
            ConfigFormat::Yaml,
        )
        .unwrap()
    }

    fn values(pairs: &[(&str, &str)]) -> StepValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn car_ends_after_first_step() {
        let config = vehicle_config();
        let wf = ConfigWorkflow::new(&config.steps);
        assert_eq!(wf.first_step(&StepValues::new()), Some(0));
        assert_eq!(wf.next_valid_step(1, &values(&[("vehicle_type", "car")])), None);
    }

    #[test]
    fn truck_requires_plate() {
        let config = vehicle_config();
        let wf = ConfigWorkflow::new(&config.steps);
        let draft = values(&[("vehicle_type", "truck")]);
        assert_eq!(wf.next_valid_step(1, &draft), Some(1));
        let draft = values(&[("vehicle_type", "truck"), ("license_plate", "AB-123")]);
        assert_eq!(wf.next_valid_step(2, &draft), None);
    }

    #[test]
    fn unanswered_reference_skips_step() {
        let config = vehicle_config();
        let wf = ConfigWorkflow::new(&config.steps);
        assert!(!evaluate(&config.steps[1], &StepValues::new()));
        assert_eq!(wf.next_valid_step(1, &StepValues::new()), None);
    }

    #[test]
    fn operators_compare_normalized_strings() {
        let config = branching_config();
        let wf = ConfigWorkflow::new(&config.steps);

        let bus = values(&[("kind", " bus ")]);
        assert_eq!(wf.next_valid_step(1, &bus), Some(1));

        let bus_two_axles = values(&[("kind", "bus"), ("axles", "2")]);
        // trailer skipped (axles == 2), colour skipped (bus), note always
        assert_eq!(wf.next_valid_step(2, &bus_two_axles), Some(4));

        let truck_three = values(&[("kind", "truck"), ("axles", "3")]);
        assert_eq!(wf.next_valid_step(2, &truck_three), Some(2));

        let car = values(&[("kind", "car")]);
        assert_eq!(wf.next_valid_step(1, &car), Some(3));
    }

    #[test]
    fn prev_skips_unqualified_steps() {
        let config = branching_config();
        let wf = ConfigWorkflow::new(&config.steps);
        let car = values(&[("kind", "car"), ("colour", "red")]);
        // From note (4), colour (3) qualifies.
        assert_eq!(wf.prev_valid_step(3, &car), Some(3));
        // From colour (3) back: trailer and axles are gated off for a car.
        assert_eq!(wf.prev_valid_step(2, &car), Some(0));
        assert_eq!(wf.prev_valid_step(99, &car), Some(4));
    }

    #[test]
    fn purge_cascades_through_dependent_steps() {
        let config = branching_config();
        let wf = ConfigWorkflow::new(&config.steps);
        let mut draft = values(&[
            ("kind", "car"),
            ("axles", "3"),
            ("trailer", "yes"),
            ("colour", "red"),
        ]);
        let purged = wf.purge_invalidated(0, &mut draft);
        assert_eq!(purged, vec!["axles".to_string(), "trailer".to_string()]);
        assert_eq!(draft, values(&[("kind", "car"), ("colour", "red")]));
    }

    #[test]
    fn empty_step_list_has_no_steps() {
        let wf = ConfigWorkflow::new(&[]);
        assert_eq!(wf.first_step(&StepValues::new()), None);
        assert_eq!(wf.prev_valid_step(0, &StepValues::new()), None);
    }

    fn arb_draft() -> impl Strategy<Value = StepValues> {
        let kind = prop::option::of(prop::sample::select(vec!["car", "truck", "bus"]));
        let axles = prop::option::of(prop::sample::select(vec!["2", "3", "4"]));
        let colour = prop::option::of(prop::sample::select(vec!["red", "other"]));
        (kind, axles, colour).prop_map(|(k, a, c)| {
            let mut draft = StepValues::new();
            if let Some(k) = k {
                draft.insert("kind".into(), k.into());
            }
            if let Some(a) = a {
                draft.insert("axles".into(), a.into());
            }
            if let Some(c) = c {
                draft.insert("colour".into(), c.into());
            }
            draft
        })
    }

    proptest! {
        /// Navigation is a pure function of (index, draft).
        #[test]
        fn navigation_is_deterministic(from in 0usize..6, draft in arb_draft()) {
            let config = branching_config();
            let wf = ConfigWorkflow::new(&config.steps);
            prop_assert_eq!(wf.next_valid_step(from, &draft), wf.next_valid_step(from, &draft));
            prop_assert_eq!(wf.prev_valid_step(from, &draft), wf.prev_valid_step(from, &draft));
        }

        /// Whatever a scan returns is a step that evaluates true.
        #[test]
        fn scans_only_land_on_qualifying_steps(from in 0usize..6, draft in arb_draft()) {
            let config = branching_config();
            let wf = ConfigWorkflow::new(&config.steps);
            if let Some(i) = wf.next_valid_step(from, &draft) {
                prop_assert!(i >= from);
                prop_assert!(evaluate(&config.steps[i], &draft));
            }
            if let Some(i) = wf.prev_valid_step(from, &draft) {
                prop_assert!(i <= from);
                prop_assert!(evaluate(&config.steps[i], &draft));
            }
        }
    }
}
