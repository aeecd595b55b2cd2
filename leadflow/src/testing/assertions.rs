//! Assertions over output records.

use crate::record::{FieldValue, OutputRecord};

/// Asserts which stages of `model` the record reached, in funnel order.
pub fn assert_reached(record: &OutputRecord, model: &str, expected: &[&str]) {
    let funnel = record
        .funnel(model)
        .unwrap_or_else(|| panic!("record {} has no funnel '{model}'", record.id));
    let reached: Vec<&str> = funnel
        .model
        .get_ordered_stages()
        .iter()
        .zip(&funnel.stages)
        .filter(|(_, outcome)| outcome.reached)
        .map(|(stage, _)| stage.key.as_str())
        .collect();
    assert_eq!(
        reached, expected,
        "record {}: reached stages of '{model}' differ",
        record.id
    );
}

/// Asserts that a stage is reached.
pub fn assert_stage_reached(record: &OutputRecord, model: &str, key: &str) {
    let reached = record.funnel(model).is_some_and(|f| f.is_reached(key));
    assert!(reached, "record {}: expected '{key}' of '{model}' to be reached", record.id);
}

/// Asserts that a stage is not reached.
pub fn assert_stage_not_reached(record: &OutputRecord, model: &str, key: &str) {
    let reached = record.funnel(model).is_some_and(|f| f.is_reached(key));
    assert!(!reached, "record {}: expected '{key}' of '{model}' to be unreached", record.id);
}

/// Asserts a flattened column value.
pub fn assert_column(record: &OutputRecord, key: &str, expected: &FieldValue) {
    let row = record.to_row();
    let actual = row.get(key).unwrap_or(&FieldValue::Empty);
    assert_eq!(actual, expected, "record {}: column '{key}'", record.id);
}
