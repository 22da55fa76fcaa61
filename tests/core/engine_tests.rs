//! Tests for formula recalculation
//!
//! Tests cover:
//! - Declaration order and chaining
//! - Partial failure isolation
//! - Result name collisions
//! - Broadcasting and error messages

use crate::common::assertions::{assert_equal_lengths, assert_series_close};
use crate::common::synthetic;
use splot::engine::{evaluate_all, FormulaOutcome};
use splot::formula::FormulaDefinition;
use splot::store::{Provenance, Variable};

// ============================================
// Ordering Tests
// ============================================

#[test]
fn test_later_formulas_see_earlier_results() {
    let mut ds = synthetic::dyno_log();
    let defs = vec![
        FormulaDefinition::new(
            "Power[kW]",
            "kW",
            "ダイナモトルク[P] * Engine Speed / 9549",
        ),
        FormulaDefinition::new("Power[PS]", "PS", "Power[kW] * 1.3596"),
    ];

    let report = evaluate_all(&mut ds, &defs);
    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 0);

    let kw = ds.get("Power[kW]").unwrap();
    assert_eq!(kw.provenance, Provenance::Derived);
    assert_eq!(kw.unit, "kW");
    assert_series_close(
        &kw.values,
        &[100.0 * 1000.0 / 9549.0, 120.0 * 2000.0 / 9549.0, 140.0 * 3000.0 / 9549.0, 160.0 * 4000.0 / 9549.0],
        1e-9,
    );

    let ps = &ds.get("Power[PS]").unwrap().values;
    assert_series_close(ps, &kw.values.iter().map(|v| v * 1.3596).collect::<Vec<_>>(), 1e-9);
    assert_equal_lengths(&ds);
}

#[test]
fn test_forward_reference_fails() {
    let mut ds = synthetic::dyno_log();
    let defs = vec![
        FormulaDefinition::new("B", "", "A * 2"),
        FormulaDefinition::new("A", "", "time + 1"),
    ];

    let report = evaluate_all(&mut ds, &defs);
    assert!(report.get("B").unwrap().is_failure());
    assert!(report.get("A").unwrap().is_success());
    assert!(!ds.contains("B"));
}

// ============================================
// Partial Failure Tests
// ============================================

#[test]
fn test_partial_failure_isolation() {
    let mut ds = synthetic::dyno_log();
    let defs = vec![
        FormulaDefinition::new("Good1", "", "time * 2"),
        FormulaDefinition::new("Broken", "", "time * nonexistent"),
        FormulaDefinition::new("Good2", "", "Good1 + 1"),
    ];

    let report = evaluate_all(&mut ds, &defs);
    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 1);

    let names: Vec<&str> = report.entries().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Good1", "Broken", "Good2"]);

    let message = report.get("Broken").unwrap().message().unwrap();
    assert!(message.contains("time * nonexistent"), "{}", message);
    assert!(message.contains("nonexistent"), "{}", message);

    assert_eq!(ds.get("Good2").unwrap().values, vec![1.0, 3.0, 5.0, 7.0]);
}

#[test]
fn test_failure_keeps_previous_value() {
    let mut ds = synthetic::dyno_log();
    ds.insert(Variable::derived("Ratio", "", vec![9.0; 4])).unwrap();

    let report = evaluate_all(&mut ds, &[FormulaDefinition::new("Ratio", "", "time / (")]);
    assert!(report.get("Ratio").unwrap().is_failure());
    assert_eq!(ds.get("Ratio").unwrap().values, vec![9.0; 4]);
}

#[test]
fn test_error_message_uses_display_names() {
    let mut ds = synthetic::dyno_log();
    ds.insert(Variable::imported("Short Column", "", vec![1.0; 4])).unwrap();

    let report = evaluate_all(
        &mut ds,
        &[FormulaDefinition::new("X", "", "温度[°C] + median(温度[°C] + 1)")],
    );
    let message = report.get("X").unwrap().message().unwrap();
    assert!(message.contains("温度[°C] + median(温度[°C] + 1)"), "{}", message);
    assert!(!message.contains("var_"), "{}", message);
}

// ============================================
// Collision Tests
// ============================================

#[test]
fn test_collision_rejected_without_mutation() {
    let mut ds = synthetic::dyno_log();
    let before = ds.get("time").unwrap().values.clone();

    let report = evaluate_all(&mut ds, &[FormulaDefinition::new("time", "s", "time * 1000")]);

    match report.get("time").unwrap() {
        FormulaOutcome::Rejected { message } => assert!(message.contains("time")),
        other => panic!("expected rejection, got {:?}", other),
    }
    let time = ds.get("time").unwrap();
    assert_eq!(time.values, before);
    assert_eq!(time.provenance, Provenance::Imported);
    assert_eq!(time.unit, "s");
}

#[test]
fn test_generated_identifier_as_result_name_is_rejected() {
    let mut ds = synthetic::dataset(
        "bench.csv",
        &[("Oil Temp", "C", &[80.0, 90.0]), ("Speed[rpm]", "rpm", &[1000.0, 2000.0])],
    );
    let defs = vec![
        FormulaDefinition::new("var_1", "", "2"),
        FormulaDefinition::new("Double", "C", "Oil Temp * 2"),
        FormulaDefinition::new("Ratio", "", "Speed[rpm] / Oil Temp"),
    ];

    let report = evaluate_all(&mut ds, &defs);
    assert!(matches!(report.get("var_1"), Some(FormulaOutcome::Rejected { .. })));
    assert!(!ds.contains("var_1"));
    assert_eq!(ds.get("Double").unwrap().values, vec![160.0, 180.0]);
    assert_series_close(&ds.get("Ratio").unwrap().values, &[12.5, 2000.0 / 90.0], 1e-9);
}

#[test]
fn test_identifiers_stable_within_pass() {
    // "Oil Temp" is var_0 when the pass starts; "Aaa" sorts before it once
    // stored, which must not move "Oil Temp" onto the real variable var_1
    let mut ds = synthetic::dataset(
        "bench.csv",
        &[("Oil Temp", "C", &[1.0, 2.0]), ("var_1", "", &[3.0, 4.0])],
    );
    let defs = vec![
        FormulaDefinition::new("Aaa", "", "Oil Temp + 1"),
        FormulaDefinition::new("Sum", "", "Oil Temp + var_1"),
        FormulaDefinition::new("Shifted[x]", "", "Aaa * 10"),
        FormulaDefinition::new("Total", "", "Shifted[x] + Oil Temp"),
    ];

    let report = evaluate_all(&mut ds, &defs);
    assert_eq!(report.failure_count(), 0, "{:?}", report.entries());
    assert_eq!(ds.get("Sum").unwrap().values, vec![4.0, 6.0]);
    assert_eq!(ds.get("Total").unwrap().values, vec![21.0, 32.0]);
}

#[test]
fn test_derived_result_replaced_wholesale() {
    let mut ds = synthetic::dyno_log();
    evaluate_all(&mut ds, &[FormulaDefinition::new("Y", "a", "time")]);
    evaluate_all(&mut ds, &[FormulaDefinition::new("Y", "b", "time * 10")]);

    let y = ds.get("Y").unwrap();
    assert_eq!(y.unit, "b");
    assert_eq!(y.values, vec![0.0, 10.0, 20.0, 30.0]);
}

// ============================================
// Misc Tests
// ============================================

#[test]
fn test_scalar_broadcast_and_disabled() {
    let mut ds = synthetic::dyno_log();
    let mut disabled = FormulaDefinition::new("Off", "", "time");
    disabled.enabled = false;

    let report = evaluate_all(
        &mut ds,
        &[FormulaDefinition::new("Avg", "Nm", "mean(ダイナモトルク[P])"), disabled],
    );

    assert_eq!(report.get("Off"), Some(&FormulaOutcome::Skipped));
    assert!(!ds.contains("Off"));
    assert_eq!(ds.get("Avg").unwrap().values, vec![130.0; 4]);
}

#[test]
fn test_empty_definition_list() {
    let mut ds = synthetic::dyno_log();
    let report = evaluate_all(&mut ds, &[]);
    assert!(report.is_empty());
    assert_eq!(report.summary(), "Updated 0 channels.");
}
