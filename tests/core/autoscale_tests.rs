//! Tests for autoscaling
//!
//! Tests cover:
//! - Single application of factor/offset
//! - Degenerate ranges
//! - Non-finite filtering and legacy traces
//! - Nice rounding

use crate::common::assertions::assert_close;
use crate::common::synthetic;
use splot::autoscale::{compute_limits, AutoscaleConfig, AxisDirection};
use splot::trace::{Trace, XSource};
use splot::transform::TransformKind;

fn trace_for(values: &[f64]) -> Trace {
    let ds = synthetic::dataset("raw.csv", &[("y", "", values)]);
    Trace::from_dataset("t_1", &ds, XSource::Index, "y").unwrap()
}

// ============================================
// Single Application Tests
// ============================================

#[test]
fn test_factor_applied_once_regardless_of_renders() {
    let mut trace = trace_for(&[0.0, 5000.0, 20000.0]);
    trace.set_scaling(AxisDirection::Y, 0.1, 0.0).unwrap();
    for _ in 0..10 {
        trace.render();
    }

    let (min, max) =
        compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default()).unwrap();
    assert_close(min, -100.0, 1e-9);
    assert_close(max, 2100.0, 1e-9);
}

#[test]
fn test_transform_tag_included() {
    let mut trace = trace_for(&[1.0, 10.0, 100.0]);
    trace.set_transform(TransformKind::Log10);

    let (min, max) =
        compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default()).unwrap();
    assert_close(min, -0.1, 1e-12);
    assert_close(max, 2.1, 1e-12);
}

#[test]
fn test_multiple_traces_union() {
    let a = trace_for(&[0.0, 10.0]);
    let b = trace_for(&[-10.0, 5.0]);
    let config = AutoscaleConfig {
        margin: 0.0,
        nice_rounding: false,
    };
    assert_eq!(compute_limits(AxisDirection::Y, [&a, &b], &config), Some((-10.0, 10.0)));
}

// ============================================
// Degenerate Range Tests
// ============================================

#[test]
fn test_constant_nonzero_series() {
    let trace = trace_for(&[50.0, 50.0, 50.0]);
    let limits = compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default());
    assert_eq!(limits, Some((45.0, 55.0)));
}

#[test]
fn test_constant_zero_series() {
    let trace = trace_for(&[0.0, 0.0]);
    let limits = compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default());
    assert_eq!(limits, Some((-1.0, 1.0)));
}

#[test]
fn test_all_non_finite_gives_none() {
    let trace = trace_for(&[f64::NAN, f64::INFINITY]);
    assert_eq!(
        compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default()),
        None
    );
}

#[test]
fn test_non_finite_values_ignored() {
    let trace = trace_for(&[f64::NAN, 0.0, f64::NEG_INFINITY, 100.0]);
    let (min, max) =
        compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default()).unwrap();
    assert_close(min, -5.0, 1e-12);
    assert_close(max, 105.0, 1e-12);
}

// ============================================
// Legacy and Rounding Tests
// ============================================

#[test]
fn test_legacy_trace_uses_display_as_is() {
    let json = r#"{
        "id": "t_1", "label": "y", "dataset": "old.csv", "y_variable": "y",
        "y_factor": 0.1,
        "x": [0.0, 1.0], "y": [0.0, 2000.0]
    }"#;
    let trace: Trace = serde_json::from_str(json).unwrap();
    assert!(trace.raw_y.is_none());

    let (min, max) =
        compute_limits(AxisDirection::Y, [&trace], &AutoscaleConfig::default()).unwrap();
    // stored values are already scaled and must not be scaled again
    assert_close(min, -100.0, 1e-9);
    assert_close(max, 2100.0, 1e-9);
}

#[test]
fn test_nice_rounding() {
    let trace = trace_for(&[0.0, 20000.0]);
    let config = AutoscaleConfig {
        nice_rounding: true,
        ..Default::default()
    };
    assert_eq!(
        compute_limits(AxisDirection::Y, [&trace], &config),
        Some((-1000.0, 25000.0))
    );
}
