//! Tests for trace transforms
//!
//! Tests cover:
//! - Factor/offset application order
//! - Nonlinear transforms after scaling
//! - Repeated rendering

use crate::common::assertions::assert_series_close;
use crate::common::synthetic;
use splot::autoscale::AxisDirection;
use splot::trace::{Trace, XSource};
use splot::transform::{apply, scale, TransformKind};

#[test]
fn test_scale_is_factor_then_offset() {
    assert_eq!(scale(&[1.0, 2.0], 10.0, 5.0), vec![15.0, 25.0]);
}

#[test]
fn test_log10_after_scaling() {
    let out = apply(&[1.0, 10.0, -1.0], 10.0, 0.0, TransformKind::Log10);
    assert_eq!(&out[..2], &[1.0, 2.0]);
    assert!(out[2].is_nan());
}

#[test]
fn test_moving_average_window_larger_than_data() {
    let out = apply(&[1.0, 2.0, 3.0], 1.0, 0.0, TransformKind::MovingAverage { window: 9 });
    assert_eq!(out, vec![2.0, 2.0, 2.0]);
}

#[test]
fn test_transform_only_touches_y() {
    let ds = synthetic::dyno_log();
    let mut trace = Trace::from_dataset("t_1", &ds, XSource::Variable("time".into()), "Engine Speed")
        .unwrap();
    trace.set_transform(TransformKind::CumulativeSum);

    assert_eq!(trace.display(AxisDirection::X), &[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(trace.display(AxisDirection::Y), &[1000.0, 3000.0, 6000.0, 10000.0]);
}

#[test]
fn test_repeated_scaling_does_not_compound() {
    let ds = synthetic::dyno_log();
    let mut trace = Trace::from_dataset("t_1", &ds, XSource::Index, "Engine Speed").unwrap();

    for _ in 0..5 {
        trace.set_scaling(AxisDirection::Y, 0.001, 1.0).unwrap();
        trace.render();
    }
    assert_series_close(trace.display(AxisDirection::Y), &[2.0, 3.0, 4.0, 5.0], 1e-12);
}

#[test]
fn test_non_finite_factor_rejected() {
    let ds = synthetic::dyno_log();
    let mut trace = Trace::from_dataset("t_1", &ds, XSource::Index, "time").unwrap();
    assert!(trace.set_scaling(AxisDirection::Y, f64::NAN, 0.0).is_err());
    assert_eq!(trace.y_factor, 1.0);
}
