//! Axis autoscaling.
//!
//! Limits are computed from each trace's raw snapshot run through its current
//! factor/offset/transform, never from display buffers, so re-rendering a trace
//! any number of times cannot shift the computed range.

use serde::{Deserialize, Serialize};

use crate::trace::{Trace, YSide};

/// Default fraction of the data range added on each side
pub const DEFAULT_MARGIN: f64 = 0.05;

/// Mantissas used by [`round_to_nice`]
const NICE_NUMBERS: [f64; 10] = [1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDirection {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoscaleConfig {
    pub margin: f64,
    pub nice_rounding: bool,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            nice_rounding: false,
        }
    }
}

fn default_margin() -> f64 {
    DEFAULT_MARGIN
}

fn default_auto() -> bool {
    true
}

/// Limits of one axis of one grid cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub axis: usize,
    pub direction: AxisDirection,
    /// Left or right Y axis; always `Left` for X
    #[serde(default)]
    pub side: YSide,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// `false` once the user pins the limits
    #[serde(default = "default_auto")]
    pub auto: bool,
}

impl AxisLimits {
    pub fn new(axis: usize, direction: AxisDirection, side: YSide, margin: f64) -> Self {
        Self {
            axis,
            direction,
            side,
            min: 0.0,
            max: 1.0,
            margin,
            auto: true,
        }
    }

    /// True if these limits govern `trace` in `direction`
    pub fn covers(&self, trace: &Trace) -> bool {
        trace.axis == self.axis
            && (self.direction == AxisDirection::X || trace.side == self.side)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Finite min/max over all traces in `direction`.
///
/// Traces without raw data (legacy) contribute their display buffer unchanged.
pub fn data_range<'a>(
    direction: AxisDirection,
    traces: impl IntoIterator<Item = &'a Trace>,
) -> Option<(f64, f64)> {
    let mut range: Option<(f64, f64)> = None;
    let mut fold = |v: f64| {
        if !v.is_finite() {
            return;
        }
        range = Some(match range {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        });
    };

    for trace in traces {
        match trace.transformed(direction) {
            Some(values) => values.into_iter().for_each(&mut fold),
            None => {
                tracing::warn!(
                    "Trace '{}' has no raw {:?} data, autoscaling from displayed values",
                    trace.id,
                    direction
                );
                trace.display(direction).iter().copied().for_each(&mut fold);
            }
        }
    }
    range
}

/// Widen `[min, max]` by `margin` of its span on both sides.
///
/// A zero span uses 10% of |min| instead, or 1.0 when min is zero.
pub fn expand(min: f64, max: f64, margin: f64) -> (f64, f64) {
    let range = max - min;
    let pad = if range == 0.0 {
        if min != 0.0 {
            min.abs() * 0.1
        } else {
            1.0
        }
    } else {
        range * margin
    };
    (min - pad, max + pad)
}

fn nice_magnitude(value: f64, round_up: bool) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let order = value.log10().floor();
    let scale = 10f64.powf(order);
    let normalized = value / scale;

    let selected = if round_up {
        NICE_NUMBERS
            .iter()
            .copied()
            .find(|&n| n >= normalized - 1e-9)
            .unwrap_or(10.0)
    } else {
        NICE_NUMBERS
            .iter()
            .copied()
            .rev()
            .find(|&n| n <= normalized + 1e-9)
            .unwrap_or(1.0)
    };
    selected * scale
}

/// Round `value` outward to a nice number: down when `round_down`, else up
pub fn round_to_nice(value: f64, round_down: bool) -> f64 {
    if value < 0.0 {
        -nice_magnitude(-value, round_down)
    } else {
        nice_magnitude(value, !round_down)
    }
}

/// Autoscaled limits for `direction`, or `None` when no trace has finite data
pub fn compute_limits<'a>(
    direction: AxisDirection,
    traces: impl IntoIterator<Item = &'a Trace>,
    config: &AutoscaleConfig,
) -> Option<(f64, f64)> {
    let (min, max) = data_range(direction, traces)?;
    let (lo, hi) = expand(min, max, config.margin);

    if config.nice_rounding {
        Some((round_to_nice(lo, true), round_to_nice(hi, false)))
    } else {
        Some((lo, hi))
    }
}
