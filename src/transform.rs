//! Per-trace value transforms.
//!
//! Display values are always produced from the raw snapshot of a trace:
//! `raw * factor + offset`, followed by an optional nonlinear step. Nothing in
//! this module mutates its input, so the linear part can never be applied twice.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Optional nonlinear step applied after factor/offset
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    #[default]
    None,
    /// Base-10 logarithm; non-positive values become NaN
    Log10,
    /// Centered moving average; the window shrinks at the edges
    MovingAverage {
        #[serde(default = "default_window")]
        window: usize,
    },
    /// Running sum; NaN samples stay NaN and do not reset the sum
    CumulativeSum,
}

fn default_window() -> usize {
    5
}

impl TransformKind {
    /// Short label for status lines and legends
    pub fn label(&self) -> String {
        match self {
            TransformKind::MovingAverage { window } => format!("{}({})", self.as_ref(), window),
            _ => self.as_ref().to_string(),
        }
    }

    /// Parse `none`, `log10`, `cumulative_sum`, `moving_average` or
    /// `moving_average:<window>`
    pub fn parse(text: &str) -> Option<Self> {
        let (name, window) = match text.split_once(':') {
            Some((name, window)) => (name.trim(), Some(window.trim().parse::<usize>().ok()?)),
            None => (text.trim(), None),
        };

        match name.parse::<TransformKind>().ok()? {
            TransformKind::MovingAverage { .. } => Some(TransformKind::MovingAverage {
                window: window.unwrap_or_else(default_window),
            }),
            _ if window.is_some() => None,
            kind => Some(kind),
        }
    }
}

/// Linear part only: `raw * factor + offset`
pub fn scale(raw: &[f64], factor: f64, offset: f64) -> Vec<f64> {
    raw.iter().map(|v| v * factor + offset).collect()
}

/// Full pipeline: linear scaling, then `kind`
pub fn apply(raw: &[f64], factor: f64, offset: f64, kind: TransformKind) -> Vec<f64> {
    let scaled = scale(raw, factor, offset);
    match kind {
        TransformKind::None => scaled,
        TransformKind::Log10 => scaled
            .into_iter()
            .map(|v| if v > 0.0 { v.log10() } else { f64::NAN })
            .collect(),
        TransformKind::MovingAverage { window } => moving_average(&scaled, window),
        TransformKind::CumulativeSum => cumulative_sum(&scaled),
    }
}

/// Centered moving average over the finite samples in each window
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }

    // prefix sums over finite samples
    let mut sums = Vec::with_capacity(values.len() + 1);
    let mut counts = Vec::with_capacity(values.len() + 1);
    sums.push(0.0);
    counts.push(0usize);
    for v in values {
        let (s, c) = (sums[sums.len() - 1], counts[counts.len() - 1]);
        if v.is_finite() {
            sums.push(s + v);
            counts.push(c + 1);
        } else {
            sums.push(s);
            counts.push(c);
        }
    }

    let left = (window - 1) / 2;
    let right = window - 1 - left;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(left);
            let hi = (i + right + 1).min(values.len());
            let count = counts[hi] - counts[lo];
            if count == 0 {
                f64::NAN
            } else {
                (sums[hi] - sums[lo]) / count as f64
            }
        })
        .collect()
}

fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}
