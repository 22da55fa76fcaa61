//! Plotted traces.
//!
//! A trace keeps an immutable snapshot of the variable it was built from
//! (`raw_x`/`raw_y`). The display buffers are derived from that snapshot on
//! every render and are never written to project files.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autoscale::AxisDirection;
use crate::store::Dataset;
use crate::transform::{self, TransformKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraceError {
    #[error("Variable '{name}' not found in dataset '{dataset}'")]
    UnknownVariable { dataset: String, name: String },

    #[error("Factor must be a finite number, got {0}")]
    InvalidFactor(f64),
}

/// Which vertical axis of a cell the trace is drawn against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YSide {
    #[default]
    Left,
    Right,
}

/// Where the X coordinate comes from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XSource {
    /// Sample index `0..N`
    #[default]
    Index,
    /// Another variable of the same dataset
    Variable(String),
}

fn one() -> f64 {
    1.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub unit: String,
    pub dataset: String,
    #[serde(default)]
    pub x_source: XSource,
    pub y_variable: String,

    /// Untransformed snapshots; absent only in legacy project files
    #[serde(default)]
    pub raw_x: Option<Vec<f64>>,
    #[serde(default)]
    pub raw_y: Option<Vec<f64>>,

    #[serde(default = "one")]
    pub x_factor: f64,
    #[serde(default)]
    pub x_offset: f64,
    #[serde(default = "one")]
    pub y_factor: f64,
    #[serde(default)]
    pub y_offset: f64,
    /// Applied to Y only, after factor/offset
    #[serde(default)]
    pub transform: TransformKind,

    /// Grid cell the trace lives in
    #[serde(default)]
    pub axis: usize,
    #[serde(default)]
    pub side: YSide,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "one")]
    pub line_width: f64,

    // Legacy files stored transformed data under these names
    #[serde(default, skip_serializing, alias = "x")]
    display_x: Vec<f64>,
    #[serde(default, skip_serializing, alias = "y")]
    display_y: Vec<f64>,
}

impl Trace {
    /// Snapshot `y_variable` (and the X source) from `dataset`
    pub fn from_dataset(
        id: impl Into<String>,
        dataset: &Dataset,
        x_source: XSource,
        y_variable: &str,
    ) -> Result<Self, TraceError> {
        let y = dataset.get(y_variable).ok_or_else(|| TraceError::UnknownVariable {
            dataset: dataset.name.clone(),
            name: y_variable.to_string(),
        })?;

        let mut trace = Self {
            id: id.into(),
            label: y.name.clone(),
            unit: y.unit.clone(),
            dataset: dataset.name.clone(),
            x_source,
            y_variable: y_variable.to_string(),
            raw_x: None,
            raw_y: None,
            x_factor: 1.0,
            x_offset: 0.0,
            y_factor: 1.0,
            y_offset: 0.0,
            transform: TransformKind::None,
            axis: 0,
            side: YSide::Left,
            color: None,
            line_width: 1.0,
            display_x: Vec::new(),
            display_y: Vec::new(),
        };
        trace.refresh_raw(dataset)?;
        Ok(trace)
    }

    /// Take fresh raw snapshots from `dataset` and re-render
    pub fn refresh_raw(&mut self, dataset: &Dataset) -> Result<(), TraceError> {
        let missing = |name: &str| TraceError::UnknownVariable {
            dataset: dataset.name.clone(),
            name: name.to_string(),
        };

        let y = dataset
            .get(&self.y_variable)
            .ok_or_else(|| missing(&self.y_variable))?;
        let x = match &self.x_source {
            XSource::Index => dataset.index_values(),
            XSource::Variable(name) => dataset.get(name).ok_or_else(|| missing(name))?.values.clone(),
        };

        self.raw_x = Some(x);
        self.raw_y = Some(y.values.clone());
        self.render();
        Ok(())
    }

    pub fn has_raw(&self, direction: AxisDirection) -> bool {
        match direction {
            AxisDirection::X => self.raw_x.is_some(),
            AxisDirection::Y => self.raw_y.is_some(),
        }
    }

    pub fn raw(&self, direction: AxisDirection) -> Option<&[f64]> {
        match direction {
            AxisDirection::X => self.raw_x.as_deref(),
            AxisDirection::Y => self.raw_y.as_deref(),
        }
    }

    /// Current display buffer
    pub fn display(&self, direction: AxisDirection) -> &[f64] {
        match direction {
            AxisDirection::X => &self.display_x,
            AxisDirection::Y => &self.display_y,
        }
    }

    pub fn factor_offset(&self, direction: AxisDirection) -> (f64, f64) {
        match direction {
            AxisDirection::X => (self.x_factor, self.x_offset),
            AxisDirection::Y => (self.y_factor, self.y_offset),
        }
    }

    fn kind(&self, direction: AxisDirection) -> TransformKind {
        match direction {
            AxisDirection::X => TransformKind::None,
            AxisDirection::Y => self.transform,
        }
    }

    /// Transformed values computed from the raw snapshot, if there is one
    pub fn transformed(&self, direction: AxisDirection) -> Option<Vec<f64>> {
        let (factor, offset) = self.factor_offset(direction);
        self.raw(direction)
            .map(|raw| transform::apply(raw, factor, offset, self.kind(direction)))
    }

    /// Rebuild the display buffers from raw data.
    ///
    /// Legacy traces without a raw snapshot keep their display buffer as is.
    pub fn render(&mut self) {
        for direction in [AxisDirection::X, AxisDirection::Y] {
            let Some(values) = self.transformed(direction) else {
                tracing::warn!(
                    "Trace '{}' has no raw {:?} data, keeping stored values",
                    self.id,
                    direction
                );
                continue;
            };
            match direction {
                AxisDirection::X => self.display_x = values,
                AxisDirection::Y => self.display_y = values,
            }
        }
    }

    /// Change factor/offset for one direction and re-render
    pub fn set_scaling(
        &mut self,
        direction: AxisDirection,
        factor: f64,
        offset: f64,
    ) -> Result<(), TraceError> {
        if !factor.is_finite() {
            return Err(TraceError::InvalidFactor(factor));
        }
        match direction {
            AxisDirection::X => {
                self.x_factor = factor;
                self.x_offset = offset;
            }
            AxisDirection::Y => {
                self.y_factor = factor;
                self.y_offset = offset;
            }
        }
        self.render();
        Ok(())
    }

    pub fn set_transform(&mut self, kind: TransformKind) {
        self.transform = kind;
        self.render();
    }
}
