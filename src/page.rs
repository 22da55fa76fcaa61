//! Pages of charts and the autoscale trigger policy.
//!
//! A page is a `rows x cols` grid of cells. Every cell has one X axis and a
//! left and right Y axis, each with its own [`AxisLimits`]. Axes that are not
//! pinned are re-autoscaled whenever something changes what they show: a
//! trace is added or removed, its scaling or transform changes, or the
//! dataset behind it is reloaded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autoscale::{compute_limits, AutoscaleConfig, AxisDirection, AxisLimits};
use crate::store::Dataset;
use crate::trace::{Trace, TraceError, XSource, YSide};
use crate::transform::TransformKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PageError {
    #[error("Page grid must have at least one row and one column, got {rows}x{cols}")]
    InvalidGrid { rows: usize, cols: usize },

    #[error("Axis {axis} does not exist (page has {cells} cells)")]
    AxisOutOfRange { axis: usize, cells: usize },

    #[error("Trace not found: {0}")]
    UnknownTrace(String),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub title: String,
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    traces: Vec<Trace>,
    #[serde(default)]
    limits: Vec<AxisLimits>,
    /// Last number used for a `t_<n>` trace id
    #[serde(default)]
    trace_counter: usize,
}

impl Page {
    pub fn new(
        title: impl Into<String>,
        rows: usize,
        cols: usize,
        config: &AutoscaleConfig,
    ) -> Result<Self, PageError> {
        if rows == 0 || cols == 0 {
            return Err(PageError::InvalidGrid { rows, cols });
        }

        let mut limits = Vec::with_capacity(rows * cols * 3);
        for axis in 0..rows * cols {
            limits.push(AxisLimits::new(axis, AxisDirection::X, YSide::Left, config.margin));
            limits.push(AxisLimits::new(axis, AxisDirection::Y, YSide::Left, config.margin));
            limits.push(AxisLimits::new(axis, AxisDirection::Y, YSide::Right, config.margin));
        }

        Ok(Self {
            title: title.into(),
            rows,
            cols,
            traces: Vec::new(),
            limits,
            trace_counter: 0,
        })
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn trace(&self, id: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.id == id)
    }

    fn trace_mut(&mut self, id: &str) -> Result<&mut Trace, PageError> {
        self.traces
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PageError::UnknownTrace(id.to_string()))
    }

    pub fn all_limits(&self) -> &[AxisLimits] {
        &self.limits
    }

    pub fn limits(&self, axis: usize, direction: AxisDirection, side: YSide) -> Option<&AxisLimits> {
        self.limits
            .iter()
            .find(|l| l.axis == axis && l.direction == direction && l.side == side)
    }

    fn limits_mut(
        &mut self,
        axis: usize,
        direction: AxisDirection,
        side: YSide,
    ) -> Result<&mut AxisLimits, PageError> {
        let cells = self.cells();
        self.limits
            .iter_mut()
            .find(|l| l.axis == axis && l.direction == direction && l.side == side)
            .ok_or(PageError::AxisOutOfRange { axis, cells })
    }

    fn check_axis(&self, axis: usize) -> Result<(), PageError> {
        if axis >= self.cells() {
            return Err(PageError::AxisOutOfRange {
                axis,
                cells: self.cells(),
            });
        }
        Ok(())
    }

    /// Recompute every unpinned limit that covers the given cell
    fn autoscale_axis(&mut self, axis: usize, config: &AutoscaleConfig) {
        for idx in 0..self.limits.len() {
            if self.limits[idx].axis == axis && self.limits[idx].auto {
                self.autoscale_limit(idx, config);
            }
        }
    }

    fn autoscale_limit(&mut self, idx: usize, config: &AutoscaleConfig) {
        let limit = &self.limits[idx];
        let effective = AutoscaleConfig {
            margin: limit.margin,
            nice_rounding: config.nice_rounding,
        };
        let traces = self.traces.iter().filter(|t| limit.covers(t));

        if let Some((min, max)) = compute_limits(limit.direction, traces, &effective) {
            let limit = &mut self.limits[idx];
            limit.min = min;
            limit.max = max;
            tracing::debug!(
                "Autoscaled axis {} {:?}/{:?} to [{}, {}]",
                limit.axis,
                limit.direction,
                limit.side,
                min,
                max
            );
        }
    }

    /// Plot `y_variable` of `dataset` in cell `axis`; returns the new trace id
    pub fn add_trace(
        &mut self,
        dataset: &Dataset,
        x_source: XSource,
        y_variable: &str,
        axis: usize,
        side: YSide,
        config: &AutoscaleConfig,
    ) -> Result<String, PageError> {
        self.check_axis(axis)?;

        let id = format!("t_{}", self.trace_counter + 1);
        let mut trace = Trace::from_dataset(id.clone(), dataset, x_source, y_variable)?;
        trace.axis = axis;
        trace.side = side;

        self.trace_counter += 1;
        self.traces.push(trace);
        self.autoscale_axis(axis, config);
        Ok(id)
    }

    pub fn remove_trace(&mut self, id: &str, config: &AutoscaleConfig) -> Result<Trace, PageError> {
        let pos = self
            .traces
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| PageError::UnknownTrace(id.to_string()))?;
        let trace = self.traces.remove(pos);
        self.autoscale_axis(trace.axis, config);
        Ok(trace)
    }

    /// Drop every trace plotted from `dataset` and autoscale the cells they left
    pub fn remove_dataset_traces(&mut self, dataset: &str, config: &AutoscaleConfig) -> Vec<Trace> {
        let (removed, kept): (Vec<Trace>, Vec<Trace>) = std::mem::take(&mut self.traces)
            .into_iter()
            .partition(|t| t.dataset == dataset);
        self.traces = kept;

        let mut axes: Vec<usize> = removed.iter().map(|t| t.axis).collect();
        axes.sort_unstable();
        axes.dedup();
        for axis in axes {
            self.autoscale_axis(axis, config);
        }
        removed
    }

    /// Move a trace to another cell or side
    pub fn move_trace(
        &mut self,
        id: &str,
        axis: usize,
        side: YSide,
        config: &AutoscaleConfig,
    ) -> Result<(), PageError> {
        self.check_axis(axis)?;
        let trace = self.trace_mut(id)?;
        let previous = trace.axis;
        trace.axis = axis;
        trace.side = side;

        self.autoscale_axis(previous, config);
        if previous != axis {
            self.autoscale_axis(axis, config);
        }
        Ok(())
    }

    pub fn set_scaling(
        &mut self,
        id: &str,
        direction: AxisDirection,
        factor: f64,
        offset: f64,
        config: &AutoscaleConfig,
    ) -> Result<(), PageError> {
        let trace = self.trace_mut(id)?;
        trace.set_scaling(direction, factor, offset)?;
        let axis = trace.axis;
        self.autoscale_axis(axis, config);
        Ok(())
    }

    pub fn set_transform(
        &mut self,
        id: &str,
        kind: TransformKind,
        config: &AutoscaleConfig,
    ) -> Result<(), PageError> {
        let trace = self.trace_mut(id)?;
        trace.set_transform(kind);
        let axis = trace.axis;
        self.autoscale_axis(axis, config);
        Ok(())
    }

    /// Cosmetic changes; limits are not touched
    pub fn set_style(
        &mut self,
        id: &str,
        label: Option<String>,
        color: Option<String>,
        line_width: Option<f64>,
    ) -> Result<(), PageError> {
        let trace = self.trace_mut(id)?;
        if let Some(label) = label {
            trace.label = label;
        }
        if color.is_some() {
            trace.color = color;
        }
        if let Some(width) = line_width {
            trace.line_width = width;
        }
        Ok(())
    }

    /// Re-snapshot every trace built from `dataset` and autoscale their cells.
    ///
    /// Traces whose variables disappeared keep their old snapshot; their
    /// errors are returned.
    pub fn reload_dataset(
        &mut self,
        dataset: &Dataset,
        config: &AutoscaleConfig,
    ) -> Vec<(String, TraceError)> {
        let mut errors = Vec::new();
        let mut touched = Vec::new();

        for trace in self.traces.iter_mut().filter(|t| t.dataset == dataset.name) {
            match trace.refresh_raw(dataset) {
                Ok(()) => touched.push(trace.axis),
                Err(e) => {
                    tracing::warn!("Could not refresh trace '{}': {}", trace.id, e);
                    errors.push((trace.id.clone(), e));
                }
            }
        }

        touched.sort_unstable();
        touched.dedup();
        for axis in touched {
            self.autoscale_axis(axis, config);
        }
        errors
    }

    /// Fix limits and stop autoscaling that axis
    pub fn pin_limits(
        &mut self,
        axis: usize,
        direction: AxisDirection,
        side: YSide,
        min: f64,
        max: f64,
    ) -> Result<(), PageError> {
        let limit = self.limits_mut(axis, direction, side)?;
        limit.min = min.min(max);
        limit.max = max.max(min);
        limit.auto = false;
        Ok(())
    }

    /// Re-enable autoscaling for one axis and autoscale it immediately
    pub fn set_auto(
        &mut self,
        axis: usize,
        direction: AxisDirection,
        side: YSide,
        config: &AutoscaleConfig,
    ) -> Result<(), PageError> {
        let cells = self.cells();
        let idx = self
            .limits
            .iter()
            .position(|l| l.axis == axis && l.direction == direction && l.side == side)
            .ok_or(PageError::AxisOutOfRange { axis, cells })?;
        self.limits[idx].auto = true;
        self.autoscale_limit(idx, config);
        Ok(())
    }

    /// Autoscale every unpinned axis of the page
    pub fn autoscale_all(&mut self, config: &AutoscaleConfig) {
        for axis in 0..self.cells() {
            self.autoscale_axis(axis, config);
        }
    }

    /// Rebuild display buffers, e.g. after loading a project
    pub fn render_all(&mut self) {
        for trace in &mut self.traces {
            trace.render();
        }
    }
}
