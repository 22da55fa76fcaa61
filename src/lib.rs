//! SPlot - data plotting core with user formulas and consistent autoscaling
//!
//! This library imports tabular data, derives new variables from user-entered
//! formulas, and keeps plotted traces and their axis limits consistent with
//! per-trace scaling and transforms.
//!
//! ## Module Structure
//!
//! - [`store`] - Datasets and their named variables
//! - [`normalize`] - Display name to evaluator identifier mapping
//! - [`expression`] - Restricted arithmetic expression evaluator
//! - [`engine`] - Ordered formula recalculation with per-formula outcomes
//! - [`formula`] - Formula definitions and the formula file
//! - [`transform`] - Factor/offset and nonlinear trace transforms
//! - [`trace`] - Plotted traces with raw data snapshots
//! - [`page`] - Chart grids, axis limits and the autoscale trigger policy
//! - [`autoscale`] - Axis range computation
//! - [`project`] - Compressed session files
//! - [`importer`] - CSV/TSV/DAT and JSON importers
//! - [`settings`] - User settings persistence
//! - [`app`] - The workspace tying everything together

pub mod app;
pub mod autoscale;
pub mod engine;
pub mod expression;
pub mod formula;
pub mod importer;
pub mod normalize;
pub mod page;
pub mod project;
pub mod settings;
pub mod store;
pub mod trace;
pub mod transform;
