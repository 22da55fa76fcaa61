//! The workspace: loaded data, formulas, pages and settings in one place.
//!
//! [`Workspace`] owns every component explicitly and wires the control flow:
//! import, optional formula recalculation, plotting, transforms with
//! autoscale, and project save/load.

use std::path::Path;
use thiserror::Error;

use crate::autoscale::{AutoscaleConfig, AxisDirection};
use crate::engine::{self, EvaluationReport, FormulaError};
use crate::formula::{FormulaDefinition, FormulaStore, FormulaStoreError};
use crate::importer::{ImportError, ImportManager, ImportOptions};
use crate::page::{Page, PageError};
use crate::project::{self, ProjectError, ProjectState};
use crate::settings::Settings;
use crate::store::{Dataset, StoreError, VariableStore};
use crate::trace::{TraceError, XSource, YSide};
use crate::transform::TransformKind;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    FormulaStore(#[from] FormulaStoreError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("Page {index} does not exist ({count} pages)")]
    UnknownPage { index: usize, count: usize },
}

/// A plotted trace that could not follow a data change.
///
/// It still shows its previous snapshot until the variable comes back or the
/// trace is removed.
#[derive(Debug)]
pub struct StaleTrace {
    pub page: usize,
    pub trace_id: String,
    pub error: TraceError,
}

/// Result of importing or exchanging one file
#[derive(Debug)]
pub struct ImportOutcome {
    pub dataset: String,
    /// Present when formulas were run right after the import
    pub report: Option<EvaluationReport>,
    pub stale_traces: Vec<StaleTrace>,
}

/// Result of running the formula list against one dataset
#[derive(Debug)]
pub struct Recalculation {
    pub report: EvaluationReport,
    pub stale_traces: Vec<StaleTrace>,
}

pub struct Workspace {
    settings: Settings,
    store: VariableStore,
    formulas: FormulaStore,
    pages: Vec<Page>,
    current_page: usize,
    importers: ImportManager,
}

impl Workspace {
    /// Workspace using the formula file named by `settings`
    pub fn new(settings: Settings) -> Self {
        let formulas = match settings.formula_path() {
            Some(path) => FormulaStore::load_or_default(path),
            None => {
                tracing::warn!("Could not determine config directory for the formula file");
                FormulaStore::new()
            }
        };
        Self::with_formulas(settings, formulas)
    }

    /// Workspace with an explicit formula list
    pub fn with_formulas(settings: Settings, mut formulas: FormulaStore) -> Self {
        formulas.set_autosave(settings.autosave_formulas);
        let config = settings.autoscale_config();

        let mut workspace = Self {
            settings,
            store: VariableStore::new(),
            formulas,
            pages: Vec::new(),
            current_page: 0,
            importers: ImportManager::new(),
        };
        if let Ok(page) = Page::new("Page 1", 1, 1, &config) {
            workspace.pages.push(page);
        }
        workspace
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn autoscale_config(&self) -> AutoscaleConfig {
        self.settings.autoscale_config()
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.store.dataset(name)
    }

    pub fn formulas(&self) -> &FormulaStore {
        &self.formulas
    }

    pub fn importers_mut(&mut self) -> &mut ImportManager {
        &mut self.importers
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_page_index(&self) -> usize {
        self.current_page
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.current_page)
    }

    fn page_mut(&mut self, index: usize) -> Result<&mut Page, WorkspaceError> {
        let count = self.pages.len();
        self.pages
            .get_mut(index)
            .ok_or(WorkspaceError::UnknownPage { index, count })
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Import a file, replacing any dataset of the same name.
    ///
    /// Traces built from a replaced dataset are re-snapshotted. Formulas run
    /// afterwards when `auto_calculate_on_import` is set.
    pub fn import_file(
        &mut self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportOutcome, WorkspaceError> {
        let dataset = self.importers.import(path, options)?;
        self.install_dataset(dataset)
    }

    /// Add an already built dataset (same rules as [`Workspace::import_file`])
    pub fn add_dataset(&mut self, dataset: Dataset) -> Result<ImportOutcome, WorkspaceError> {
        self.install_dataset(dataset)
    }

    /// Drop a dataset together with every trace plotted from it
    pub fn close_dataset(&mut self, name: &str) -> Result<Dataset, WorkspaceError> {
        let dataset = self
            .store
            .remove(name)
            .ok_or_else(|| StoreError::UnknownDataset(name.to_string()))?;
        let config = self.autoscale_config();
        let removed: usize = self
            .pages
            .iter_mut()
            .map(|page| page.remove_dataset_traces(name, &config).len())
            .sum();
        tracing::info!("Closed dataset '{}' and {} of its traces", name, removed);
        Ok(dataset)
    }

    /// Replace the data behind `name` with the contents of `path`, keeping
    /// the dataset name so existing traces follow the new data
    pub fn exchange_data(
        &mut self,
        name: &str,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportOutcome, WorkspaceError> {
        if self.store.dataset(name).is_none() {
            return Err(StoreError::UnknownDataset(name.to_string()).into());
        }
        let mut dataset = self.importers.import(path, options)?;
        tracing::info!("Exchanging data of '{}' with {:?}", name, path);
        dataset.name = name.to_string();
        self.install_dataset(dataset)
    }

    fn install_dataset(&mut self, dataset: Dataset) -> Result<ImportOutcome, WorkspaceError> {
        let name = dataset.name.clone();
        self.store.insert(dataset);

        let (report, stale_traces) =
            if self.settings.auto_calculate_on_import && !self.formulas.is_empty() {
                let recalculation = self.calculate_formulas(&name)?;
                (Some(recalculation.report), recalculation.stale_traces)
            } else {
                (None, self.reload_traces(&name))
            };
        Ok(ImportOutcome {
            dataset: name,
            report,
            stale_traces,
        })
    }

    fn reload_traces(&mut self, dataset_name: &str) -> Vec<StaleTrace> {
        let config = self.autoscale_config();
        let Some(dataset) = self.store.dataset(dataset_name) else {
            return Vec::new();
        };
        self.pages
            .iter_mut()
            .enumerate()
            .flat_map(|(page, p)| {
                p.reload_dataset(dataset, &config)
                    .into_iter()
                    .map(move |(trace_id, error)| StaleTrace {
                        page,
                        trace_id,
                        error,
                    })
            })
            .collect()
    }

    // ========================================================================
    // Formulas
    // ========================================================================

    /// Run the formula list against one dataset ("Calc Now")
    pub fn calculate_formulas(&mut self, dataset_name: &str) -> Result<Recalculation, WorkspaceError> {
        let dataset = self.store.dataset_mut(dataset_name)?;
        let report = engine::evaluate_all(dataset, self.formulas.definitions());
        let stale_traces = self.reload_traces(dataset_name);
        Ok(Recalculation {
            report,
            stale_traces,
        })
    }

    /// Run the formula list against every loaded dataset
    pub fn calculate_all(&mut self) -> Vec<(String, Recalculation)> {
        let names: Vec<String> = self.store.datasets().iter().map(|d| d.name.clone()).collect();
        names
            .into_iter()
            .filter_map(|name| {
                self.calculate_formulas(&name)
                    .ok()
                    .map(|recalculation| (name, recalculation))
            })
            .collect()
    }

    fn check_against_datasets(&self, definition: &FormulaDefinition) -> Result<(), FormulaError> {
        for dataset in self.store.datasets() {
            engine::check_collision(dataset, definition)?;
        }
        Ok(())
    }

    /// Add a formula; names that collide with imported variables are refused
    pub fn add_formula(&mut self, definition: FormulaDefinition) -> Result<(), WorkspaceError> {
        self.check_against_datasets(&definition)?;
        self.formulas.add(definition)?;
        Ok(())
    }

    pub fn update_formula(
        &mut self,
        result_name: &str,
        definition: FormulaDefinition,
    ) -> Result<(), WorkspaceError> {
        self.check_against_datasets(&definition)?;
        self.formulas.update(result_name, definition)?;
        Ok(())
    }

    pub fn remove_formula(&mut self, result_name: &str) -> Result<FormulaDefinition, WorkspaceError> {
        Ok(self.formulas.remove(result_name)?)
    }

    pub fn import_formulas(&mut self, path: &Path) -> Result<usize, WorkspaceError> {
        Ok(self.formulas.import_file(path)?)
    }

    pub fn export_formulas(&self, path: &Path) -> Result<(), WorkspaceError> {
        Ok(self.formulas.export_file(path)?)
    }

    /// First values of a formula on a dataset, without storing anything
    pub fn preview_formula(
        &self,
        dataset_name: &str,
        definition: &FormulaDefinition,
        count: usize,
    ) -> Result<Vec<f64>, WorkspaceError> {
        let dataset = self
            .store
            .dataset(dataset_name)
            .ok_or_else(|| StoreError::UnknownDataset(dataset_name.to_string()))?;
        Ok(engine::preview(dataset, definition, count)?)
    }

    // ========================================================================
    // Pages and traces
    // ========================================================================

    /// Append a page and make it current; returns its index
    pub fn add_page(&mut self, title: &str, rows: usize, cols: usize) -> Result<usize, WorkspaceError> {
        let page = Page::new(title, rows, cols, &self.autoscale_config())?;
        self.pages.push(page);
        self.current_page = self.pages.len() - 1;
        Ok(self.current_page)
    }

    pub fn set_current_page(&mut self, index: usize) -> Result<(), WorkspaceError> {
        self.page_mut(index)?;
        self.current_page = index;
        Ok(())
    }

    /// Plot a variable on the current page; returns the trace id
    pub fn plot(
        &mut self,
        dataset_name: &str,
        x_source: XSource,
        y_variable: &str,
        axis: usize,
        side: YSide,
    ) -> Result<String, WorkspaceError> {
        let config = self.autoscale_config();
        let dataset = self
            .store
            .dataset(dataset_name)
            .ok_or_else(|| StoreError::UnknownDataset(dataset_name.to_string()))?;
        let count = self.pages.len();
        let page = self
            .pages
            .get_mut(self.current_page)
            .ok_or(WorkspaceError::UnknownPage {
                index: self.current_page,
                count,
            })?;
        Ok(page.add_trace(dataset, x_source, y_variable, axis, side, &config)?)
    }

    pub fn remove_trace(&mut self, trace_id: &str) -> Result<(), WorkspaceError> {
        let config = self.autoscale_config();
        self.page_mut(self.current_page)?.remove_trace(trace_id, &config)?;
        Ok(())
    }

    pub fn set_scaling(
        &mut self,
        trace_id: &str,
        direction: AxisDirection,
        factor: f64,
        offset: f64,
    ) -> Result<(), WorkspaceError> {
        let config = self.autoscale_config();
        self.page_mut(self.current_page)?
            .set_scaling(trace_id, direction, factor, offset, &config)?;
        Ok(())
    }

    pub fn set_transform(&mut self, trace_id: &str, kind: TransformKind) -> Result<(), WorkspaceError> {
        let config = self.autoscale_config();
        self.page_mut(self.current_page)?
            .set_transform(trace_id, kind, &config)?;
        Ok(())
    }

    pub fn move_trace(&mut self, trace_id: &str, axis: usize, side: YSide) -> Result<(), WorkspaceError> {
        let config = self.autoscale_config();
        self.page_mut(self.current_page)?
            .move_trace(trace_id, axis, side, &config)?;
        Ok(())
    }

    /// Label, color and line width; `None` keeps the current value
    pub fn set_style(
        &mut self,
        trace_id: &str,
        label: Option<String>,
        color: Option<String>,
        line_width: Option<f64>,
    ) -> Result<(), WorkspaceError> {
        self.page_mut(self.current_page)?
            .set_style(trace_id, label, color, line_width)?;
        Ok(())
    }

    /// Fix an axis of the current page; it ignores autoscale until re-enabled
    pub fn pin_limits(
        &mut self,
        axis: usize,
        direction: AxisDirection,
        side: YSide,
        min: f64,
        max: f64,
    ) -> Result<(), WorkspaceError> {
        self.page_mut(self.current_page)?
            .pin_limits(axis, direction, side, min, max)?;
        Ok(())
    }

    /// Turn autoscale back on for an axis of the current page
    pub fn set_auto(&mut self, axis: usize, direction: AxisDirection, side: YSide) -> Result<(), WorkspaceError> {
        let config = self.autoscale_config();
        self.page_mut(self.current_page)?
            .set_auto(axis, direction, side, &config)?;
        Ok(())
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Snapshot of the current session
    pub fn to_project(&self) -> ProjectState {
        ProjectState::new(
            self.store.datasets().to_vec(),
            self.pages.clone(),
            self.current_page,
        )
    }

    pub fn save_project(&self, path: &Path) -> Result<(), WorkspaceError> {
        project::save(path, &self.to_project())?;
        Ok(())
    }

    /// Replace data and pages with the contents of a project file.
    ///
    /// Formulas and settings are kept.
    pub fn load_project(&mut self, path: &Path) -> Result<(), WorkspaceError> {
        let state = project::load(path)?;
        self.apply_project(state);
        Ok(())
    }

    pub fn apply_project(&mut self, state: ProjectState) {
        self.store = VariableStore::from_datasets(state.datasets);
        self.pages = state.pages;
        self.current_page = state.current_page;

        if self.pages.is_empty() {
            if let Ok(page) = Page::new("Page 1", 1, 1, &self.autoscale_config()) {
                self.pages.push(page);
            }
            self.current_page = 0;
        }
    }
}
