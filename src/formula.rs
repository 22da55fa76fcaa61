//! Formula definitions and the file-backed formula list.
//!
//! The list is ordered: evaluation follows declaration order, so a formula may
//! reference the result of any formula declared before it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::normalize::is_reserved_name;
use crate::settings::Settings;

/// Errors raised by [`FormulaStore`]
#[derive(Debug, Error)]
pub enum FormulaStoreError {
    #[error("Failed to access formula file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse formula file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize formulas: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("A formula named '{0}' already exists")]
    DuplicateName(String),

    #[error("Formula not found: {0}")]
    NotFound(String),

    #[error("Result name must not be empty")]
    EmptyName,

    #[error("Result name '{0}' is reserved for generated identifiers")]
    ReservedName(String),

    #[error("Expression for '{0}' must not be empty")]
    EmptyExpression(String),

    #[error("No formula file location is configured")]
    NoPath,
}

/// A user-defined derived quantity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormulaDefinition {
    /// Name the result is stored under
    #[serde(alias = "name")]
    pub result_name: String,
    #[serde(default)]
    pub unit: String,
    /// Expression text as entered, using display names
    pub expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FormulaDefinition {
    pub fn new(
        result_name: impl Into<String>,
        unit: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            result_name: result_name.into(),
            unit: unit.into(),
            expression: expression.into(),
            enabled: true,
        }
    }

    fn check(&self) -> Result<(), FormulaStoreError> {
        if self.result_name.trim().is_empty() {
            return Err(FormulaStoreError::EmptyName);
        }
        if is_reserved_name(&self.result_name) {
            return Err(FormulaStoreError::ReservedName(self.result_name.clone()));
        }
        if self.expression.trim().is_empty() {
            return Err(FormulaStoreError::EmptyExpression(self.result_name.clone()));
        }
        Ok(())
    }
}

/// Parse a formula file body (an ordered JSON list of definitions)
pub fn parse_definitions(content: &str) -> Result<Vec<FormulaDefinition>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Render definitions in the on-disk format
pub fn render_definitions(definitions: &[FormulaDefinition]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(definitions)
}

fn read_definitions(path: &Path) -> Result<Vec<FormulaDefinition>, FormulaStoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| FormulaStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_definitions(&content).map_err(|source| FormulaStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_definitions(path: &Path, definitions: &[FormulaDefinition]) -> Result<(), FormulaStoreError> {
    let io_error = |source| FormulaStoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let content = render_definitions(definitions)?;
    std::fs::write(path, content).map_err(io_error)
}

/// Ordered formula list with optional file persistence
#[derive(Clone, Debug, Default)]
pub struct FormulaStore {
    definitions: Vec<FormulaDefinition>,
    /// Backing file; `None` keeps the list in memory only
    path: Option<PathBuf>,
    /// Write the backing file after every change
    autosave: bool,
}

impl FormulaStore {
    /// Empty in-memory list
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list bound to `path` (nothing is read)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Default formula file inside the user config directory
    pub fn default_path() -> Option<PathBuf> {
        Settings::get_config_dir().map(|p| p.join("formulas.json"))
    }

    /// Load definitions from `path`, which becomes the backing file
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, FormulaStoreError> {
        let path = path.into();
        let definitions = read_definitions(&path)?;
        tracing::info!("Loaded {} formulas from {:?}", definitions.len(), path);
        Ok(Self {
            definitions,
            path: Some(path),
            autosave: false,
        })
    }

    /// Load from `path`, falling back to an empty list bound to the same path
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            tracing::info!("Formula file {:?} not found, using empty list", path);
            return Self::with_path(path);
        }

        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("{}", e);
                Self::with_path(path)
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn autosave(&self) -> bool {
        self.autosave
    }

    pub fn set_autosave(&mut self, autosave: bool) {
        self.autosave = autosave;
    }

    pub fn definitions(&self) -> &[FormulaDefinition] {
        &self.definitions
    }

    pub fn get(&self, result_name: &str) -> Option<&FormulaDefinition> {
        self.definitions.iter().find(|d| d.result_name == result_name)
    }

    fn position(&self, result_name: &str) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.result_name == result_name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Append a definition; result names are unique within the list
    pub fn add(&mut self, definition: FormulaDefinition) -> Result<(), FormulaStoreError> {
        definition.check()?;
        if self.position(&definition.result_name).is_some() {
            return Err(FormulaStoreError::DuplicateName(definition.result_name));
        }
        self.definitions.push(definition);
        self.autosave_now();
        Ok(())
    }

    /// Replace the definition named `result_name`, keeping its position
    pub fn update(
        &mut self,
        result_name: &str,
        definition: FormulaDefinition,
    ) -> Result<(), FormulaStoreError> {
        definition.check()?;
        let idx = self
            .position(result_name)
            .ok_or_else(|| FormulaStoreError::NotFound(result_name.to_string()))?;

        if definition.result_name != result_name && self.position(&definition.result_name).is_some() {
            return Err(FormulaStoreError::DuplicateName(definition.result_name));
        }

        self.definitions[idx] = definition;
        self.autosave_now();
        Ok(())
    }

    pub fn remove(&mut self, result_name: &str) -> Result<FormulaDefinition, FormulaStoreError> {
        let idx = self
            .position(result_name)
            .ok_or_else(|| FormulaStoreError::NotFound(result_name.to_string()))?;
        let removed = self.definitions.remove(idx);
        self.autosave_now();
        Ok(removed)
    }

    /// Append definitions whose result names are not yet present.
    ///
    /// Returns how many were added; duplicates and invalid entries are skipped.
    pub fn merge(&mut self, incoming: Vec<FormulaDefinition>) -> usize {
        let mut added = 0;
        for definition in incoming {
            if definition.check().is_err() || self.position(&definition.result_name).is_some() {
                tracing::debug!("Skipping imported formula '{}'", definition.result_name);
                continue;
            }
            self.definitions.push(definition);
            added += 1;
        }
        if added > 0 {
            self.autosave_now();
        }
        added
    }

    /// Merge definitions from another formula file
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<usize, FormulaStoreError> {
        let incoming = read_definitions(path.as_ref())?;
        let total = incoming.len();
        let added = self.merge(incoming);
        tracing::info!(
            "Imported {} of {} formulas from {:?} (duplicates skipped)",
            added,
            total,
            path.as_ref()
        );
        Ok(added)
    }

    /// Write the current list to an arbitrary file
    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<(), FormulaStoreError> {
        write_definitions(path.as_ref(), &self.definitions)?;
        tracing::info!("Exported {} formulas to {:?}", self.len(), path.as_ref());
        Ok(())
    }

    /// Write the list to its backing file
    pub fn save(&self) -> Result<(), FormulaStoreError> {
        let path = self.path.as_deref().ok_or(FormulaStoreError::NoPath)?;
        write_definitions(path, &self.definitions)?;
        tracing::info!("Saved {} formulas to {:?}", self.len(), path);
        Ok(())
    }

    fn autosave_now(&self) {
        if !self.autosave || self.path.is_none() {
            return;
        }
        if let Err(e) = self.save() {
            tracing::error!("Failed to autosave formulas: {}", e);
        }
    }
}
