//! Loaded datasets and their named variables.
//!
//! Every imported file becomes a [`Dataset`]: an ordered set of equally long
//! numeric sequences, each with a display name and a unit. Formula results are
//! written back into the same dataset with [`Provenance::Derived`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when mutating a dataset
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A variable does not match the dataset length
    #[error("Variable '{name}' has {got} values but dataset '{dataset}' has {expected}")]
    LengthMismatch {
        dataset: String,
        name: String,
        expected: usize,
        got: usize,
    },

    /// Derived data would overwrite an imported variable
    #[error("Variable '{0}' is imported and cannot be overwritten by a derived value")]
    ImportedOverwrite(String),

    /// A stored dataset lists the same variable twice
    #[error("Variable '{name}' appears more than once in dataset '{dataset}'")]
    DuplicateVariable { dataset: String, name: String },

    /// Lookup of an unknown dataset
    #[error("Dataset not found: {0}")]
    UnknownDataset(String),
}

/// Where a variable came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Imported,
    Derived,
}

/// A named numeric sequence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub values: Vec<f64>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl Variable {
    pub fn imported(name: impl Into<String>, unit: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            values,
            provenance: Provenance::Imported,
        }
    }

    pub fn derived(name: impl Into<String>, unit: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            values,
            provenance: Provenance::Derived,
        }
    }

    pub fn is_derived(&self) -> bool {
        self.provenance == Provenance::Derived
    }
}

/// One loaded file: variables sharing a common length
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "DatasetRecord", into = "DatasetRecord")]
pub struct Dataset {
    /// Display name (file base name)
    pub name: String,
    /// Path the data was imported from, if any
    pub source: Option<PathBuf>,
    variables: Vec<Variable>,
    /// name -> position in `variables`
    lookup: HashMap<String, usize>,
}

/// Serialized shape of a dataset; loading re-checks every invariant
#[derive(Serialize, Deserialize)]
struct DatasetRecord {
    name: String,
    #[serde(default)]
    source: Option<PathBuf>,
    #[serde(default)]
    variables: Vec<Variable>,
}

impl TryFrom<DatasetRecord> for Dataset {
    type Error = StoreError;

    fn try_from(record: DatasetRecord) -> Result<Self, Self::Error> {
        let mut dataset = Dataset::new(record.name);
        dataset.source = record.source;
        for variable in record.variables {
            if dataset.contains(&variable.name) {
                return Err(StoreError::DuplicateVariable {
                    dataset: dataset.name,
                    name: variable.name,
                });
            }
            dataset.insert(variable)?;
        }
        Ok(dataset)
    }
}

impl From<Dataset> for DatasetRecord {
    fn from(dataset: Dataset) -> Self {
        Self {
            name: dataset.name,
            source: dataset.source,
            variables: dataset.variables,
        }
    }
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of samples per variable (0 for an empty dataset)
    pub fn len(&self) -> usize {
        self.variables.first().map(|v| v.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Variables in insertion order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Display names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.lookup.get(name).map(|&idx| &self.variables[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// True if `name` exists and was imported (not produced by a formula)
    pub fn is_imported(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| v.provenance == Provenance::Imported)
            .unwrap_or(false)
    }

    /// The implicit `0..N` index coordinate
    pub fn index_values(&self) -> Vec<f64> {
        (0..self.len()).map(|i| i as f64).collect()
    }

    /// Insert or wholesale-replace a variable.
    ///
    /// The first variable fixes the dataset length; later ones must match it.
    /// A derived variable may never replace an imported one.
    pub fn insert(&mut self, variable: Variable) -> Result<(), StoreError> {
        if !self.variables.is_empty() && variable.values.len() != self.len() {
            // Replacing the only variable may change the length
            let replacing_only = self.variables.len() == 1 && self.contains(&variable.name);
            if !replacing_only {
                return Err(StoreError::LengthMismatch {
                    dataset: self.name.clone(),
                    name: variable.name.clone(),
                    expected: self.len(),
                    got: variable.values.len(),
                });
            }
        }

        match self.lookup.get(&variable.name) {
            Some(&idx) => {
                if variable.is_derived() && !self.variables[idx].is_derived() {
                    return Err(StoreError::ImportedOverwrite(variable.name));
                }
                self.variables[idx] = variable;
            }
            None => {
                self.lookup.insert(variable.name.clone(), self.variables.len());
                self.variables.push(variable);
            }
        }
        Ok(())
    }
}

/// All loaded datasets, keyed by name and kept in load order
#[derive(Clone, Debug, Default)]
pub struct VariableStore {
    datasets: Vec<Dataset>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_datasets(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn dataset_mut(&mut self, name: &str) -> Result<&mut Dataset, StoreError> {
        self.datasets
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| StoreError::UnknownDataset(name.to_string()))
    }

    /// Add a dataset, replacing any dataset with the same name
    pub fn insert(&mut self, dataset: Dataset) {
        match self.datasets.iter().position(|d| d.name == dataset.name) {
            Some(pos) => self.datasets[pos] = dataset,
            None => self.datasets.push(dataset),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Dataset> {
        let pos = self.datasets.iter().position(|d| d.name == name)?;
        Some(self.datasets.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
