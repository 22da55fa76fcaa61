//! Data file importers.
//!
//! Every importer turns a file into an [`ImportedTable`]: named columns of
//! equal length with an optional unit. Cells that are not numbers become NaN.
//! [`ImportManager`] picks an importer by file extension.

use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::{Dataset, StoreError, Variable};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No importer registered for extension '{0}'")]
    UnsupportedExtension(String),

    #[error("File has no header row")]
    MissingHeader,

    #[error("Invalid JSON table: {0}")]
    Json(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Options shared by all importers; each importer reads what it needs
#[derive(Clone, Debug, PartialEq)]
pub struct ImportOptions {
    /// Field separator; the importer default when `None`
    pub delimiter: Option<char>,
    /// The second row of a delimited file holds units
    pub unit_row: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            unit_row: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub unit: String,
    pub values: Vec<f64>,
}

/// Result of an import: equally long columns
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedTable {
    pub name: String,
    pub columns: Vec<Column>,
}

impl ImportedTable {
    pub fn len(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Convert into a dataset of imported variables
    pub fn into_dataset(self, source: Option<PathBuf>) -> Result<Dataset, ImportError> {
        let mut dataset = Dataset::new(self.name);
        dataset.source = source;
        for column in self.columns {
            dataset.insert(Variable::imported(column.name, column.unit, column.values))?;
        }
        Ok(dataset)
    }
}

/// Parse one cell; anything that is not a number is NaN
fn parse_cell(cell: &str) -> f64 {
    let cell = cell.trim().trim_matches('"').trim();
    cell.parse::<f64>().unwrap_or(f64::NAN)
}

/// Make column names unique by appending `.1`, `.2`, ...
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.is_empty() {
                format!("column_{}", i)
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Split a line on `delimiter`, honouring double-quoted fields
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// A file format that can be turned into an [`ImportedTable`]
pub trait Importer {
    /// Lower-case extensions without the dot
    fn extensions(&self) -> &[&'static str];

    fn description(&self) -> &str;

    fn import_str(&self, content: &str, options: &ImportOptions) -> Result<ImportedTable, ImportError>;

    /// Read `path` and import it; the table is named after the file
    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportedTable, ImportError> {
        let content = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut table = self.import_str(&content, options)?;
        table.name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(table)
    }
}

/// CSV, TSV and DAT files: a name row, an optional unit row, then data
pub struct DelimitedImporter {
    delimiter: char,
    extensions: &'static [&'static str],
    description: &'static str,
}

impl DelimitedImporter {
    pub fn csv() -> Self {
        Self {
            delimiter: ',',
            extensions: &["csv", "dat"],
            description: "CSV/DAT Files",
        }
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: '\t',
            extensions: &["tsv"],
            description: "Tab-Separated Values",
        }
    }
}

impl Importer for DelimitedImporter {
    fn extensions(&self) -> &[&'static str] {
        self.extensions
    }

    fn description(&self) -> &str {
        self.description
    }

    fn import_str(&self, content: &str, options: &ImportOptions) -> Result<ImportedTable, ImportError> {
        let delimiter = options.delimiter.unwrap_or(self.delimiter);
        let content = content.trim_start_matches('\u{feff}');
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or(ImportError::MissingHeader)?;
        let names = dedupe_names(split_fields(header, delimiter));
        let width = names.len();

        let mut units = vec![String::new(); width];
        if options.unit_row {
            if let Some(line) = lines.next() {
                for (slot, unit) in units.iter_mut().zip(split_fields(line, delimiter)) {
                    *slot = unit;
                }
            }
        }

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); width];
        for (row, line) in lines.enumerate() {
            let fields = split_fields(line, delimiter);
            if fields.len() > width {
                tracing::warn!(
                    "Row {} has {} fields, ignoring the last {}",
                    row + 1,
                    fields.len(),
                    fields.len() - width
                );
            }
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(fields.get(i).map(|f| parse_cell(f)).unwrap_or(f64::NAN));
            }
        }

        let columns = names
            .into_iter()
            .zip(units)
            .zip(columns)
            .map(|((name, unit), values)| Column { name, unit, values })
            .collect();

        Ok(ImportedTable {
            name: String::new(),
            columns,
        })
    }
}

/// JSON tables: a list of records, or an object of columns
pub struct JsonImporter;

fn json_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        JsonValue::String(s) => parse_cell(s),
        JsonValue::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

impl JsonImporter {
    fn from_records(records: &[JsonValue]) -> Result<Vec<Column>, ImportError> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let object = record
                .as_object()
                .ok_or_else(|| ImportError::Json("records must be objects".to_string()))?;
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        Ok(names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).map(json_number).unwrap_or(f64::NAN))
                    .collect();
                Column {
                    name,
                    unit: String::new(),
                    values,
                }
            })
            .collect())
    }

    fn from_columns(
        object: &serde_json::Map<String, JsonValue>,
    ) -> Result<Vec<Column>, ImportError> {
        let mut columns = Vec::with_capacity(object.len());
        for (name, column) in object {
            let values: Vec<f64> = match column {
                JsonValue::Array(items) => items.iter().map(json_number).collect(),
                // {"0": 1.0, "1": 2.0}: order by the numeric key
                JsonValue::Object(cells) => {
                    let mut indexed: Vec<(usize, f64)> = cells
                        .iter()
                        .map(|(k, v)| (k.parse::<usize>().unwrap_or(usize::MAX), json_number(v)))
                        .collect();
                    indexed.sort_by_key(|(k, _)| *k);
                    indexed.into_iter().map(|(_, v)| v).collect()
                }
                _ => {
                    return Err(ImportError::Json(format!(
                        "column '{}' must be an array or object",
                        name
                    )))
                }
            };
            columns.push(Column {
                name: name.clone(),
                unit: String::new(),
                values,
            });
        }

        // Pad short columns so the table stays rectangular
        let len = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut columns {
            column.values.resize(len, f64::NAN);
        }
        Ok(columns)
    }
}

impl Importer for JsonImporter {
    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    fn description(&self) -> &str {
        "JSON Files"
    }

    fn import_str(&self, content: &str, _options: &ImportOptions) -> Result<ImportedTable, ImportError> {
        let value: JsonValue =
            serde_json::from_str(content).map_err(|e| ImportError::Json(e.to_string()))?;

        let columns = match &value {
            JsonValue::Array(records) => Self::from_records(records)?,
            JsonValue::Object(object) => Self::from_columns(object)?,
            _ => {
                return Err(ImportError::Json(
                    "expected a list of records or an object of columns".to_string(),
                ))
            }
        };

        Ok(ImportedTable {
            name: String::new(),
            columns,
        })
    }
}

/// Extension-keyed importer registry
pub struct ImportManager {
    importers: Vec<Box<dyn Importer>>,
}

impl Default for ImportManager {
    fn default() -> Self {
        let mut manager = Self {
            importers: Vec::new(),
        };
        manager.register(Box::new(DelimitedImporter::csv()));
        manager.register(Box::new(DelimitedImporter::tsv()));
        manager.register(Box::new(JsonImporter));
        manager
    }
}

impl ImportManager {
    /// Registry with the built-in CSV/DAT, TSV and JSON importers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an importer; later registrations win for shared extensions
    pub fn register(&mut self, importer: Box<dyn Importer>) {
        self.importers.insert(0, importer);
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .importers
            .iter()
            .flat_map(|i| i.extensions().iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions.dedup();
        extensions
    }

    pub fn importer_for(&self, path: &Path) -> Result<&dyn Importer, ImportError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        self.importers
            .iter()
            .find(|i| i.extensions().contains(&extension.as_str()))
            .map(|i| i.as_ref())
            .ok_or(ImportError::UnsupportedExtension(extension))
    }

    /// Import `path` into a dataset named after the file
    pub fn import(&self, path: &Path, options: &ImportOptions) -> Result<Dataset, ImportError> {
        let importer = self.importer_for(path)?;
        let table = importer.import(path, options)?;
        tracing::info!(
            "Imported {:?} with {} ({} columns, {} rows)",
            path,
            importer.description(),
            table.columns.len(),
            table.len()
        );
        table.into_dataset(Some(path.to_path_buf()))
    }
}
