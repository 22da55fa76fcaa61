//! Tests for importing files from disk
//!
//! Tests cover:
//! - Delimited files with unit rows
//! - JSON tables
//! - Extension dispatch

use crate::common::assertions::assert_equal_lengths;
use crate::common::{scratch_dir, synthetic, write_file};
use splot::importer::{ImportError, ImportManager, ImportOptions};
use splot::store::Provenance;

#[test]
fn test_csv_import_has_units_and_equal_lengths() {
    let dir = scratch_dir("import-csv");
    let content = synthetic::csv_with_units(
        &["time", "Engine Speed", "温度[°C]"],
        &["s", "rpm", "°C"],
        &[&[0.0, 1000.0, 20.5], &[0.1, 1100.0, 20.6], &[0.2, 1200.0, 20.7]],
    );
    let path = write_file(&dir, "run.csv", content);

    let ds = ImportManager::new().import(&path, &ImportOptions::default()).unwrap();
    assert_eq!(ds.name, "run.csv");
    assert_eq!(ds.source.as_deref(), Some(path.as_path()));
    assert_eq!(ds.len(), 3);
    assert_equal_lengths(&ds);

    let temp = ds.get("温度[°C]").unwrap();
    assert_eq!(temp.unit, "°C");
    assert_eq!(temp.values, vec![20.5, 20.6, 20.7]);
    assert!(ds.variables().iter().all(|v| v.provenance == Provenance::Imported));
}

#[test]
fn test_non_numeric_cells_become_nan() {
    let dir = scratch_dir("import-nan");
    let path = write_file(&dir, "log.dat", "a,b\nV,A\n1,x\n,2\n");

    let ds = ImportManager::new().import(&path, &ImportOptions::default()).unwrap();
    let a = &ds.get("a").unwrap().values;
    let b = &ds.get("b").unwrap().values;
    assert_eq!(a[0], 1.0);
    assert!(a[1].is_nan());
    assert!(b[0].is_nan());
    assert_eq!(b[1], 2.0);
}

#[test]
fn test_tsv_import() {
    let dir = scratch_dir("import-tsv");
    let path = write_file(&dir, "log.tsv", "x\ty\nm\tm\n1\t2\n3\t4\n");

    let ds = ImportManager::new().import(&path, &ImportOptions::default()).unwrap();
    assert_eq!(ds.get("y").unwrap().values, vec![2.0, 4.0]);
}

#[test]
fn test_json_import() {
    let dir = scratch_dir("import-json");
    let path = write_file(&dir, "table.json", r#"{"t": [0, 1, 2], "v": [5, null, "7"]}"#);

    let ds = ImportManager::new().import(&path, &ImportOptions::default()).unwrap();
    assert_equal_lengths(&ds);
    let v = &ds.get("v").unwrap().values;
    assert_eq!(v[0], 5.0);
    assert!(v[1].is_nan());
    assert_eq!(v[2], 7.0);
}

#[test]
fn test_unsupported_extension() {
    let dir = scratch_dir("import-xlsx");
    let path = write_file(&dir, "book.xlsx", "binary");
    assert!(matches!(
        ImportManager::new().import(&path, &ImportOptions::default()),
        Err(ImportError::UnsupportedExtension(ext)) if ext == "xlsx"
    ));
}

#[test]
fn test_missing_file() {
    let dir = scratch_dir("import-missing");
    assert!(matches!(
        ImportManager::new().import(&dir.path().join("gone.csv"), &ImportOptions::default()),
        Err(ImportError::Io { .. })
    ));
}

#[test]
fn test_empty_file() {
    let dir = scratch_dir("import-empty");
    let path = write_file(&dir, "empty.csv", "");
    assert!(matches!(
        ImportManager::new().import(&path, &ImportOptions::default()),
        Err(ImportError::MissingHeader)
    ));
}
