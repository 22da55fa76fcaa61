//! Tests for the formula file
//!
//! Tests cover:
//! - Load/save round trips
//! - Legacy records
//! - Import/export with duplicate skipping
//! - Autosave

use crate::common::{scratch_dir, write_file};
use splot::formula::{FormulaDefinition, FormulaStore, FormulaStoreError};

// ============================================
// Persistence Tests
// ============================================

#[test]
fn test_resave_is_byte_identical() {
    let dir = scratch_dir("formulas");
    let path = dir.path().join("formulas.json");

    let mut store = FormulaStore::with_path(&path);
    store
        .add(FormulaDefinition::new("出力[kW]", "kW", "ダイナモトルク[P] * 回転数 / 9549"))
        .unwrap();
    let mut disabled = FormulaDefinition::new("Ratio", "", "a / b");
    disabled.enabled = false;
    store.add(disabled).unwrap();
    store.save().unwrap();
    let first = std::fs::read(&path).unwrap();

    let reloaded = FormulaStore::load(&path).unwrap();
    assert_eq!(reloaded.definitions(), store.definitions());
    reloaded.save().unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_legacy_file_loads() {
    let dir = scratch_dir("formulas-legacy");
    let path = write_file(
        &dir,
        "formulas.json",
        r#"[
    {"name": "Power", "unit": "W", "expression": "U * I"},
    {"name": "Half", "unit": "", "expression": "U / 2"}
]"#,
    );

    let store = FormulaStore::load(&path).unwrap();
    let names: Vec<&str> = store.definitions().iter().map(|d| d.result_name.as_str()).collect();
    assert_eq!(names, vec!["Power", "Half"]);
    assert!(store.definitions().iter().all(|d| d.enabled));
}

#[test]
fn test_load_or_default_missing_file() {
    let dir = scratch_dir("formulas-missing");
    let path = dir.path().join("nope.json");
    let store = FormulaStore::load_or_default(&path);
    assert!(store.is_empty());
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn test_load_invalid_file() {
    let dir = scratch_dir("formulas-invalid");
    let path = write_file(&dir, "formulas.json", "{ not json");
    assert!(matches!(FormulaStore::load(&path), Err(FormulaStoreError::Parse { .. })));
    assert!(FormulaStore::load_or_default(&path).is_empty());
}

// ============================================
// Import / Export Tests
// ============================================

#[test]
fn test_import_skips_duplicates() {
    let dir = scratch_dir("formulas-import");
    let source = write_file(
        &dir,
        "shared.json",
        r#"[
    {"result_name": "P", "unit": "W", "expression": "U * I * 1000", "enabled": true},
    {"name": "Q", "unit": "var", "expression": "U * I * 0.5"}
]"#,
    );

    let mut store = FormulaStore::new();
    store.add(FormulaDefinition::new("P", "W", "U * I")).unwrap();

    assert_eq!(store.import_file(&source).unwrap(), 1);
    assert_eq!(store.get("P").unwrap().expression, "U * I");
    assert_eq!(store.get("Q").unwrap().unit, "var");

    // Importing the same file again adds nothing
    assert_eq!(store.import_file(&source).unwrap(), 0);
}

#[test]
fn test_export_then_load() {
    let dir = scratch_dir("formulas-export");
    let target = dir.path().join("nested").join("export.json");

    let mut store = FormulaStore::new();
    store.add(FormulaDefinition::new("A", "", "x + 1")).unwrap();
    store.export_file(&target).unwrap();

    let loaded = FormulaStore::load(&target).unwrap();
    assert_eq!(loaded.definitions(), store.definitions());
}

#[test]
fn test_autosave_after_edit() {
    let dir = scratch_dir("formulas-autosave");
    let path = dir.path().join("formulas.json");

    let mut store = FormulaStore::with_path(&path);
    store.set_autosave(true);
    store.add(FormulaDefinition::new("A", "", "x + 1")).unwrap();
    assert_eq!(FormulaStore::load(&path).unwrap().len(), 1);

    store.remove("A").unwrap();
    assert!(FormulaStore::load(&path).unwrap().is_empty());
}
