//! User settings persistence.
//!
//! This module handles loading and saving user preferences across sessions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::autoscale::{AutoscaleConfig, DEFAULT_MARGIN};

/// User settings that persist across sessions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Settings file version for migration support
    #[serde(default = "default_version")]
    pub version: u32,
    /// Fraction of the data range added on both sides of an autoscaled axis
    #[serde(default = "default_margin")]
    pub autoscale_margin: f64,
    /// Round autoscaled limits outward to 1/1.5/2/2.5/3/4/5/6/8 x 10^k
    #[serde(default)]
    pub nice_rounding: bool,
    /// Run the formula list right after a dataset is imported
    #[serde(default = "default_true")]
    pub auto_calculate_on_import: bool,
    /// Write the formula file after every edit
    #[serde(default = "default_true")]
    pub autosave_formulas: bool,
    /// Formula file location; the config directory is used when unset
    #[serde(default)]
    pub formula_file: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

fn default_margin() -> f64 {
    DEFAULT_MARGIN
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            autoscale_margin: DEFAULT_MARGIN,
            nice_rounding: false,
            auto_calculate_on_import: true,
            autosave_formulas: true,
            formula_file: None,
        }
    }
}

impl Settings {
    /// Get the config directory path for SPlot
    pub fn get_config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            dirs::data_dir().map(|p| p.join("SPlot"))
        }
        #[cfg(target_os = "windows")]
        {
            dirs::config_dir().map(|p| p.join("SPlot"))
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs::config_dir().map(|p| p.join("splot"))
        }
    }

    /// Get the path to the settings JSON file
    pub fn get_settings_path() -> Option<PathBuf> {
        Self::get_config_dir().map(|p| p.join("settings.json"))
    }

    /// Formula file to use: the override, else the config directory default
    pub fn formula_path(&self) -> Option<PathBuf> {
        self.formula_file
            .clone()
            .or_else(|| Self::get_config_dir().map(|p| p.join("formulas.json")))
    }

    /// Autoscale parameters derived from these settings
    pub fn autoscale_config(&self) -> AutoscaleConfig {
        AutoscaleConfig {
            margin: self.autoscale_margin,
            nice_rounding: self.nice_rounding,
        }
    }

    /// Load settings from disk
    pub fn load() -> Self {
        let path = match Self::get_settings_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable settings {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::get_settings_path()
            .ok_or_else(|| "Could not determine config directory".to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }
}
