//! Project files: a whole session (datasets, pages, traces) in one file.
//!
//! Projects are JSON compressed with gzip at the best compression level.
//! Uncompressed JSON from older versions is still accepted on load.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::page::Page;
use crate::store::Dataset;

/// Current project format version
pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to access project file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize project: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to compress project: {0}")]
    Compress(std::io::Error),

    #[error("Not a readable project: gzip attempt failed ({gzip}); plain JSON attempt failed ({plain})")]
    Decode { gzip: String, plain: String },

    #[error("Project version {0} is newer than supported version {PROJECT_VERSION}")]
    UnsupportedVersion(u32),
}

fn default_version() -> u32 {
    PROJECT_VERSION
}

/// Everything needed to restore a session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, alias = "files")]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default, alias = "cur")]
    pub current_page: usize,
}

impl ProjectState {
    pub fn new(datasets: Vec<Dataset>, pages: Vec<Page>, current_page: usize) -> Self {
        Self {
            version: PROJECT_VERSION,
            datasets,
            pages,
            current_page,
        }
    }
}

/// Serialize and gzip a project
pub fn encode(state: &ProjectState) -> Result<Vec<u8>, ProjectError> {
    let json = serde_json::to_vec(state)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json).map_err(ProjectError::Compress)?;
    encoder.finish().map_err(ProjectError::Compress)
}

fn decode_gzip(bytes: &[u8]) -> Result<ProjectState, String> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&json).map_err(|e| e.to_string())
}

/// Decode project bytes, gzip first, then plain JSON.
///
/// Display buffers are not part of the file; call [`Page::render_all`] or use
/// [`load`], which does it for you.
pub fn decode(bytes: &[u8]) -> Result<ProjectState, ProjectError> {
    let mut state = match decode_gzip(bytes) {
        Ok(state) => state,
        Err(gzip) => match serde_json::from_slice::<ProjectState>(bytes) {
            Ok(state) => {
                tracing::warn!("Project is not compressed, loaded as legacy plain JSON");
                state
            }
            Err(plain) => {
                return Err(ProjectError::Decode {
                    gzip,
                    plain: plain.to_string(),
                })
            }
        },
    };

    if state.version > PROJECT_VERSION {
        return Err(ProjectError::UnsupportedVersion(state.version));
    }
    if state.current_page >= state.pages.len() {
        state.current_page = 0;
    }
    Ok(state)
}

pub fn save(path: impl AsRef<Path>, state: &ProjectState) -> Result<(), ProjectError> {
    let path = path.as_ref();
    let bytes = encode(state)?;
    std::fs::write(path, &bytes).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        "Saved project with {} datasets and {} pages to {:?} ({} bytes)",
        state.datasets.len(),
        state.pages.len(),
        path,
        bytes.len()
    );
    Ok(())
}

/// Read a project and rebuild every trace's display buffers
pub fn load(path: impl AsRef<Path>) -> Result<ProjectState, ProjectError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut state = decode(&bytes)?;
    for page in &mut state.pages {
        page.render_all();
    }
    tracing::info!("Loaded project from {:?}", path);
    Ok(state)
}
