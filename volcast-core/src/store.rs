//! Model artifact store.
//!
//! Layout: `{model_dir}/{YYYY-MM-DD_HH-MM-SS}_{TICKER}.json`
//!
//! The timestamp prefix is what orders artifacts: sorting file names
//! lexicographically sorts them chronologically, and the last one for a
//! ticker is the current model. Nothing is ever deleted here.

use crate::model::FittedGarch;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Second-resolution, filesystem-safe, lexicographically sortable.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;
const EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no model for '{ticker}' in {}", dir.display())]
    ModelNotFound { ticker: String, dir: PathBuf },

    #[error("invalid ticker '{0}' for an artifact name")]
    InvalidTicker(String),

    #[error("model store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt model artifact {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("inconsistent model artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("model serialization failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// On-disk envelope: the (ticker, timestamp, model) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub ticker: String,
    pub saved_at: NaiveDateTime,
    pub model: FittedGarch,
}

/// A stored artifact found by listing the model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub ticker: String,
    pub saved_at: NaiveDateTime,
}

/// Directory of fitted models, keyed by ticker and save time.
#[derive(Debug, Clone)]
pub struct ModelStore {
    model_dir: PathBuf,
}

impl ModelStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    fn artifact_path(&self, ticker: &str, saved_at: NaiveDateTime) -> PathBuf {
        self.model_dir.join(format!(
            "{}_{ticker}.{EXTENSION}",
            saved_at.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Save a model stamped with the current local time.
    pub fn save(&self, ticker: &str, model: &FittedGarch) -> Result<PathBuf, StoreError> {
        self.save_at(ticker, model, chrono::Local::now().naive_local())
    }

    /// Save a model under an explicit timestamp (truncated to seconds).
    ///
    /// A save in the same second as an earlier one for the same ticker
    /// overwrites it.
    pub fn save_at(
        &self,
        ticker: &str,
        model: &FittedGarch,
        saved_at: NaiveDateTime,
    ) -> Result<PathBuf, StoreError> {
        validate_ticker(ticker)?;
        fs::create_dir_all(&self.model_dir).map_err(|source| StoreError::Io {
            path: self.model_dir.clone(),
            source,
        })?;

        let artifact = ModelArtifact {
            ticker: ticker.to_string(),
            saved_at,
            model: model.clone(),
        };
        let json = serde_json::to_vec_pretty(&artifact).map_err(StoreError::Encode)?;

        let path = self.artifact_path(ticker, saved_at);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;

        info!(ticker, path = %path.display(), "model saved");
        Ok(path)
    }

    /// All artifacts for a ticker, oldest first. A missing directory lists nothing.
    pub fn list(&self, ticker: &str) -> Result<Vec<ArtifactInfo>, StoreError> {
        validate_ticker(ticker)?;
        let entries = match fs::read_dir(&self.model_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.model_dir.clone(),
                    source,
                })
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.model_dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(saved_at) = parse_artifact_name(name, ticker) {
                found.push((name.to_string(), entry.path(), saved_at));
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found
            .into_iter()
            .map(|(_, path, saved_at)| ArtifactInfo {
                path,
                ticker: ticker.to_string(),
                saved_at,
            })
            .collect())
    }

    /// Load the most recently saved model for a ticker.
    pub fn load_latest(&self, ticker: &str) -> Result<FittedGarch, StoreError> {
        let latest = self
            .list(ticker)?
            .pop()
            .ok_or_else(|| StoreError::ModelNotFound {
                ticker: ticker.to_string(),
                dir: self.model_dir.clone(),
            })?;
        debug!(ticker, path = %latest.path.display(), "loading latest model");
        Ok(load_artifact(&latest.path)?.model)
    }
}

/// Read, decode and validate one artifact file.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: ModelArtifact =
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    artifact
        .model
        .validate()
        .map_err(|reason| StoreError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(artifact)
}

/// `Some(timestamp)` if `name` is exactly `<timestamp>_<ticker>.json`.
fn parse_artifact_name(name: &str, ticker: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(&format!(".{EXTENSION}"))?;
    let rest = stem.get(TIMESTAMP_LEN..)?;
    if rest.strip_prefix('_')? != ticker {
        return None;
    }
    NaiveDateTime::parse_from_str(&stem[..TIMESTAMP_LEN], TIMESTAMP_FORMAT).ok()
}

fn validate_ticker(ticker: &str) -> Result<(), StoreError> {
    let ok = !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTicker(ticker.to_string()))
    }
}
