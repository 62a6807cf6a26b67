use std::path::PathBuf;
use thiserror::Error;

use crate::core::java::ProvisionError;

/// Central error type for the launcher core.
/// Every fallible operation returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Runtime acquisition ─────────────────────────────
    #[error("Java runtime setup failed: {0}")]
    Provision(#[from] ProvisionError),

    // ── Launch ──────────────────────────────────────────
    #[error("Invalid launch configuration: {0}")]
    Configuration(String),

    #[error("Could not start the game process: {0}")]
    ProcessStart(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the front end ─────────────────────
// Errors cross the process boundary as their display string.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
