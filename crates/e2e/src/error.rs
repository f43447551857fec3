//! Error types for the harness

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("No configuration for environment '{env}': neither base.json nor {env}.json exists in {}", .dir.display())]
    ConfigNotFound { env: String, dir: PathBuf },

    #[error("Invalid configuration for environment '{env}' ({}): {reason}", .path.display())]
    ConfigParse {
        env: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Report not found: {}", .0.display())]
    ReportNotFound(PathBuf),

    #[error("Malformed report {}: {reason}", .path.display())]
    ReportParse { path: PathBuf, reason: String },

    #[error("Retry attempt {attempt} failed: {reason}")]
    AttemptFailed { attempt: u32, reason: String },

    #[error("Runner error: {0}")]
    Runner(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
