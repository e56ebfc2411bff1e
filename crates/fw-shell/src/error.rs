use std::path::PathBuf;

use fw_runtime::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("workspace state was not saved: {message}")]
    PersistFailed { message: String },
}

impl ShellError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::MissingPath { .. } => 2,
            _ => 1,
        }
    }
}
