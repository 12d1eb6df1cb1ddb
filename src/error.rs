// ABOUTME: Error kinds that callers need to tell apart
// ABOUTME: Configuration vs connectivity vs everything else, per the engine's failure policy

use thiserror::Error;

/// Failures that decide how a sync run ends.
///
/// Configuration errors fail the triggering call; connectivity errors are
/// fatal to the current run and mark the task as errored. Everything else is
/// wrapped as `Other`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot reach database '{name}': {message}")]
    Connectivity { name: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }

    pub fn connectivity(name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SyncError::Connectivity {
            name: name.into(),
            message: format!("{:#}", err),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
