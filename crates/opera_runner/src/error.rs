//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while talking to the container engine.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Docker not available: {0}")]
    DockerNotAvailable(String),

    #[error("Container creation failed for image {image}: {message}")]
    CreateFailed { image: String, message: String },

    #[error("Container {id} failed to start: {message}")]
    StartFailed { id: String, message: String },

    #[error("Container {id} could not be attached: {message}")]
    AttachFailed { id: String, message: String },

    #[error("Waiting for container {id} failed: {message}")]
    WaitFailed { id: String, message: String },

    #[error("Container {id} could not be inspected: {message}")]
    InspectFailed { id: String, message: String },

    #[error("Container {id} could not be removed: {message}")]
    RemoveFailed { id: String, message: String },

    #[error("Container from \"{image}\" image returned status code {status_code}")]
    NonZeroExit { image: String, status_code: i64 },

    #[error("Invalid TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
}

impl RunnerError {
    /// Exit status carried by a [`RunnerError::NonZeroExit`].
    pub fn status_code(&self) -> Option<i64> {
        match self {
            Self::NonZeroExit { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}
