//! Error types for the pipeline core.

use opera_runner::RunnerError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Container from \"{image}\" image returned status code {status_code}")]
    NonZeroExit { image: String, status_code: i64 },

    #[error("Application server at {url} not reachable after {attempts} attempt(s): {last_error}")]
    ReadinessTimeout {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Load test for {url} failed after {attempts} attempt(s): {last_error}")]
    LoadTestExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("No {0} container recorded in pipeline context")]
    MissingContainer(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid config file: {0}")]
    ConfigFile(String),
}

impl PipelineError {
    /// Map a runner error raised inside `stage`, keeping exit statuses distinct.
    pub fn from_runner(stage: &str, error: RunnerError) -> Self {
        match error {
            RunnerError::NonZeroExit { image, status_code } => {
                Self::NonZeroExit { image, status_code }
            }
            other => Self::Stage {
                stage: stage.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn stage(stage: &str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage_error",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::ReadinessTimeout { .. } => "readiness_timeout",
            Self::LoadTestExhausted { .. } => "load_test_exhausted",
            Self::MissingContainer(_) => "missing_container",
            Self::InvalidOptions(_) => "invalid_options",
            Self::ConfigFile(_) => "config_file",
        }
    }
}
