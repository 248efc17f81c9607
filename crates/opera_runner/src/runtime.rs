//! Container runtime trait and types.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::config::ContainerConfig;
use crate::error::RunnerResult;
use crate::handle::InspectData;

/// Combined stdout/stderr of an attached container, as raw chunks.
pub type OutputStream = Pin<Box<dyn Stream<Item = RunnerResult<Vec<u8>>> + Send>>;

/// Options for removing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    /// Kill the container first if it is still running
    pub force: bool,
    /// Remove anonymous volumes along with the container
    pub remove_volumes: bool,
}

impl RemoveOptions {
    /// Kill if running and drop anonymous volumes.
    pub fn purge() -> Self {
        Self {
            force: true,
            remove_volumes: true,
        }
    }
}

/// The operations the pipeline needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the engine answers.
    async fn ping(&self) -> RunnerResult<()>;

    /// Create a container and return its id.
    async fn create_container(&self, config: &ContainerConfig) -> RunnerResult<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> RunnerResult<()>;

    /// Attach to the container's combined output.
    async fn attach_output(&self, id: &str) -> RunnerResult<OutputStream>;

    /// Block until the container exits and return its exit status.
    async fn wait_container(&self, id: &str) -> RunnerResult<i64>;

    /// Inspect a container.
    async fn inspect(&self, id: &str) -> RunnerResult<InspectData>;

    /// Remove a container.
    async fn remove_container(&self, id: &str, options: RemoveOptions) -> RunnerResult<()>;
}
