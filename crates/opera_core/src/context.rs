//! Pipeline context carried through the stages.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opera_runner::{stdout_sink, ContainerHandle, ContainerRuntime, LogSink, RunOutcome};

use crate::error::{PipelineError, PipelineResult};
use crate::options::PipelineOptions;

/// What a container is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role")]
pub enum ContainerRole {
    Builder,
    MockServer,
    AppServer,
    LoadTest { url_index: usize, attempt: u32 },
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builder => write!(f, "builder"),
            Self::MockServer => write!(f, "mock_server"),
            Self::AppServer => write!(f, "app_server"),
            Self::LoadTest { url_index, attempt } => {
                write!(f, "load_test[{}]#{}", url_index, attempt)
            }
        }
    }
}

/// A container recorded by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub role: ContainerRole,
    pub handle: ContainerHandle,
}

/// Insertion-ordered record of every container the run has created or adopted.
///
/// Entries are only ever appended; teardown reads the full set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSet {
    entries: Vec<ContainerEntry>,
}

impl ContainerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, role: ContainerRole, handle: ContainerHandle) {
        self.entries.push(ContainerEntry { role, handle });
    }

    /// Latest handle recorded for `role`.
    pub fn get(&self, role: &ContainerRole) -> Option<&ContainerHandle> {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.role == role)
            .map(|e| &e.handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.handle.id.clone()).collect()
    }
}

/// Outcome of one target URL in the load-test stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTestRun {
    pub url: String,
    pub attempts: u32,
    pub succeeded: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// State handed from stage to stage.
///
/// Options and runtime are fixed for the whole run. Containers and load-test
/// outcomes accumulate as stages complete.
#[derive(Clone)]
pub struct PipelineContext {
    pub execution_id: Uuid,
    pub options: Arc<PipelineOptions>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub containers: ContainerSet,
    pub load_tests: Vec<LoadTestRun>,
    /// Destination for forwarded container output
    pub log_sink: LogSink,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("execution_id", &self.execution_id)
            .field("options", &self.options)
            .field("containers", &self.containers)
            .field("load_tests", &self.load_tests)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    pub fn new(options: PipelineOptions, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            options: Arc::new(options),
            runtime,
            containers: ContainerSet::new(),
            load_tests: Vec::new(),
            log_sink: stdout_sink(),
        }
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn record(&mut self, role: ContainerRole, handle: ContainerHandle) {
        tracing::debug!(role = %role, container_id = %handle.id, protected = handle.protected, "Recorded container");
        self.containers.record(role, handle);
    }

    /// Record whatever a run produced and convert its failure for `stage`.
    pub fn record_outcome(
        &mut self,
        role: ContainerRole,
        stage: &str,
        outcome: RunOutcome,
    ) -> PipelineResult<()> {
        match outcome {
            Ok(handle) => {
                self.record(role, handle);
                Ok(())
            }
            Err(failure) => {
                if let Some(handle) = failure.handle {
                    self.record(role, handle);
                }
                Err(PipelineError::from_runner(stage, failure.error))
            }
        }
    }

    /// Handle for `role`, or a missing-container error.
    pub fn require(&self, role: &ContainerRole) -> PipelineResult<&ContainerHandle> {
        self.containers
            .get(role)
            .ok_or_else(|| PipelineError::MissingContainer(role.to_string()))
    }
}
