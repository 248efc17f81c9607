//! Pipeline orchestrator.
//!
//! Runs an ordered list of stages, stops at the first failure, and always
//! tears down every container the run recorded, exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::{ContainerEntry, LoadTestRun, PipelineContext};
use crate::probe::HttpProbe;
use crate::report::Reporter;
use crate::stage::Stage;
use crate::stages::{
    AppServerStage, BuildStage, InitializeStage, LoadTestStage, MockServerStage, ReportStage,
    WaitStage,
};
use crate::teardown::{TeardownManager, TeardownReport};

/// Final state of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Every stage succeeded or was skipped
    Completed,
    /// A stage failed
    Failed,
}

/// What happened to a stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
    /// An earlier stage failed
    NotRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl StageRecord {
    fn new(name: &str, status: StageStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            duration_ms: 0,
            error: None,
        }
    }
}

/// The stage that stopped the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: String,
    /// Error class, see [`crate::PipelineError::kind`]
    pub kind: String,
    pub message: String,
}

/// Everything a run did, including teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub state: ExecutionState,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    pub failure: Option<StageFailure>,
    pub containers: Vec<ContainerEntry>,
    pub load_tests: Vec<LoadTestRun>,
    pub teardown: TeardownReport,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code() == 0
    }

    pub fn exit_code(&self) -> i32 {
        exit_code_for(self.failure.is_some(), self.teardown.error_count())
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Process exit status for a run: zero only when no stage failed and every
/// removal succeeded.
pub fn exit_code_for(stage_failed: bool, teardown_errors: usize) -> i32 {
    if stage_failed || teardown_errors > 0 {
        1
    } else {
        0
    }
}

/// An ordered list of stages plus the teardown that follows them.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    teardown: TeardownManager,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            teardown: TeardownManager::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// initialize → build → mock-server → app-server → wait → load-test → report
    pub fn standard(probe: Arc<dyn HttpProbe>, reporter: Option<Arc<dyn Reporter>>) -> Self {
        Self::new()
            .stage(Arc::new(InitializeStage))
            .stage(Arc::new(BuildStage))
            .stage(Arc::new(MockServerStage))
            .stage(Arc::new(AppServerStage))
            .stage(Arc::new(WaitStage::new(probe)))
            .stage(Arc::new(LoadTestStage))
            .stage(Arc::new(ReportStage::new(reporter)))
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, then tear down.
    pub async fn run(&self, mut ctx: PipelineContext) -> PipelineReport {
        let started_at = Utc::now();
        let total = self.stages.len();
        let mut records = Vec::with_capacity(total);
        let mut failure: Option<StageFailure> = None;

        info!(execution_id = %ctx.execution_id, stages = total, "Starting pipeline");

        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if failure.is_some() {
                records.push(StageRecord::new(name, StageStatus::NotRun));
                continue;
            }

            if !stage.should_run(&ctx) {
                info!(stage = name, "Skipping stage");
                records.push(StageRecord::new(name, StageStatus::Skipped));
                continue;
            }

            info!("Executing stage [{}/{}]: {}", i + 1, total, name);
            let timer = Instant::now();
            let (next, result) = stage.run(ctx).await;
            ctx = next;
            let duration_ms = timer.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    info!(stage = name, duration_ms, "Stage completed successfully");
                    records.push(StageRecord {
                        duration_ms,
                        ..StageRecord::new(name, StageStatus::Succeeded)
                    });
                }
                Err(e) => {
                    error!(stage = name, kind = e.kind(), error = %e, "Stage failed");
                    records.push(StageRecord {
                        duration_ms,
                        error: Some(e.to_string()),
                        ..StageRecord::new(name, StageStatus::Failed)
                    });
                    failure = Some(StageFailure {
                        stage: name.to_string(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let teardown = self
            .teardown
            .teardown(ctx.runtime.as_ref(), &ctx.containers)
            .await;
        if !teardown.is_clean() {
            warn!(failures = teardown.error_count(), "Some containers could not be removed");
        }

        let report = PipelineReport {
            execution_id: ctx.execution_id,
            state: if failure.is_some() {
                ExecutionState::Failed
            } else {
                ExecutionState::Completed
            },
            started_at,
            completed_at: Utc::now(),
            stages: records,
            failure,
            containers: ctx.containers.iter().cloned().collect(),
            load_tests: ctx.load_tests,
            teardown,
        };

        info!(
            execution_id = %report.execution_id,
            state = ?report.state,
            exit_code = report.exit_code(),
            "All done"
        );
        report
    }
}
