//! # opera_core
//!
//! Pipeline orchestration for operaio performance-test runs.
//!
//! A run builds the application in a container, optionally starts a mock
//! backend, starts the app server, waits for it to answer, load-tests every
//! target URL with sitespeed.io, reports metrics, and finally removes every
//! container it created, whatever happened before.
//!
//! # Architecture
//!
//! - **Stages**: units of work that take the [`PipelineContext`] by value and hand it back
//! - **Pipeline**: runs stages in order, stops at the first failure, always tears down
//! - **Retry**: reusable [`RetryPolicy`] and [`retry`] combinator
//! - **Probe**: readiness polling with exponential backoff
//! - **Teardown**: concurrent best-effort removal that never raises
//! - **Report**: the [`Reporter`] seam and its KairosDB implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use opera_core::{Pipeline, PipelineContext, ReqwestProbe};
//! use opera_runner::{DockerRuntime, Endpoint};
//!
//! let runtime = Arc::new(DockerRuntime::connect(&Endpoint::from_env())?);
//! let probe = Arc::new(ReqwestProbe::new(Duration::from_secs(5))?);
//!
//! let report = Pipeline::standard(probe, None)
//!     .run(PipelineContext::new(options, runtime))
//!     .await;
//! std::process::exit(report.exit_code());
//! ```

pub mod context;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod retry;
pub mod stage;
pub mod stages;
pub mod teardown;

// Re-export main types for convenience
pub use context::{ContainerEntry, ContainerRole, ContainerSet, LoadTestRun, PipelineContext};
pub use error::{PipelineError, PipelineResult};
pub use options::{
    snake_case, AssetPaths, ImageSettings, LoadTestSettings, PipelineOptions, ReadinessSettings,
    ReportSettings, Tuning,
};
pub use pipeline::{
    exit_code_for, ExecutionState, Pipeline, PipelineReport, StageFailure, StageRecord,
    StageStatus,
};
pub use probe::{HttpProbe, ProbeError, ProbeErrorKind, ReadinessProber, ReqwestProbe};
pub use report::{Datapoint, KairosReporter, ReportError, Reporter, RunReport};
pub use retry::{retry, Backoff, RetryError, RetryPolicy};
pub use stage::{Stage, StageResult};
pub use stages::{
    AppServerStage, BuildStage, InitializeStage, LoadTestStage, LoadTestTask, MockServerStage,
    ReportStage, WaitStage,
};
pub use teardown::{RemovalFailure, TeardownManager, TeardownReport};
