//! Stage definitions.
//!
//! Stages are the steps of a pipeline run. Each one receives the context by
//! value and hands it back together with its outcome, so containers created
//! before a failure are never lost to teardown.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use opera_core::{PipelineContext, Stage, StageResult};
//!
//! struct Announce;
//!
//! #[async_trait]
//! impl Stage for Announce {
//!     fn name(&self) -> &str { "announce" }
//!     fn description(&self) -> &str { "Logs the run id" }
//!
//!     async fn run(&self, ctx: PipelineContext) -> StageResult {
//!         tracing::info!(execution_id = %ctx.execution_id, "Starting");
//!         (ctx, Ok(()))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::error::PipelineResult;

/// Context returned by a stage, paired with the stage's outcome.
pub type StageResult = (PipelineContext, PipelineResult<()>);

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique stage name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Whether the stage applies to this run. Skipped stages count as success.
    fn should_run(&self, _ctx: &PipelineContext) -> bool {
        true
    }

    /// Execute the stage.
    async fn run(&self, ctx: PipelineContext) -> StageResult;
}
