//! Initialize stage: check the options and the container engine.

use async_trait::async_trait;
use tracing::info;

use opera_runner::ContainerRuntime;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageResult};

pub struct InitializeStage;

#[async_trait]
impl Stage for InitializeStage {
    fn name(&self) -> &str {
        "initialize"
    }

    fn description(&self) -> &str {
        "Validate options and check the container engine is reachable"
    }

    async fn run(&self, ctx: PipelineContext) -> StageResult {
        info!(execution_id = %ctx.execution_id, "Initializing");

        if let Err(e) = ctx.options.validate() {
            return (ctx, Err(e));
        }

        if let Err(e) = ctx.runtime.ping().await {
            let err = PipelineError::stage(self.name(), e.to_string());
            return (ctx, Err(err));
        }

        info!(
            urls = ctx.options.expanded_urls().len(),
            mock_server = ctx.options.has_mock_server(),
            reuse_builder = ctx.options.builder_override.is_some(),
            "Initialization complete"
        );
        (ctx, Ok(()))
    }
}
