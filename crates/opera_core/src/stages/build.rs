//! Build stage: compile the application inside the builder image.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use opera_runner::{run_attached, ContainerConfig, ContainerHandle};

use crate::context::{ContainerRole, PipelineContext};
use crate::options::PipelineOptions;
use crate::stage::{Stage, StageResult};

pub struct BuildStage;

impl BuildStage {
    pub fn container_config(options: &PipelineOptions) -> ContainerConfig {
        ContainerConfig::new(&options.tuning.images.builder)
            .env("APP_BUILD_CMD", &options.app_build_cmd)
            .env("GITHUB_BRANCH_OR_SHA", &options.git_sha)
            .env("GITHUB_KEY", &options.github_token)
            .env("GITHUB_ORG", &options.github_org)
            .env("GITHUB_REPO", &options.github_repo)
            .name_prefix("operaio-builder")
            .attached()
    }
}

#[async_trait]
impl Stage for BuildStage {
    fn name(&self) -> &str {
        "build"
    }

    fn description(&self) -> &str {
        "Build the application in a container, or adopt an existing build"
    }

    async fn run(&self, mut ctx: PipelineContext) -> StageResult {
        if let Some(id) = ctx.options.builder_override.clone() {
            info!(container_id = %id, "Reusing container with previously built application");
            ctx.record(ContainerRole::Builder, ContainerHandle::reused(id));
            return (ctx, Ok(()));
        }

        let config = Self::container_config(&ctx.options);
        info!(image = %config.image, git_sha = %ctx.options.git_sha, "Starting container to build application");

        let runtime = Arc::clone(&ctx.runtime);
        let outcome = run_attached(runtime.as_ref(), &config, ctx.log_sink.clone()).await;
        let result = ctx.record_outcome(ContainerRole::Builder, self.name(), outcome);

        match &result {
            Ok(()) => info!("Application successfully built"),
            Err(e) => error!(error = %e, "Error while building application"),
        }
        (ctx, result)
    }
}
