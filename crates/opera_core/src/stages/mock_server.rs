//! Mock-server stage: start the backend mock the app server talks to.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use opera_runner::{run_detached, ContainerConfig};

use crate::context::{ContainerRole, PipelineContext};
use crate::options::PipelineOptions;
use crate::stage::{Stage, StageResult};

pub struct MockServerStage;

impl MockServerStage {
    pub fn container_config(options: &PipelineOptions, builder_id: &str) -> ContainerConfig {
        ContainerConfig::new(&options.tuning.images.mock_server)
            .env("MOCK_SERVER_CMD", options.mock_server_cmd.as_deref().unwrap_or_default())
            .hostname(&options.mock_server_hostname)
            .publish_all_ports()
            .volumes_from(builder_id)
            .name_prefix("operaio-mock-server")
    }
}

#[async_trait]
impl Stage for MockServerStage {
    fn name(&self) -> &str {
        "mock-server"
    }

    fn description(&self) -> &str {
        "Start the mock backend server"
    }

    fn should_run(&self, ctx: &PipelineContext) -> bool {
        ctx.options.has_mock_server()
    }

    async fn run(&self, mut ctx: PipelineContext) -> StageResult {
        let builder_id = ctx.require(&ContainerRole::Builder).map(|h| h.id.clone());
        let config = match builder_id {
            Ok(id) => Self::container_config(&ctx.options, &id),
            Err(e) => return (ctx, Err(e)),
        };
        info!(image = %config.image, hostname = %ctx.options.mock_server_hostname, "Starting mocking server");

        let runtime = Arc::clone(&ctx.runtime);
        let outcome = run_detached(runtime.as_ref(), &config).await;
        let result = ctx.record_outcome(ContainerRole::MockServer, self.name(), outcome);

        if let Err(e) = &result {
            error!(error = %e, "Error while starting mocking server");
        }
        (ctx, result)
    }
}
