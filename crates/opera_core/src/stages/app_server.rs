//! App-server stage: start the built application.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use opera_runner::{run_detached, ContainerConfig, ContainerHandle};

use crate::context::{ContainerRole, PipelineContext};
use crate::error::{PipelineError, PipelineResult};
use crate::options::PipelineOptions;
use crate::stage::{Stage, StageResult};

/// Alias the app server reaches the mock server under.
pub const MOCK_SERVER_ALIAS: &str = "otto-mock-server";

pub struct AppServerStage;

impl AppServerStage {
    /// Container config for the app server, wired to the mock server when there is one.
    pub fn container_config(
        options: &PipelineOptions,
        builder_id: &str,
        mock_server: Option<&ContainerHandle>,
    ) -> PipelineResult<ContainerConfig> {
        let config = ContainerConfig::new(&options.tuning.images.app)
            .env("APP_SERVER_CMD", &options.app_server_cmd)
            .publish_all_ports()
            .volumes_from(builder_id)
            .name_prefix("operaio-app");

        let Some(mock) = mock_server else {
            return Ok(config.extra_host(&options.app_server_hostname, "0.0.0.0"));
        };

        let ip = mock.ip_address().ok_or_else(|| {
            PipelineError::stage("app-server", format!("mock server {} has no IP address", mock.short_id()))
        })?;
        let mut config = config.extra_host(&options.app_server_hostname, ip);
        if let Some(name) = mock.name() {
            config = config.link(name, MOCK_SERVER_ALIAS);
        }
        Ok(config)
    }
}

#[async_trait]
impl Stage for AppServerStage {
    fn name(&self) -> &str {
        "app-server"
    }

    fn description(&self) -> &str {
        "Start the application server"
    }

    async fn run(&self, mut ctx: PipelineContext) -> StageResult {
        let config = ctx
            .require(&ContainerRole::Builder)
            .and_then(|builder| {
                Self::container_config(
                    &ctx.options,
                    &builder.id,
                    ctx.containers.get(&ContainerRole::MockServer),
                )
            });
        let config = match config {
            Ok(config) => config,
            Err(e) => return (ctx, Err(e)),
        };
        info!(image = %config.image, extra_hosts = ?config.extra_hosts, "Starting application server");

        let runtime = Arc::clone(&ctx.runtime);
        let outcome = run_detached(runtime.as_ref(), &config).await;
        let result = ctx.record_outcome(ContainerRole::AppServer, self.name(), outcome);

        if let Err(e) = &result {
            error!(error = %e, "Error while starting application server");
        }
        (ctx, result)
    }
}
