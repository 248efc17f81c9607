//! Wait stage: block until the app server answers HTTP.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use opera_runner::ContainerHandle;

use crate::context::{ContainerRole, PipelineContext};
use crate::error::{PipelineError, PipelineResult};
use crate::probe::{HttpProbe, ReadinessProber};
use crate::stage::{Stage, StageResult};

pub struct WaitStage {
    probe: Arc<dyn HttpProbe>,
}

impl WaitStage {
    pub fn new(probe: Arc<dyn HttpProbe>) -> Self {
        Self { probe }
    }

    /// URL of the app server's published `port` binding on the host.
    pub fn app_url(app: &ContainerHandle, port: &str) -> PipelineResult<String> {
        let binding = app.binding(port).ok_or_else(|| {
            PipelineError::stage(
                "wait",
                format!("application server {} publishes no binding for {}", app.short_id(), port),
            )
        })?;
        Ok(format!("http://{}:{}", host_address(&binding.host_ip), binding.host_port))
    }
}

/// Wildcard bind addresses are reached through loopback.
fn host_address(host_ip: &str) -> String {
    match host_ip.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
        Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
        Ok(IpAddr::V4(ip)) => ip.to_string(),
        Err(_) if host_ip.is_empty() => "127.0.0.1".to_string(),
        Err(_) => host_ip.to_string(),
    }
}

#[async_trait]
impl Stage for WaitStage {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the application server to accept connections"
    }

    async fn run(&self, ctx: PipelineContext) -> StageResult {
        let options = Arc::clone(&ctx.options);
        let settings = &options.tuning.readiness;
        let url = ctx
            .require(&ContainerRole::AppServer)
            .and_then(|app| Self::app_url(app, &settings.app_port));
        let url = match url {
            Ok(url) => url,
            Err(e) => return (ctx, Err(e)),
        };

        let prober = ReadinessProber::new(Arc::clone(&self.probe), settings);
        let result = prober.wait_until_ready(&url).await.map(|_| ());
        (ctx, result)
    }
}
