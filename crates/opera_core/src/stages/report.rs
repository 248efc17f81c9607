//! Report stage: publish run metrics.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::context::PipelineContext;
use crate::report::{Reporter, RunReport};
use crate::stage::{Stage, StageResult};

/// Hands the run report to a [`Reporter`]. A failed report never fails the run.
pub struct ReportStage {
    reporter: Option<Arc<dyn Reporter>>,
}

impl ReportStage {
    pub fn new(reporter: Option<Arc<dyn Reporter>>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl Stage for ReportStage {
    fn name(&self) -> &str {
        "report"
    }

    fn description(&self) -> &str {
        "Publish commit and load-test metrics"
    }

    fn should_run(&self, _ctx: &PipelineContext) -> bool {
        self.reporter.is_some()
    }

    async fn run(&self, ctx: PipelineContext) -> StageResult {
        let Some(reporter) = &self.reporter else {
            return (ctx, Ok(()));
        };

        let report = RunReport::from_context(&ctx);
        info!(tenant = %report.tenant, git_sha = %report.git_sha, "Reporting run metrics");
        if let Err(e) = reporter.report(&report).await {
            warn!(error = %e, "Failed to report run metrics");
        }
        (ctx, Ok(()))
    }
}
