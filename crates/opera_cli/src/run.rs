//! Wires the real runtime, probe and reporter into a pipeline run.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use opera_core::{
    KairosReporter, Pipeline, PipelineContext, PipelineOptions, PipelineReport, Reporter,
    ReqwestProbe,
};
use opera_runner::{DockerRuntime, Endpoint};

/// Build the metrics reporter, if reporting is on.
pub fn reporter_for(
    options: &PipelineOptions,
    enabled: bool,
) -> Result<Option<Arc<dyn Reporter>>> {
    let host = match (&options.kairos_host, enabled) {
        (Some(host), true) => host,
        _ => return Ok(None),
    };
    let timeout = Duration::from_millis(options.tuning.report.request_timeout_ms);
    let reporter = KairosReporter::new(host, timeout).context("Failed to create metrics client")?;
    Ok(Some(Arc::new(reporter)))
}

/// Connect to Docker and build the standard pipeline.
///
/// Errors here happen before any container exists.
pub fn prepare(options: &PipelineOptions, reporting: bool) -> Result<(Pipeline, Arc<DockerRuntime>)> {
    let endpoint = Endpoint::from_env();
    let runtime = DockerRuntime::connect(&endpoint).context("Failed to create docker client")?;

    let probe_timeout = Duration::from_millis(options.tuning.readiness.request_timeout_ms);
    let probe = ReqwestProbe::new(probe_timeout).context("Failed to create HTTP client")?;

    let pipeline = Pipeline::standard(Arc::new(probe), reporter_for(options, reporting)?);
    Ok((pipeline, Arc::new(runtime)))
}

/// Run the pipeline to completion. Never fails; the outcome is in the report.
pub async fn execute(
    pipeline: &Pipeline,
    runtime: Arc<DockerRuntime>,
    options: PipelineOptions,
) -> PipelineReport {
    let ctx = PipelineContext::new(options, runtime);
    pipeline.run(ctx).await
}

/// Write the report as pretty JSON. Failure is logged, not returned.
pub fn write_report(report: &PipelineReport, path: &Path) {
    let result = serde_json::to_string_pretty(report)
        .context("Failed to serialize run report")
        .and_then(|json| {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))
        });
    match result {
        Ok(()) => info!(path = %path.display(), "Run report written"),
        Err(e) => warn!(error = %format!("{:#}", e), "Could not write run report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opera_core::{ExecutionState, TeardownReport};

    fn options(kairos_host: Option<&str>) -> PipelineOptions {
        PipelineOptions {
            app_build_cmd: "npm run build".to_string(),
            app_server_cmd: "npm start".to_string(),
            app_server_hostname: "dev.walmart.com".to_string(),
            mock_server_cmd: None,
            mock_server_hostname: "dev.walmart.com".to_string(),
            git_sha: "abc".to_string(),
            github_org: "perf".to_string(),
            github_repo: "shop".to_string(),
            github_token: "t".to_string(),
            kairos_host: kairos_host.map(str::to_string),
            prefix: "rapido".to_string(),
            profile: "default".to_string(),
            resource_timing: false,
            sample_size: 1,
            screenshot: false,
            timestamp: 0,
            urls: vec!["http://a/".to_string()],
            builder_override: None,
            tuning: Default::default(),
        }
    }

    #[test]
    fn test_reporter_needs_host_and_flag() {
        assert!(reporter_for(&options(None), true).unwrap().is_none());
        assert!(reporter_for(&options(Some("kairos")), false).unwrap().is_none());
        assert!(reporter_for(&options(Some("kairos")), true).unwrap().is_some());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let now = chrono::Utc::now();
        let report = PipelineReport {
            execution_id: uuid::Uuid::nil(),
            state: ExecutionState::Completed,
            started_at: now,
            completed_at: now,
            stages: Vec::new(),
            failure: None,
            containers: Vec::new(),
            load_tests: Vec::new(),
            teardown: TeardownReport::default(),
        };

        write_report(&report, &path);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["state"], "completed");

        // Unwritable location only warns.
        write_report(&report, &dir.path().join("missing").join("report.json"));
    }
}
