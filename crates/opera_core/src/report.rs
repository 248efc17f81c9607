//! Run metrics and the reporting seam.
//!
//! [`RunReport`] summarises a run for an external metrics store.
//! [`KairosReporter`] posts it to a KairosDB datapoint endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{LoadTestRun, PipelineContext};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics endpoint rejected the report with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub tenant: String,
    pub prefix: String,
    pub profile: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub git_sha: String,
    pub commit_url: String,
    pub load_tests: Vec<LoadTestRun>,
}

impl RunReport {
    pub fn from_context(ctx: &PipelineContext) -> Self {
        let options = &ctx.options;
        let commit_url = format!(
            "{}/{}/{}/commit/{}",
            options.tuning.report.git_web_url.trim_end_matches('/'),
            options.github_org,
            options.github_repo,
            options.git_sha
        );
        Self {
            tenant: options.tenant(),
            prefix: options.prefix.clone(),
            profile: options.profile.clone(),
            timestamp: options.timestamp,
            git_sha: options.git_sha.clone(),
            commit_url,
            load_tests: ctx.load_tests.clone(),
        }
    }

    fn metric(&self, suffix: &str) -> String {
        format!("{}.{}.{}", self.prefix, self.tenant, suffix)
    }

    /// KairosDB datapoints for this run.
    pub fn datapoints(&self) -> Result<Vec<Datapoint>, ReportError> {
        let mut tags = BTreeMap::new();
        tags.insert("profile".to_string(), self.profile.clone());

        let commit = serde_json::json!({
            "gitcommit": self.git_sha,
            "giturl": self.commit_url,
        });
        let mut points = vec![Datapoint {
            name: self.metric("gitcommit"),
            datapoints: vec![(self.timestamp, serde_json::Value::String(serde_json::to_string(&commit)?))],
            tags: tags.clone(),
        }];

        for run in self.load_tests.iter().filter(|r| r.succeeded) {
            let mut tags = tags.clone();
            tags.insert("url".to_string(), run.url.clone());
            tags.insert("attempts".to_string(), run.attempts.to_string());
            points.push(Datapoint {
                name: self.metric("load_test.duration_ms"),
                datapoints: vec![(self.timestamp, serde_json::Value::from(run.duration_ms))],
                tags,
            });
        }

        Ok(points)
    }
}

/// One KairosDB metric with its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub name: String,
    pub datapoints: Vec<(i64, serde_json::Value)>,
    pub tags: BTreeMap<String, String>,
}

/// Destination for run reports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, report: &RunReport) -> Result<(), ReportError>;
}

/// Posts run reports to KairosDB.
pub struct KairosReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl KairosReporter {
    /// `host` may be a bare host name or a full base URL.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: Self::endpoint_for(host),
        })
    }

    fn endpoint_for(host: &str) -> String {
        let base = host.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}/api/v1/datapoints", base)
        } else {
            format!("http://{}/api/v1/datapoints", base)
        }
    }
}

#[async_trait]
impl Reporter for KairosReporter {
    async fn report(&self, report: &RunReport) -> Result<(), ReportError> {
        let points = report.datapoints()?;
        debug!(endpoint = %self.endpoint, count = points.len(), "Posting datapoints");

        let response = self.client.post(&self.endpoint).json(&points).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(endpoint = %self.endpoint, metrics = points.len(), "Run metrics reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use opera_runner::MockRuntime;

    use super::*;
    use crate::options::tests::sample_options;

    fn report() -> RunReport {
        let mut options = sample_options();
        options.tuning.report.git_web_url = "https://git.example.com/".to_string();
        let mut ctx = PipelineContext::new(options, Arc::new(MockRuntime::new()));
        ctx.load_tests.push(LoadTestRun {
            url: "http://a/".to_string(),
            attempts: 2,
            succeeded: true,
            duration_ms: 4200,
            error: None,
        });
        ctx.load_tests.push(LoadTestRun {
            url: "http://b/".to_string(),
            attempts: 3,
            succeeded: false,
            duration_ms: 90_000,
            error: Some("exhausted".to_string()),
        });
        RunReport::from_context(&ctx)
    }

    #[test]
    fn test_report_from_context() {
        let report = report();
        assert_eq!(report.tenant, "electrode_io_my_app");
        assert_eq!(report.commit_url, "https://git.example.com/electrode-io/myApp/commit/abc123");
        assert_eq!(report.load_tests.len(), 2);
    }

    #[test]
    fn test_datapoints() {
        let points = report().datapoints().unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name, "rapido.electrode_io_my_app.gitcommit");
        assert_eq!(points[0].tags["profile"], "default");
        let payload: serde_json::Value =
            serde_json::from_str(points[0].datapoints[0].1.as_str().unwrap()).unwrap();
        assert_eq!(payload["gitcommit"], "abc123");

        assert_eq!(points[1].name, "rapido.electrode_io_my_app.load_test.duration_ms");
        assert_eq!(points[1].datapoints[0], (1_700_000_000_000, serde_json::json!(4200)));
        assert_eq!(points[1].tags["url"], "http://a/");
    }

    #[test]
    fn test_datapoint_wire_shape() {
        let points = report().datapoints().unwrap();
        let json = serde_json::to_value(&points[1]).unwrap();
        assert_eq!(json["datapoints"], serde_json::json!([[1_700_000_000_000i64, 4200]]));
    }

    #[test]
    fn test_endpoint_for() {
        assert_eq!(
            KairosReporter::endpoint_for("kairos.local"),
            "http://kairos.local/api/v1/datapoints"
        );
        assert_eq!(
            KairosReporter::endpoint_for("https://kairos.local:8443/"),
            "https://kairos.local:8443/api/v1/datapoints"
        );
    }
}
