//! Command-line arguments.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use opera_core::{PipelineOptions, Tuning};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// operaio - containerized performance-test pipeline
#[derive(Debug, Parser)]
#[command(name = "operaio")]
#[command(version, about = "Build, serve and load-test an application in containers")]
#[command(long_about = r#"
operaio builds an application in a container, optionally starts a mock
backend, starts the application server, waits for it to answer, runs
sitespeed.io against every target URL and reports the results. Every
container it created is removed at the end, whatever happened.

EXIT CODES:
  0 - Every stage succeeded and every container was removed
  1 - A stage failed or a container could not be removed
  2 - Invalid arguments or configuration
"#)]
pub struct Cli {
    /// Command building the application inside the builder image
    #[arg(long)]
    pub app_build_cmd: String,

    /// Command starting the application server
    #[arg(long)]
    pub app_server_cmd: String,

    /// Hostname the application is reached under
    #[arg(long, default_value = "dev.walmart.com")]
    pub app_server_hostname: String,

    /// Commit or branch to build
    #[arg(long)]
    pub git_sha: String,

    #[arg(long)]
    pub github_org: String,

    #[arg(long)]
    pub github_repo: String,

    /// Token the builder uses to fetch the repository
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// KairosDB host receiving metrics; reporting is off without it
    #[arg(long)]
    pub kairos_host: Option<String>,

    /// Command starting the mock server; the mock server is skipped without it
    #[arg(long)]
    pub mock_server_cmd: Option<String>,

    #[arg(long, default_value = "dev.walmart.com")]
    pub mock_server_hostname: String,

    /// Metric name prefix
    #[arg(long, default_value = "rapido")]
    pub prefix: String,

    /// Metric profile tag
    #[arg(long, default_value = "default")]
    pub profile: String,

    /// Collect resource timings
    #[arg(long)]
    pub resource_timing: bool,

    /// Attempts per URL [default: 3]
    #[arg(long)]
    pub sitespeed_retries: Option<u32>,

    /// Page loads per URL
    #[arg(long, default_value_t = 10)]
    pub sitespeed_sample_size: u32,

    /// Take screenshots
    #[arg(long)]
    pub sitespeed_screenshot: bool,

    /// Run timestamp in milliseconds [default: now]
    #[arg(long)]
    pub timestamp: Option<i64>,

    /// Target URL; repeat the flag or separate URLs with spaces
    #[arg(long = "url", required = true, num_args = 1..)]
    pub urls: Vec<String>,

    /// Reuse this builder container instead of building
    #[arg(long, env = "ELECTRODE_APP_BUILDER")]
    pub builder_container: Option<String>,

    /// TOML file with image, readiness, load-test and asset settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Write the JSON run report to this file
    #[arg(long)]
    pub report_file: Option<PathBuf>,

    /// Do not send metrics even when a KairosDB host is set
    #[arg(long)]
    pub no_report: bool,
}

impl Cli {
    /// Whether metrics go to KairosDB.
    pub fn reporting_enabled(&self) -> bool {
        !self.no_report && self.kairos_host.is_some()
    }

    /// Merge flags with the tuning file into pipeline options.
    ///
    /// Relative asset paths are resolved against `base_dir`.
    pub fn to_options(&self, base_dir: &Path) -> Result<PipelineOptions> {
        let mut tuning = match &self.config {
            Some(path) => Tuning::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => Tuning::default(),
        };
        if let Some(retries) = self.sitespeed_retries {
            tuning.load_test.retries = retries;
        }
        tuning.assets = tuning.assets.resolved(base_dir);

        let options = PipelineOptions {
            app_build_cmd: self.app_build_cmd.clone(),
            app_server_cmd: self.app_server_cmd.clone(),
            app_server_hostname: self.app_server_hostname.clone(),
            mock_server_cmd: self.mock_server_cmd.clone(),
            mock_server_hostname: self.mock_server_hostname.clone(),
            git_sha: self.git_sha.clone(),
            github_org: self.github_org.clone(),
            github_repo: self.github_repo.clone(),
            github_token: self.github_token.clone(),
            kairos_host: self.kairos_host.clone(),
            prefix: self.prefix.clone(),
            profile: self.profile.clone(),
            resource_timing: self.resource_timing,
            sample_size: self.sitespeed_sample_size,
            screenshot: self.sitespeed_screenshot,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            urls: self.urls.clone(),
            builder_override: self
                .builder_container
                .clone()
                .filter(|id| !id.trim().is_empty()),
            tuning,
        };
        options.validate().context("Invalid options")?;
        Ok(options)
    }
}
