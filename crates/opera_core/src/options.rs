//! Pipeline options: the merged result of command-line flags and the optional
//! tuning file.
//!
//! Options are immutable once the pipeline starts and are shared between
//! stages through an `Arc`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Image names used by the stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub builder: String,
    pub mock_server: String,
    pub app: String,
    pub load_test: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            builder: "electrode-app-builder".to_string(),
            mock_server: "otto-mock-server".to_string(),
            app: "electrode-app".to_string(),
            load_test: "sitespeedio/sitespeed.io:3.11.5".to_string(),
        }
    }
}

/// Budget for waiting on the application server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Container port the app server listens on
    pub app_port: String,
    /// Total number of probe attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
    /// Per-request timeout
    pub request_timeout_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            app_port: "3000/tcp".to_string(),
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

/// Load-test container settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestSettings {
    /// Attempts per URL
    pub retries: u32,
    /// Fixed pause between attempts
    pub retry_interval_ms: u64,
    /// Run the per-URL tasks concurrently instead of one after another
    pub concurrent: bool,
    pub cpu_shares: i64,
    pub selenium_server: String,
    pub result_dir: String,
}

impl Default for LoadTestSettings {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_interval_ms: 30_000,
            concurrent: false,
            cpu_shares: 2 * 1024,
            selenium_server: "http://0.0.0.0:4444/wd/hub".to_string(),
            result_dir: "/tmp/sitespeed_result".to_string(),
        }
    }
}

/// Host files bind-mounted into the load-test container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    pub chrome_config: PathBuf,
    pub mobproxy_patch: PathBuf,
    pub node_modules: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            chrome_config: PathBuf::from("volumes/sitespeed/chrome.json"),
            mobproxy_patch: PathBuf::from("patches/mobproxy.js"),
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

impl AssetPaths {
    /// Resolve relative paths against `base`.
    pub fn resolved(&self, base: &Path) -> Self {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            chrome_config: resolve(&self.chrome_config),
            mobproxy_patch: resolve(&self.mobproxy_patch),
            node_modules: resolve(&self.node_modules),
        }
    }
}

/// Settings for the metrics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Base URL used to build commit links
    pub git_web_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            git_web_url: "https://github.com".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Tuning loaded from the TOML config file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub images: ImageSettings,
    pub readiness: ReadinessSettings,
    pub load_test: LoadTestSettings,
    pub assets: AssetPaths,
    pub report: ReportSettings,
}

impl Tuning {
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::ConfigFile(e.to_string()))
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigFile(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub app_build_cmd: String,
    pub app_server_cmd: String,
    pub app_server_hostname: String,
    pub mock_server_cmd: Option<String>,
    pub mock_server_hostname: String,
    pub git_sha: String,
    pub github_org: String,
    pub github_repo: String,
    #[serde(skip_serializing, default)]
    pub github_token: String,
    pub kairos_host: Option<String>,
    pub prefix: String,
    pub profile: String,
    pub resource_timing: bool,
    pub sample_size: u32,
    pub screenshot: bool,
    /// Run timestamp in milliseconds since the epoch
    pub timestamp: i64,
    pub urls: Vec<String>,
    /// Id of an existing builder container to reuse instead of building
    pub builder_override: Option<String>,
    #[serde(flatten)]
    pub tuning: Tuning,
}

impl PipelineOptions {
    /// Target URLs, with space-separated entries split apart.
    pub fn expanded_urls(&self) -> Vec<String> {
        self.urls
            .iter()
            .flat_map(|u| u.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    /// Metrics tenant derived from the repository coordinates.
    pub fn tenant(&self) -> String {
        snake_case(&format!("{}/{}", self.github_org, self.github_repo))
    }

    pub fn has_mock_server(&self) -> bool {
        self.mock_server_cmd
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    /// Check the invariants the stages rely on.
    pub fn validate(&self) -> PipelineResult<()> {
        let required = [
            ("app-build-cmd", &self.app_build_cmd),
            ("app-server-cmd", &self.app_server_cmd),
            ("git-sha", &self.git_sha),
            ("github-org", &self.github_org),
            ("github-repo", &self.github_repo),
        ];
        for (flag, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::InvalidOptions(format!("--{} must not be empty", flag)));
            }
        }
        if self.expanded_urls().is_empty() {
            return Err(PipelineError::InvalidOptions("at least one --url is required".to_string()));
        }
        if self.sample_size == 0 {
            return Err(PipelineError::InvalidOptions(
                "--sitespeed-sample-size must be at least 1".to_string(),
            ));
        }
        if self.tuning.load_test.retries == 0 {
            return Err(PipelineError::InvalidOptions(
                "--sitespeed-retries must be at least 1".to_string(),
            ));
        }
        if self.tuning.readiness.max_attempts == 0 {
            return Err(PipelineError::InvalidOptions(
                "readiness.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lower-case words joined by underscores.
///
/// Words break on any non-alphanumeric character, on lower-to-upper case
/// changes, at the end of an upper-case run followed by a lower-case letter,
/// and between letters and digits: `electrode-io/myApp2` becomes
/// `electrode_io_my_app_2`.
pub fn snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let next = chars.get(i + 1).copied();
            let boundary = prev.is_alphanumeric()
                && ((prev.is_lowercase() && c.is_uppercase())
                    || (prev.is_numeric() != c.is_numeric())
                    || (prev.is_uppercase()
                        && c.is_uppercase()
                        && next.map(char::is_lowercase).unwrap_or(false)));
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }

    words.join("_")
}
