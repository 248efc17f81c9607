//! Readiness probing of the application server.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::options::ReadinessSettings;
use crate::retry::{retry, RetryPolicy};

/// Classification of a failed probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The server is not listening yet, or dropped the connection while starting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProbeErrorKind::ConnectionRefused | ProbeErrorKind::ConnectionReset
        )
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProbeErrorKind::Timeout
        } else {
            source_kind(err).unwrap_or(ProbeErrorKind::Other)
        };
        Self::new(kind, err.to_string())
    }
}

/// Walk the source chain down to the socket or HTTP connection error.
///
/// A connection the peer closes before sending a response counts as a reset:
/// published ports accept and drop connections until the app listens.
fn source_kind(err: &(dyn StdError + 'static)) -> Option<ProbeErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(match io_err.kind() {
                io::ErrorKind::ConnectionRefused => ProbeErrorKind::ConnectionRefused,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof => ProbeErrorKind::ConnectionReset,
                io::ErrorKind::TimedOut => ProbeErrorKind::Timeout,
                _ => ProbeErrorKind::Other,
            });
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() {
                return Some(ProbeErrorKind::ConnectionReset);
            }
        }
        current = e.source();
    }
    None
}

/// A single HTTP reachability check.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Succeeds on any HTTP response, whatever its status.
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// HTTP GET probe backed by reqwest.
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e))?;
        debug!(url, status = response.status().as_u16(), "Probe got a response");
        Ok(())
    }
}

/// Polls a URL with exponential backoff until it answers.
pub struct ReadinessProber {
    probe: Arc<dyn HttpProbe>,
    policy: RetryPolicy<ProbeError>,
}

impl ReadinessProber {
    pub fn new(probe: Arc<dyn HttpProbe>, settings: &ReadinessSettings) -> Self {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.max_attempts,
        )
        .retry_if(ProbeError::is_retryable);
        Self { probe, policy }
    }

    /// Wait until `url` answers. Returns the number of attempts it took.
    pub async fn wait_until_ready(&self, url: &str) -> PipelineResult<u32> {
        info!(url, max_attempts = self.policy.max_attempts, "Waiting for application server to start up");

        let probe = self.probe.as_ref();
        let result = retry(&self.policy, move |attempt| async move {
            debug!(url, attempt, "Probing application server");
            probe.probe(url).await.map(|()| attempt)
        })
        .await;

        match result {
            Ok(attempts) => {
                info!(url, attempts, "Application server is up");
                Ok(attempts)
            }
            Err(e) => {
                warn!(url, attempts = e.attempts, error = %e.error, "Application server failed to start");
                Err(PipelineError::ReadinessTimeout {
                    url: url.to_string(),
                    attempts: e.attempts,
                    last_error: e.error.to_string(),
                })
            }
        }
    }
}
