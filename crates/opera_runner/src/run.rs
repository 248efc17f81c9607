//! Run-attached and run-detached container primitives.
//!
//! Both primitives hand back every container they managed to create, even on
//! failure, so callers can record it for cleanup.

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::error::RunnerError;
use crate::forward::{LogForwarder, LogSink};
use crate::handle::ContainerHandle;
use crate::runtime::{ContainerRuntime, OutputStream};

/// How long to keep draining output after the container has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed run, with the container it created if it got that far.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    pub handle: Option<ContainerHandle>,
    #[source]
    pub error: RunnerError,
}

impl RunFailure {
    fn before_create(error: RunnerError) -> Self {
        Self {
            handle: None,
            error,
        }
    }

    fn with_container(id: &str, error: RunnerError) -> Self {
        Self {
            handle: Some(ContainerHandle::created(id)),
            error,
        }
    }
}

/// Outcome of a run primitive.
pub type RunOutcome = Result<ContainerHandle, RunFailure>;

/// Create, attach, start and wait for a container to exit.
///
/// Output is forwarded to `sink` line by line, prefixed with the image name.
/// A non-zero exit status fails with [`RunnerError::NonZeroExit`].
pub async fn run_attached(
    runtime: &dyn ContainerRuntime,
    config: &ContainerConfig,
    sink: LogSink,
) -> RunOutcome {
    let id = runtime
        .create_container(config)
        .await
        .map_err(RunFailure::before_create)?;
    debug!(image = %config.image, container_id = %id, "Container created");

    let output = runtime
        .attach_output(&id)
        .await
        .map_err(|e| RunFailure::with_container(&id, e))?;
    let forwarder = LogForwarder::new(config.log_prefix(), sink);
    let mut pump = tokio::spawn(pump_output(output, forwarder));

    if let Err(e) = runtime.start_container(&id).await {
        pump.abort();
        return Err(RunFailure::with_container(&id, e));
    }
    info!(image = %config.image, container_id = %id, "Container started, waiting for exit");

    let status_code = match runtime.wait_container(&id).await {
        Ok(code) => code,
        Err(e) => {
            pump.abort();
            return Err(RunFailure::with_container(&id, e));
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut pump).await.is_err() {
        warn!(container_id = %id, "Output stream still open after exit, detaching");
        pump.abort();
    }

    if status_code != 0 {
        return Err(RunFailure::with_container(
            &id,
            RunnerError::NonZeroExit {
                image: config.image.clone(),
                status_code,
            },
        ));
    }

    let data = runtime
        .inspect(&id)
        .await
        .map_err(|e| RunFailure::with_container(&id, e))?;
    info!(image = %config.image, container_id = %id, "Container exited cleanly");

    Ok(ContainerHandle::inspected(data))
}

/// Create and start a container, then inspect it without waiting for exit.
pub async fn run_detached(runtime: &dyn ContainerRuntime, config: &ContainerConfig) -> RunOutcome {
    let id = runtime
        .create_container(config)
        .await
        .map_err(RunFailure::before_create)?;

    runtime
        .start_container(&id)
        .await
        .map_err(|e| RunFailure::with_container(&id, e))?;

    let data = runtime
        .inspect(&id)
        .await
        .map_err(|e| RunFailure::with_container(&id, e))?;
    info!(
        image = %config.image,
        container_id = %id,
        ip = data.ip_address.as_deref().unwrap_or("-"),
        "Container running"
    );

    Ok(ContainerHandle::inspected(data))
}

async fn pump_output(mut output: OutputStream, mut forwarder: LogForwarder) {
    while let Some(chunk) = output.next().await {
        match chunk {
            Ok(bytes) => {
                if let Err(e) = forwarder.push(&bytes) {
                    warn!(error = %e, "Failed to forward container output");
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "Container output stream closed with error");
                break;
            }
        }
    }
    if let Err(e) = forwarder.finish() {
        warn!(error = %e, "Failed to forward container output");
    }
}
