//! Best-effort removal of every container the run created.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use opera_runner::{ContainerRuntime, RemoveOptions};

use crate::context::ContainerSet;

/// A container that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalFailure {
    pub role: String,
    pub container_id: String,
    pub message: String,
}

/// What teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Ids removed successfully
    pub removed: Vec<String>,
    /// Ids left alone because the run did not own them
    pub protected: Vec<String>,
    pub failures: Vec<RemovalFailure>,
}

impl TeardownReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes containers concurrently and collects failures instead of raising them.
#[derive(Debug, Clone, Copy)]
pub struct TeardownManager {
    options: RemoveOptions,
}

impl Default for TeardownManager {
    fn default() -> Self {
        Self {
            options: RemoveOptions::purge(),
        }
    }
}

impl TeardownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every non-protected container in `containers`.
    ///
    /// All removals are attempted whatever happens to the others.
    pub async fn teardown(
        &self,
        runtime: &dyn ContainerRuntime,
        containers: &ContainerSet,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();
        let mut removable = Vec::new();
        for entry in containers.iter() {
            if entry.handle.protected {
                info!(role = %entry.role, container_id = %entry.handle.id, "Keeping protected container");
                report.protected.push(entry.handle.id.clone());
            } else {
                removable.push(entry);
            }
        }

        info!(count = removable.len(), "Tearing down");

        let options = self.options;
        let results = join_all(removable.into_iter().map(|entry| async move {
            let result = runtime.remove_container(&entry.handle.id, options).await;
            (entry, result)
        }))
        .await;

        for (entry, result) in results {
            match result {
                Ok(()) => report.removed.push(entry.handle.id.clone()),
                Err(e) => {
                    warn!(
                        role = %entry.role,
                        container_id = %entry.handle.id,
                        error = %e,
                        "Error while removing container"
                    );
                    report.failures.push(RemovalFailure {
                        role: entry.role.to_string(),
                        container_id: entry.handle.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            removed = report.removed.len(),
            protected = report.protected.len(),
            failures = report.failures.len(),
            "Teardown complete"
        );
        report
    }
}
