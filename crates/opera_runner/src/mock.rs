//! Mock container runtime for testing.
//!
//! Provides a scriptable implementation of the ContainerRuntime trait for
//! use in tests without a Docker engine. Behaviour is scripted per
//! "matcher": a matcher applies to a container when it equals the image
//! name or any argument of the container command.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::ContainerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::handle::{InspectData, PortBinding};
use crate::runtime::{ContainerRuntime, OutputStream, RemoveOptions};

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub container_id: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
struct ExitScript {
    matcher: String,
    codes: VecDeque<i64>,
}

#[derive(Debug, Clone)]
struct MockContainer {
    index: usize,
    config: ContainerConfig,
    exit_code: Option<i64>,
}

fn matches(matcher: &str, config: &ContainerConfig) -> bool {
    config.image == matcher || config.command.iter().any(|arg| arg == matcher)
}

/// Mock container runtime for testing.
///
/// Containers get sequential ids (`mock-1`, `mock-2`, ...). Unless scripted
/// otherwise every container exits with status 0, gets the bridge address
/// `172.17.0.<n+1>`, and publishes `3000/tcp` when asked to publish all ports.
#[derive(Clone)]
pub struct MockRuntime {
    available: Arc<RwLock<bool>>,
    exit_scripts: Arc<RwLock<Vec<ExitScript>>>,
    outputs: Arc<RwLock<Vec<(String, String)>>>,
    networks: Arc<RwLock<Vec<(String, String)>>>,
    failing_creates: Arc<RwLock<Vec<String>>>,
    failing_starts: Arc<RwLock<Vec<String>>>,
    failing_removes: Arc<RwLock<Vec<String>>>,
    remove_delay: Arc<RwLock<Option<Duration>>>,
    containers: Arc<RwLock<HashMap<String, MockContainer>>>,
    /// Every container ever created, kept after removal
    created: Arc<RwLock<Vec<(String, ContainerConfig)>>>,
    next_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    removals_in_flight: Arc<AtomicUsize>,
    max_removals_in_flight: Arc<AtomicUsize>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            exit_scripts: Arc::new(RwLock::new(Vec::new())),
            outputs: Arc::new(RwLock::new(Vec::new())),
            networks: Arc::new(RwLock::new(Vec::new())),
            failing_creates: Arc::new(RwLock::new(Vec::new())),
            failing_starts: Arc::new(RwLock::new(Vec::new())),
            failing_removes: Arc::new(RwLock::new(Vec::new())),
            remove_delay: Arc::new(RwLock::new(None)),
            containers: Arc::new(RwLock::new(HashMap::new())),
            created: Arc::new(RwLock::new(Vec::new())),
            next_index: Arc::new(AtomicUsize::new(1)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            removals_in_flight: Arc::new(AtomicUsize::new(0)),
            max_removals_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set whether the engine answers pings.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Exit codes for successive runs of matching containers; the last one repeats.
    pub fn exit_codes(self, matcher: impl Into<String>, codes: Vec<i64>) -> Self {
        self.exit_scripts.write().push(ExitScript {
            matcher: matcher.into(),
            codes: codes.into(),
        });
        self
    }

    /// Output produced by matching containers when attached.
    pub fn output(self, matcher: impl Into<String>, text: impl Into<String>) -> Self {
        self.outputs.write().push((matcher.into(), text.into()));
        self
    }

    /// Bridge address reported for matching containers.
    pub fn network(self, matcher: impl Into<String>, ip: impl Into<String>) -> Self {
        self.networks.write().push((matcher.into(), ip.into()));
        self
    }

    /// Make container creation fail for matching configs.
    pub fn fail_create(self, matcher: impl Into<String>) -> Self {
        self.failing_creates.write().push(matcher.into());
        self
    }

    /// Make container start fail for matching configs.
    pub fn fail_start(self, matcher: impl Into<String>) -> Self {
        self.failing_starts.write().push(matcher.into());
        self
    }

    /// Make removal fail for matching configs, or for a container id.
    pub fn fail_remove(self, matcher: impl Into<String>) -> Self {
        self.failing_removes.write().push(matcher.into());
        self
    }

    /// Delay every removal, to observe teardown concurrency.
    pub fn remove_delay(self, delay: Duration) -> Self {
        *self.remove_delay.write() = Some(delay);
        self
    }

    /// Method names in call order.
    pub fn method_names(&self) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .map(|c| c.method.clone())
            .collect()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Ids of created containers, in creation order.
    pub fn created_ids(&self) -> Vec<String> {
        self.created.read().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Configs of created containers, in creation order, removed ones included.
    pub fn created_configs(&self) -> Vec<ContainerConfig> {
        self.created
            .read()
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }

    /// Ids passed to `remove_container`, in call order.
    pub fn removal_attempts(&self) -> Vec<String> {
        self.get_method_calls("remove_container")
            .into_iter()
            .filter_map(|c| c.container_id)
            .collect()
    }

    /// Highest number of removals observed running at the same time.
    pub fn max_concurrent_removals(&self) -> usize {
        self.max_removals_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, method: &str, container_id: Option<&str>, image: Option<&str>) {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            container_id: container_id.map(str::to_string),
            image: image.map(str::to_string),
        });
    }

    fn container(&self, id: &str) -> RunnerResult<MockContainer> {
        self.containers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::InspectFailed {
                id: id.to_string(),
                message: "no such container".to_string(),
            })
    }

    fn next_exit_code(&self, config: &ContainerConfig) -> i64 {
        let mut scripts = self.exit_scripts.write();
        let Some(script) = scripts.iter_mut().find(|s| matches(&s.matcher, config)) else {
            return 0;
        };
        if script.codes.len() > 1 {
            script.codes.pop_front().unwrap_or(0)
        } else {
            script.codes.front().copied().unwrap_or(0)
        }
    }

    fn scripted<'a>(entries: &'a [(String, String)], config: &ContainerConfig) -> Option<&'a str> {
        entries
            .iter()
            .find(|(matcher, _)| matches(matcher, config))
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> RunnerResult<()> {
        self.record_call("ping", None, None);
        if *self.available.read() {
            Ok(())
        } else {
            Err(RunnerError::DockerNotAvailable("mock engine offline".to_string()))
        }
    }

    async fn create_container(&self, config: &ContainerConfig) -> RunnerResult<String> {
        self.record_call("create_container", None, Some(&config.image));

        if self.failing_creates.read().iter().any(|m| matches(m, config)) {
            return Err(RunnerError::CreateFailed {
                image: config.image.clone(),
                message: "simulated create failure".to_string(),
            });
        }

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock-{}", index);
        self.containers.write().insert(
            id.clone(),
            MockContainer {
                index,
                config: config.clone(),
                exit_code: None,
            },
        );
        self.created.write().push((id.clone(), config.clone()));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RunnerResult<()> {
        self.record_call("start_container", Some(id), None);
        let container = self.container(id)?;
        if self.failing_starts.read().iter().any(|m| matches(m, &container.config)) {
            return Err(RunnerError::StartFailed {
                id: id.to_string(),
                message: "simulated start failure".to_string(),
            });
        }
        Ok(())
    }

    async fn attach_output(&self, id: &str) -> RunnerResult<OutputStream> {
        self.record_call("attach_output", Some(id), None);
        let container = self.container(id)?;
        let text = Self::scripted(&self.outputs.read(), &container.config)
            .unwrap_or_default()
            .to_string();

        let chunks: Vec<RunnerResult<Vec<u8>>> = text
            .as_bytes()
            .chunks(7)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn wait_container(&self, id: &str) -> RunnerResult<i64> {
        self.record_call("wait_container", Some(id), None);
        let container = self.container(id)?;
        let code = self.next_exit_code(&container.config);
        if let Some(entry) = self.containers.write().get_mut(id) {
            entry.exit_code = Some(code);
        }
        Ok(code)
    }

    async fn inspect(&self, id: &str) -> RunnerResult<InspectData> {
        self.record_call("inspect", Some(id), None);
        let container = self.container(id)?;

        let ip = Self::scripted(&self.networks.read(), &container.config)
            .map(str::to_string)
            .unwrap_or_else(|| format!("172.17.0.{}", container.index + 1));

        let mut ports = HashMap::new();
        if container.config.publish_all_ports {
            ports.insert(
                "3000/tcp".to_string(),
                vec![PortBinding {
                    host_ip: "0.0.0.0".to_string(),
                    host_port: (32768 + container.index).to_string(),
                }],
            );
        }

        Ok(InspectData {
            id: id.to_string(),
            name: format!("/{}", id),
            ip_address: Some(ip),
            ports,
            exit_code: container.exit_code,
            running: container.exit_code.is_none(),
        })
    }

    async fn remove_container(&self, id: &str, _options: RemoveOptions) -> RunnerResult<()> {
        self.record_call("remove_container", Some(id), None);

        let in_flight = self.removals_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_removals_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.remove_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.removals_in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self.failing_removes.read().clone();
        let config = self.containers.read().get(id).map(|c| c.config.clone());
        let should_fail = failing.iter().any(|m| {
            m == id || config.as_ref().map_or(false, |c| matches(m, c))
        });

        if should_fail || config.is_none() {
            return Err(RunnerError::RemoveFailed {
                id: id.to_string(),
                message: if should_fail {
                    "simulated remove failure".to_string()
                } else {
                    "no such container".to_string()
                },
            });
        }

        self.containers.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runtime_exit_script_repeats_last_code() {
        let runtime = MockRuntime::new().exit_codes("sitespeed", vec![1, 1, 0]);
        let config = ContainerConfig::new("sitespeed");

        let mut codes = Vec::new();
        for _ in 0..4 {
            let id = runtime.create_container(&config).await.unwrap();
            codes.push(runtime.wait_container(&id).await.unwrap());
        }

        assert_eq!(codes, vec![1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_mock_runtime_matches_command_args() {
        let runtime = MockRuntime::new().exit_codes("http://a.test/", vec![2]);
        let a = ContainerConfig::new("sitespeed").command(vec!["-u".into(), "http://a.test/".into()]);
        let b = ContainerConfig::new("sitespeed").command(vec!["-u".into(), "http://b.test/".into()]);

        let id_a = runtime.create_container(&a).await.unwrap();
        let id_b = runtime.create_container(&b).await.unwrap();

        assert_eq!(runtime.wait_container(&id_a).await.unwrap(), 2);
        assert_eq!(runtime.wait_container(&id_b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_runtime_published_port() {
        let runtime = MockRuntime::new();
        let id = runtime
            .create_container(&ContainerConfig::new("electrode-app").publish_all_ports())
            .await
            .unwrap();

        let data = runtime.inspect(&id).await.unwrap();
        assert!(data.running);
        assert!(data.first_binding("3000/tcp").is_some());
    }

    #[tokio::test]
    async fn test_mock_runtime_remove_unknown_fails() {
        let runtime = MockRuntime::new();
        let result = runtime.remove_container("external", RemoveOptions::purge()).await;
        assert!(matches!(result, Err(RunnerError::RemoveFailed { .. })));
        assert_eq!(runtime.removal_attempts(), vec!["external".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_runtime_remembers_removed_containers() {
        let runtime = MockRuntime::new();
        let id = runtime
            .create_container(&ContainerConfig::new("electrode-app").volumes_from("builder"))
            .await
            .unwrap();

        runtime.remove_container(&id, RemoveOptions::purge()).await.unwrap();

        assert_eq!(runtime.created_ids(), vec![id.clone()]);
        assert_eq!(runtime.created_configs()[0].volumes_from, vec!["builder"]);
        assert!(runtime.inspect(&id).await.is_err());
        assert!(runtime.remove_container(&id, RemoveOptions::purge()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_runtime_availability() {
        assert!(MockRuntime::new().ping().await.is_ok());
        assert!(MockRuntime::new().set_available(false).ping().await.is_err());
    }
}
