//! Docker implementation of ContainerRuntime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, InspectContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::service::{ContainerInspectResponse, HostConfig};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::handle::{InspectData, PortBinding};
use crate::runtime::{ContainerRuntime, OutputStream, RemoveOptions};

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Where the Docker engine lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix socket on this host.
    Local { socket_path: String },
    /// Remote engine over TLS with client certificates from `cert_path`.
    Remote { host: String, cert_path: PathBuf },
}

impl Endpoint {
    /// Resolve from `DOCKER_HOST`, `DOCKER_CERT_PATH` and `DOCKER_SOCKET`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("DOCKER_HOST").ok(),
            std::env::var("DOCKER_CERT_PATH").ok(),
            std::env::var("DOCKER_SOCKET").ok(),
        )
    }

    /// Remote only when both host and cert path are present.
    pub fn from_vars(
        host: Option<String>,
        cert_path: Option<String>,
        socket: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        match (non_empty(host), non_empty(cert_path)) {
            (Some(host), Some(cert_path)) => Self::Remote {
                host,
                cert_path: PathBuf::from(cert_path),
            },
            _ => Self::Local {
                socket_path: non_empty(socket).unwrap_or_else(|| DEFAULT_SOCKET.to_string()),
            },
        }
    }
}

/// Docker-based container runtime.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to the given endpoint. Does not contact the engine; see [`ContainerRuntime::ping`].
    pub fn connect(endpoint: &Endpoint) -> RunnerResult<Self> {
        let client = match endpoint {
            Endpoint::Local { socket_path } => {
                info!(socket = %socket_path, "Creating local docker client");
                Docker::connect_with_socket(
                    socket_path,
                    CONNECT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )?
            }
            Endpoint::Remote { host, cert_path } => {
                info!(host = %host, cert_path = %cert_path.display(), "Creating remote docker client");
                let ca = cert_file(cert_path, "ca.pem")?;
                let cert = cert_file(cert_path, "cert.pem")?;
                let key = cert_file(cert_path, "key.pem")?;
                Docker::connect_with_ssl(
                    host,
                    &key,
                    &cert,
                    &ca,
                    CONNECT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )?
            }
        };

        Ok(Self { client })
    }

    fn generate_container_name(prefix: Option<&str>) -> String {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        match prefix {
            Some(p) => format!("{}-{}", p, id),
            None => format!("operaio-{}", id),
        }
    }

    fn container_config(config: &ContainerConfig) -> Config<String> {
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        let attached = config.is_attached();

        let host_config = HostConfig {
            binds: non_empty(&config.binds),
            extra_hosts: non_empty(&config.extra_hosts),
            links: non_empty(&config.links),
            volumes_from: non_empty(&config.volumes_from),
            publish_all_ports: Some(config.publish_all_ports),
            cpu_shares: config.cpu_shares,
            ..Default::default()
        };

        Config {
            image: Some(config.image.clone()),
            cmd: non_empty(&config.command),
            env: non_empty(&config.env),
            hostname: config.hostname.clone(),
            attach_stdin: Some(attached),
            attach_stdout: Some(attached),
            attach_stderr: Some(attached),
            open_stdin: Some(attached),
            stdin_once: Some(false),
            tty: Some(attached),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

fn cert_file(dir: &Path, name: &str) -> RunnerResult<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(RunnerError::TlsConfig(format!(
            "missing {} in {}",
            name,
            dir.display()
        )));
    }
    Ok(path)
}

/// Reduce an engine inspection to the fields the pipeline reads.
pub fn inspect_data(response: ContainerInspectResponse) -> InspectData {
    let state = response.state.unwrap_or_default();
    let network = response.network_settings.unwrap_or_default();

    let ports = network
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip.unwrap_or_default(),
                    host_port: b.host_port.unwrap_or_default(),
                })
                .collect();
            (port, bindings)
        })
        .collect::<HashMap<_, _>>();

    InspectData {
        id: response.id.unwrap_or_default(),
        name: response.name.unwrap_or_default(),
        ip_address: network.ip_address.filter(|ip| !ip.is_empty()),
        ports,
        exit_code: state.exit_code,
        running: state.running.unwrap_or(false),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> RunnerResult<()> {
        self.client
            .ping()
            .await
            .map_err(|e| RunnerError::DockerNotAvailable(e.to_string()))?;
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> RunnerResult<String> {
        let name = Self::generate_container_name(config.name_prefix.as_deref());
        debug!("Creating container {} from image {}", name, config.image);

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), Self::container_config(config))
            .await
            .map_err(|e| RunnerError::CreateFailed {
                image: config.image.clone(),
                message: e.to_string(),
            })?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> RunnerResult<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RunnerError::StartFailed {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    async fn attach_output(&self, id: &str) -> RunnerResult<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };

        let results = self
            .client
            .attach_container(id, Some(options))
            .await
            .map_err(|e| RunnerError::AttachFailed {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        let output = results.output.map(|item| match item {
            Ok(LogOutput::StdOut { message })
            | Ok(LogOutput::StdErr { message })
            | Ok(LogOutput::StdIn { message })
            | Ok(LogOutput::Console { message }) => Ok(message.to_vec()),
            Err(e) => Err(RunnerError::DockerApi(e)),
        });

        Ok(Box::pin(output))
    }

    async fn wait_container(&self, id: &str) -> RunnerResult<i64> {
        let mut stream = self
            .client
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(exit)) => Ok(exit.status_code),
            // The engine reports non-zero exits through the error channel.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RunnerError::WaitFailed {
                id: id.to_string(),
                message: e.to_string(),
            }),
            None => Err(RunnerError::WaitFailed {
                id: id.to_string(),
                message: "wait stream ended without a status".to_string(),
            }),
        }
    }

    async fn inspect(&self, id: &str) -> RunnerResult<InspectData> {
        let response = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| RunnerError::InspectFailed {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        Ok(inspect_data(response))
    }

    async fn remove_container(&self, id: &str, options: RemoveOptions) -> RunnerResult<()> {
        self.client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: options.force,
                    v: options.remove_volumes,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RunnerError::RemoveFailed {
                id: id.to_string(),
                message: e.to_string(),
            })
    }
}
