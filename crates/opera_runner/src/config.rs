//! Container configuration types.

use serde::{Deserialize, Serialize};

/// How a container's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Output is attached and forwarded; the container gets a TTY and an open stdin.
    Attached,
    /// Nothing is attached; the container runs in the background.
    #[default]
    Detached,
}

/// Container configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Docker image to use (with tag when needed)
    pub image: String,
    /// Command to run; empty uses the image default
    pub command: Vec<String>,
    /// Environment variables as `KEY=value` in insertion order
    pub env: Vec<String>,
    /// Host bind mounts (`host:container`)
    pub binds: Vec<String>,
    /// `/etc/hosts` entries (`hostname:ip`)
    pub extra_hosts: Vec<String>,
    /// Legacy links (`name:alias`)
    pub links: Vec<String>,
    /// Containers to share volumes with
    pub volumes_from: Vec<String>,
    /// Publish every exposed port on a random host port
    pub publish_all_ports: bool,
    /// Relative CPU weight
    pub cpu_shares: Option<i64>,
    /// Container hostname
    pub hostname: Option<String>,
    /// Stream wiring
    pub stream_mode: StreamMode,
    /// Container name prefix; a random suffix is appended
    pub name_prefix: Option<String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            env: Vec::new(),
            binds: Vec::new(),
            extra_hosts: Vec::new(),
            links: Vec::new(),
            volumes_from: Vec::new(),
            publish_all_ports: false,
            cpu_shares: None,
            hostname: None,
            stream_mode: StreamMode::Detached,
            name_prefix: None,
        }
    }

    pub fn command(mut self, cmd: Vec<String>) -> Self {
        self.command = cmd;
        self
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn bind(mut self, host: impl AsRef<str>, container: impl AsRef<str>) -> Self {
        self.binds
            .push(format!("{}:{}", host.as_ref(), container.as_ref()));
        self
    }

    pub fn extra_host(mut self, hostname: impl AsRef<str>, ip: impl AsRef<str>) -> Self {
        self.extra_hosts
            .push(format!("{}:{}", hostname.as_ref(), ip.as_ref()));
        self
    }

    pub fn link(mut self, name: impl AsRef<str>, alias: impl AsRef<str>) -> Self {
        // Inspected names carry a leading slash which the engine accepts either way.
        self.links.push(format!("{}:{}", name.as_ref(), alias.as_ref()));
        self
    }

    pub fn volumes_from(mut self, container_id: impl Into<String>) -> Self {
        self.volumes_from.push(container_id.into());
        self
    }

    pub fn publish_all_ports(mut self) -> Self {
        self.publish_all_ports = true;
        self
    }

    pub fn cpu_shares(mut self, shares: i64) -> Self {
        self.cpu_shares = Some(shares);
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn attached(mut self) -> Self {
        self.stream_mode = StreamMode::Attached;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn is_attached(&self) -> bool {
        self.stream_mode == StreamMode::Attached
    }

    /// Prefix used when forwarding this container's output.
    pub fn log_prefix(&self) -> String {
        format!("[{}] ", self.image)
    }

    /// Look up an environment value by key.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_builder() {
        let config = ContainerConfig::new("electrode-app")
            .env("APP_SERVER_CMD", "npm start")
            .volumes_from("abc123")
            .extra_host("dev.walmart.com", "172.17.0.3")
            .publish_all_ports();

        assert_eq!(config.image, "electrode-app");
        assert_eq!(config.env_value("APP_SERVER_CMD"), Some("npm start"));
        assert_eq!(config.volumes_from, vec!["abc123".to_string()]);
        assert_eq!(config.extra_hosts, vec!["dev.walmart.com:172.17.0.3".to_string()]);
        assert!(config.publish_all_ports);
        assert!(!config.is_attached());
    }

    #[test]
    fn test_env_value_with_equals_in_value() {
        let config = ContainerConfig::new("x").env("APP_BUILD_CMD", "make A=1");
        assert_eq!(config.env_value("APP_BUILD_CMD"), Some("make A=1"));
        assert_eq!(config.env_value("MISSING"), None);
    }

    #[test]
    fn test_log_prefix_uses_image() {
        let config = ContainerConfig::new("sitespeedio/sitespeed.io:3.11.5").attached();
        assert!(config.is_attached());
        assert_eq!(config.log_prefix(), "[sitespeedio/sitespeed.io:3.11.5] ");
    }
}
