//! In-memory records of containers created or adopted by a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A host binding for a published container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// The parts of an engine inspection the pipeline cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectData {
    /// Engine-assigned identifier
    pub id: String,
    /// Container name as reported by the engine (leading `/` included)
    pub name: String,
    /// Address on the default bridge network
    pub ip_address: Option<String>,
    /// Published ports keyed by `port/proto`, e.g. `3000/tcp`
    pub ports: HashMap<String, Vec<PortBinding>>,
    /// Exit status once the container has stopped
    pub exit_code: Option<i64>,
    /// Whether the container is still running
    pub running: bool,
}

impl InspectData {
    /// First host binding published for `port`.
    pub fn first_binding(&self, port: &str) -> Option<&PortBinding> {
        self.ports.get(port).and_then(|bindings| bindings.first())
    }
}

/// One running or completed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub inspect: Option<InspectData>,
    /// Set when the container was supplied from outside this process and must survive teardown.
    pub protected: bool,
}

impl ContainerHandle {
    /// Handle for a container this process created but has not inspected yet.
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inspect: None,
            protected: false,
        }
    }

    /// Handle for a container this process created and inspected.
    pub fn inspected(data: InspectData) -> Self {
        Self {
            id: data.id.clone(),
            inspect: Some(data),
            protected: false,
        }
    }

    /// Wrap an externally supplied container; it is never removed by teardown.
    pub fn reused(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inspect: None,
            protected: true,
        }
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.inspect.as_ref().and_then(|d| d.ip_address.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        self.inspect.as_ref().map(|d| d.name.as_str())
    }

    pub fn binding(&self, port: &str) -> Option<&PortBinding> {
        self.inspect.as_ref().and_then(|d| d.first_binding(port))
    }

    /// Shortened id for log output.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(12);
        self.id.get(..end).unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reused_handle_is_protected() {
        let handle = ContainerHandle::reused("deadbeef");
        assert!(handle.protected);
        assert!(handle.inspect.is_none());
        assert_eq!(handle.ip_address(), None);
    }

    #[test]
    fn test_binding_lookup() {
        let mut ports = HashMap::new();
        ports.insert(
            "3000/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "32768".to_string(),
            }],
        );
        let handle = ContainerHandle::inspected(InspectData {
            id: "0123456789abcdef".to_string(),
            name: "/app".to_string(),
            ip_address: Some("172.17.0.2".to_string()),
            ports,
            exit_code: None,
            running: true,
        });

        assert!(!handle.protected);
        assert_eq!(handle.binding("3000/tcp").map(|b| b.host_port.as_str()), Some("32768"));
        assert!(handle.binding("8080/tcp").is_none());
        assert_eq!(handle.short_id(), "0123456789ab");
        assert_eq!(handle.name(), Some("/app"));
    }
}
