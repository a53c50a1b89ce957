//! Resource specs and listing summaries.

use std::collections::BTreeMap;
use std::fmt;

/// Label keys applied to every managed resource.
pub mod labels {
    /// Environment a resource belongs to
    pub const ENVIRONMENT: &str = "com.devbox.environment";
    /// Role of the resource: `network`, `volume`, `proxy`, or a service name
    pub const TYPE: &str = "com.devbox.type";
    /// Proxy image version the container was created from
    pub const PROXY_VERSION: &str = "com.devbox.proxy-version";
}

pub type Labels = BTreeMap<String, String>;

/// Build a label map from pairs.
pub fn label_set<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A listing filter, passed to the runtime as `--filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Substring match on the name
    Name(String),
    /// Exact label match
    Label(String, String),
}

impl Filter {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Label(key.into(), value.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name={name}"),
            Self::Label(key, value) => write!(f, "label={key}={value}"),
        }
    }
}

/// A host port published from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

impl PortBinding {
    /// Bind `port` on loopback to the same port in the container.
    pub fn loopback(port: u16) -> Self {
        Self {
            host_ip: "127.0.0.1".to_string(),
            host_port: port,
            container_port: port,
        }
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host_ip, self.host_port, self.container_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub attachable: bool,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub driver: String,
    pub labels: Labels,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: Labels,
    pub ports: Vec<PortBinding>,
    /// Network to attach to
    pub network: Option<String>,
    /// `(volume, target)` pairs
    pub volumes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub labels: Labels,
}

impl ContainerInfo {
    /// Exact name match, ignoring the leading `/` the engine API adds.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// A command started inside a container without waiting for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecHandle {
    pub container: String,
    pub command: String,
    /// Where the exit code is written inside the container
    pub status_file: String,
}

/// State of a detached exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Running,
    Exited(i32),
}

/// What ensuring a resource did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Reused,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Reused => "reused",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_name_strips_leading_slash() {
        let info = ContainerInfo {
            id: "abc".into(),
            names: vec!["/devbox-proxy".into()],
            state: "exited".into(),
            labels: Labels::new(),
        };
        assert!(info.has_name("devbox-proxy"));
        assert!(!info.has_name("devbox"));
        assert!(!info.is_running());
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(Filter::name("devbox").to_string(), "name=devbox");
        assert_eq!(
            Filter::label(labels::TYPE, "redis").to_string(),
            "label=com.devbox.type=redis"
        );
    }

    #[test]
    fn test_port_binding_display() {
        assert_eq!(PortBinding::loopback(443).to_string(), "127.0.0.1:443:443");
    }
}
