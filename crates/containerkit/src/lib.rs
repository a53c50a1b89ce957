//! # containerkit
//!
//! Idempotent container environment reconciliation.
//!
//! This crate provides functionality for:
//! - Ensuring an environment's network, volume and proxy container exist
//! - Enabling and disabling optional service containers
//! - Running a command inside a container and waiting for it with backoff
//!
//! Nothing assumes a clean slate: every resource is listed first and reused
//! when it already exists.
//!
//! ## Example
//!
//! ```no_run
//! use containerkit::{Client, EnvironmentSpec};
//!
//! let client = Client::new().expect("docker not available");
//! let report = client.ensure_environment(&EnvironmentSpec::new("devbox")).expect("init failed");
//! println!("proxy {}", report.proxy);
//! ```

pub mod backend;
pub mod error;
pub mod reconcile;
pub mod types;

pub use error::{Error, Result};
pub use reconcile::{
    EnvironmentReport, EnvironmentSpec, Service, ServiceOutcome, ensure_environment,
    ensure_service, exec_and_wait,
};
pub use types::{ContainerInfo, Filter, Outcome, PortBinding};

use backend::{Backend, docker::DockerBackend};
use converge::{CancelToken, PollConfig};
use std::path::Path;

/// High-level client for container operations.
///
/// The client wraps a backend and provides the reconciliation entry points.
pub struct Client {
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a client that runs `docker` on this host.
    pub fn new() -> Result<Self> {
        Ok(Self {
            backend: Box::new(DockerBackend::new()?),
        })
    }

    /// Create a client that runs `docker` inside `machine`.
    pub fn in_machine(vm_binary: &Path, machine: &str) -> Self {
        Self {
            backend: Box::new(DockerBackend::in_machine(vm_binary, machine)),
        }
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Ensure the environment's network, volume and proxy exist and the proxy runs.
    pub fn ensure_environment(&self, spec: &EnvironmentSpec) -> Result<EnvironmentReport> {
        ensure_environment(self.backend.as_ref(), spec)
    }

    /// Enable or disable one service container.
    pub fn ensure_service(
        &self,
        environment: &str,
        service: Service,
        enabled: bool,
    ) -> Result<ServiceOutcome> {
        ensure_service(self.backend.as_ref(), environment, service, enabled)
    }

    // =========================================================================
    // Containers
    // =========================================================================

    /// Containers carrying `label=value`, stopped ones included.
    pub fn containers_labeled(&self, label: &str, value: &str) -> Result<Vec<ContainerInfo>> {
        self.backend
            .list_containers(&[Filter::label(label, value)], true)
    }

    /// The container named exactly `name`.
    pub fn find_container(&self, name: &str) -> Result<ContainerInfo> {
        self.backend
            .list_containers(&[Filter::name(name)], true)?
            .into_iter()
            .find(|c| c.has_name(name))
            .ok_or_else(|| Error::ContainerNotFound(name.to_string()))
    }

    /// Run `command` in the named container and wait for it to exit.
    pub fn exec_and_wait(
        &self,
        container: &str,
        command: &[String],
        config: &PollConfig,
        cancel: &CancelToken,
    ) -> Result<()> {
        let found = self.find_container(container)?;
        if !found.is_running() {
            self.backend.start_container(&found.id)?;
        }
        exec_and_wait(self.backend.as_ref(), container, command, config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::types::Labels;

    #[test]
    fn test_find_container_exact() {
        let backend = MockBackend {
            containers: vec![ContainerInfo {
                id: "c1".into(),
                names: vec!["mysql_5.7_33061".into()],
                state: "running".into(),
                labels: Labels::new(),
            }],
            ..MockBackend::default()
        };
        let client = Client::with_backend(Box::new(backend));
        assert!(matches!(
            client.find_container("mysql_5.7_3306"),
            Err(Error::ContainerNotFound(_))
        ));
        assert_eq!(client.find_container("mysql_5.7_33061").unwrap().id, "c1");
    }

    #[test]
    fn test_exec_starts_stopped_container() {
        let backend = MockBackend {
            containers: vec![ContainerInfo {
                id: "c1".into(),
                names: vec!["postgres_11.7_5432".into()],
                state: "exited".into(),
                labels: Labels::new(),
            }],
            ..MockBackend::default()
        };
        let client = Client::with_backend(Box::new(backend));
        client
            .exec_and_wait(
                "postgres_11.7_5432",
                &["true".to_string()],
                &PollConfig::default(),
                &CancelToken::new(),
            )
            .unwrap();
    }
}
