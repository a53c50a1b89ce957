//! Backend abstraction for container runtime operations.
//!
//! The [`Backend`] trait defines the interface for interacting with the
//! container runtime, allowing for different implementations (the docker
//! CLI on the host or inside the machine, recording mocks for testing).

pub mod docker;

use crate::error::Result;
use crate::types::{
    ContainerInfo, ContainerSpec, ExecHandle, ExecStatus, Filter, NetworkInfo, NetworkSpec,
    VolumeInfo, VolumeSpec,
};

/// Backend trait for container runtime operations.
///
/// Listing filters are fuzzy (a name filter matches substrings), so callers
/// must still compare names exactly.
pub trait Backend {
    /// List networks matching all `filters`.
    fn list_networks(&self, filters: &[Filter]) -> Result<Vec<NetworkInfo>>;

    /// List volumes matching all `filters`.
    fn list_volumes(&self, filters: &[Filter]) -> Result<Vec<VolumeInfo>>;

    /// List containers matching all `filters`, stopped ones included when `all`.
    fn list_containers(&self, filters: &[Filter], all: bool) -> Result<Vec<ContainerInfo>>;

    /// Create a network and return its id.
    fn create_network(&self, spec: &NetworkSpec) -> Result<String>;

    /// Create a volume and return its name.
    fn create_volume(&self, spec: &VolumeSpec) -> Result<String>;

    /// Create (but do not start) a container and return its id.
    fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a container. Starting a running container is not an error.
    fn start_container(&self, id: &str) -> Result<()>;

    /// Force-remove a container and its anonymous volumes.
    fn remove_container(&self, id: &str) -> Result<()>;

    /// Start `command` inside `container` without waiting for it.
    fn exec_detached(&self, container: &str, command: &[String]) -> Result<ExecHandle>;

    /// Whether a detached exec has finished.
    fn exec_status(&self, handle: &ExecHandle) -> Result<ExecStatus>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records every mutating call and serves canned listings.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        pub(crate) networks: Vec<NetworkInfo>,
        pub(crate) volumes: Vec<VolumeInfo>,
        pub(crate) containers: Vec<ContainerInfo>,
        pub(crate) calls: RefCell<Vec<String>>,
        pub(crate) created_containers: RefCell<Vec<ContainerSpec>>,
        /// `exec_status` reports `Running` this many times before exiting
        pub(crate) running_polls: Cell<u32>,
        pub(crate) exit_code: i32,
    }

    impl MockBackend {
        pub(crate) fn calls_starting_with(&self, prefix: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    fn matches(filters: &[Filter], name: &str, labels: &crate::types::Labels) -> bool {
        filters.iter().all(|f| match f {
            Filter::Name(n) => name.contains(n.as_str()),
            Filter::Label(k, v) => labels.get(k) == Some(v),
        })
    }

    impl Backend for MockBackend {
        fn list_networks(&self, filters: &[Filter]) -> Result<Vec<NetworkInfo>> {
            Ok(self
                .networks
                .iter()
                .filter(|n| matches(filters, &n.name, &n.labels))
                .cloned()
                .collect())
        }

        fn list_volumes(&self, filters: &[Filter]) -> Result<Vec<VolumeInfo>> {
            Ok(self
                .volumes
                .iter()
                .filter(|v| matches(filters, &v.name, &v.labels))
                .cloned()
                .collect())
        }

        fn list_containers(&self, filters: &[Filter], all: bool) -> Result<Vec<ContainerInfo>> {
            Ok(self
                .containers
                .iter()
                .filter(|c| all || c.is_running())
                .filter(|c| c.names.iter().any(|n| matches(filters, n, &c.labels)))
                .cloned()
                .collect())
        }

        fn create_network(&self, spec: &NetworkSpec) -> Result<String> {
            self.record(format!("create_network {}", spec.name));
            Ok(format!("net-{}", spec.name))
        }

        fn create_volume(&self, spec: &VolumeSpec) -> Result<String> {
            self.record(format!("create_volume {}", spec.name));
            Ok(spec.name.clone())
        }

        fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
            self.record(format!("create_container {}", spec.name));
            self.created_containers.borrow_mut().push(spec.clone());
            Ok(format!("id-{}", spec.name))
        }

        fn start_container(&self, id: &str) -> Result<()> {
            self.record(format!("start_container {id}"));
            Ok(())
        }

        fn remove_container(&self, id: &str) -> Result<()> {
            self.record(format!("remove_container {id}"));
            Ok(())
        }

        fn exec_detached(&self, container: &str, command: &[String]) -> Result<ExecHandle> {
            self.record(format!("exec_detached {container}"));
            Ok(ExecHandle {
                container: container.to_string(),
                command: command.join(" "),
                status_file: "/tmp/status".to_string(),
            })
        }

        fn exec_status(&self, _handle: &ExecHandle) -> Result<ExecStatus> {
            self.record("exec_status".to_string());
            let remaining = self.running_polls.get();
            if remaining > 0 {
                self.running_polls.set(remaining - 1);
                Ok(ExecStatus::Running)
            } else {
                Ok(ExecStatus::Exited(self.exit_code))
            }
        }
    }
}
