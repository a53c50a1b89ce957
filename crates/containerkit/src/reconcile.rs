//! Idempotent environment reconciliation.
//!
//! Every resource is looked up first and created only when no resource with
//! exactly that name exists. Name filters from the runtime are substring
//! matches, so the listing is always narrowed by an exact comparison. The
//! proxy container is started at the end whether it was created or found.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{
    ContainerSpec, ExecStatus, Filter, NetworkSpec, Outcome, PortBinding, VolumeSpec, label_set,
    labels,
};
use converge::{CancelToken, PollConfig, poll_until};
use log::info;
use std::fmt;
use std::str::FromStr;

/// Default proxy image.
pub const PROXY_IMAGE: &str = "devbox/proxy";
pub const PROXY_VERSION: &str = "latest";

/// Where the environment volume is mounted in the proxy.
const PROXY_DATA_DIR: &str = "/data";

/// One development environment: network, volume and proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub name: String,
    pub proxy_image: String,
    pub proxy_version: String,
    pub ports: Vec<PortBinding>,
}

impl EnvironmentSpec {
    /// Defaults: proxy on 80, 443 and 5000, loopback only.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proxy_image: PROXY_IMAGE.to_string(),
            proxy_version: PROXY_VERSION.to_string(),
            ports: [80, 443, 5000].into_iter().map(PortBinding::loopback).collect(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<PortBinding>) -> Self {
        self.ports = ports;
        self
    }

    pub fn network_name(&self) -> String {
        format!("{}-network", self.name)
    }

    pub fn volume_name(&self) -> String {
        self.name.clone()
    }

    pub fn proxy_name(&self) -> String {
        format!("{}-proxy", self.name)
    }
}

/// What [`ensure_environment`] did to each resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub network: Outcome,
    pub network_id: String,
    pub volume: Outcome,
    pub proxy: Outcome,
    pub proxy_id: String,
}

/// Ensure the network, volume and proxy container exist and the proxy runs.
pub fn ensure_environment(backend: &dyn Backend, spec: &EnvironmentSpec) -> Result<EnvironmentReport> {
    let (network, network_id) = ensure_network(backend, spec)?;
    let volume = ensure_volume(backend, spec)?;
    let (proxy, proxy_id) = ensure_proxy(backend, spec)?;

    backend.start_container(&proxy_id)?;
    info!("proxy {} started", spec.proxy_name());

    Ok(EnvironmentReport {
        network,
        network_id,
        volume,
        proxy,
        proxy_id,
    })
}

fn ensure_network(backend: &dyn Backend, spec: &EnvironmentSpec) -> Result<(Outcome, String)> {
    let name = spec.network_name();
    let existing = backend
        .list_networks(&[Filter::name(&name)])?
        .into_iter()
        .find(|n| n.name == name);

    if let Some(network) = existing {
        info!("network {name} exists, reusing");
        return Ok((Outcome::Reused, network.id));
    }

    let id = backend.create_network(&NetworkSpec {
        name: name.clone(),
        driver: "bridge".to_string(),
        attachable: true,
        labels: label_set([(labels::ENVIRONMENT, spec.name.as_str()), (labels::TYPE, "network")]),
    })?;
    info!("network {name} created");
    Ok((Outcome::Created, id))
}

fn ensure_volume(backend: &dyn Backend, spec: &EnvironmentSpec) -> Result<Outcome> {
    let name = spec.volume_name();
    let exists = backend
        .list_volumes(&[Filter::name(&name)])?
        .iter()
        .any(|v| v.name == name);

    if exists {
        info!("volume {name} exists, reusing");
        return Ok(Outcome::Reused);
    }

    backend.create_volume(&VolumeSpec {
        name: name.clone(),
        driver: "local".to_string(),
        labels: label_set([(labels::ENVIRONMENT, spec.name.as_str()), (labels::TYPE, "volume")]),
    })?;
    info!("volume {name} created");
    Ok(Outcome::Created)
}

fn ensure_proxy(backend: &dyn Backend, spec: &EnvironmentSpec) -> Result<(Outcome, String)> {
    let name = spec.proxy_name();
    let selector = [
        Filter::label(labels::TYPE, "proxy"),
        Filter::label(labels::ENVIRONMENT, spec.name.as_str()),
    ];
    let existing = backend
        .list_containers(&selector, true)?
        .into_iter()
        .find(|c| c.has_name(&name));

    if let Some(container) = existing {
        info!("proxy {name} exists, reusing");
        return Ok((Outcome::Reused, container.id));
    }

    let id = backend.create_container(&ContainerSpec {
        name: name.clone(),
        image: format!("{}:{}", spec.proxy_image, spec.proxy_version),
        labels: label_set([
            (labels::TYPE, "proxy"),
            (labels::ENVIRONMENT, spec.name.as_str()),
            (labels::PROXY_VERSION, spec.proxy_version.as_str()),
        ]),
        ports: spec.ports.clone(),
        network: Some(spec.network_name()),
        volumes: vec![(spec.volume_name(), PROXY_DATA_DIR.to_string())],
    })?;
    info!("proxy {name} created");
    Ok((Outcome::Created, id))
}

/// Optional supporting service containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Mailhog,
    Redis,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Mailhog, Service::Redis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mailhog => "mailhog",
            Self::Redis => "redis",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            Self::Mailhog => "docker.io/mailhog/mailhog:latest",
            Self::Redis => "docker.io/library/redis:latest",
        }
    }

    pub fn ports(&self) -> Vec<PortBinding> {
        match self {
            Self::Mailhog => vec![PortBinding::loopback(1025), PortBinding::loopback(8025)],
            Self::Redis => vec![PortBinding::loopback(6379)],
        }
    }

    /// Container name within `environment`.
    pub fn container_name(&self, environment: &str) -> String {
        format!("{}.service.{environment}", self.as_str())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mailhog" => Ok(Self::Mailhog),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown service: {other}")),
        }
    }
}

/// What [`ensure_service`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Enabled and running
    Running(Outcome),
    /// Disabled; an existing container was removed
    Removed,
    /// Disabled and nothing to remove
    Absent,
}

/// Converge one service: created and started when enabled, removed when not.
///
/// Services are found by their type and environment labels, stopped
/// containers included.
pub fn ensure_service(
    backend: &dyn Backend,
    environment: &str,
    service: Service,
    enabled: bool,
) -> Result<ServiceOutcome> {
    let selector = [
        Filter::label(labels::TYPE, service.as_str()),
        Filter::label(labels::ENVIRONMENT, environment),
    ];
    let existing = backend.list_containers(&selector, true)?;

    if !enabled {
        if existing.is_empty() {
            return Ok(ServiceOutcome::Absent);
        }
        for container in &existing {
            backend.remove_container(&container.id)?;
        }
        info!("{service} disabled, removed {} container(s)", existing.len());
        return Ok(ServiceOutcome::Removed);
    }

    let (outcome, id) = match existing.into_iter().next() {
        Some(container) => (Outcome::Reused, container.id),
        None => {
            let id = backend.create_container(&ContainerSpec {
                name: service.container_name(environment),
                image: service.image().to_string(),
                labels: label_set([
                    (labels::TYPE, service.as_str()),
                    (labels::ENVIRONMENT, environment),
                ]),
                ports: service.ports(),
                network: Some(format!("{environment}-network")),
                volumes: Vec::new(),
            })?;
            (Outcome::Created, id)
        }
    };

    backend.start_container(&id)?;
    info!("{service} {outcome} and started");
    Ok(ServiceOutcome::Running(outcome))
}

/// Run `command` detached in `container` and wait for it with backoff.
///
/// Returns an error when the command exits non-zero, the wait times out, or
/// `cancel` fires.
pub fn exec_and_wait(
    backend: &dyn Backend,
    container: &str,
    command: &[String],
    config: &PollConfig,
    cancel: &CancelToken,
) -> Result<()> {
    let handle = backend.exec_detached(container, command)?;

    let mut exit = None;
    let mut failure = None;
    poll_until(config, cancel, &handle.command, || match backend.exec_status(&handle) {
        Ok(ExecStatus::Running) => Ok(false),
        Ok(ExecStatus::Exited(code)) => {
            exit = Some(code);
            Ok(true)
        }
        Err(err) => {
            failure = Some(err);
            Ok(true)
        }
    })?;

    if let Some(err) = failure {
        return Err(err);
    }
    match exit {
        Some(0) | None => Ok(()),
        Some(code) => Err(Error::ExecFailed {
            container: container.to_string(),
            command: handle.command,
            code,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::types::{ContainerInfo, Labels, NetworkInfo, VolumeInfo};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn container(id: &str, name: &str, labels: Labels) -> ContainerInfo {
        ContainerInfo {
            id: id.into(),
            names: vec![name.into()],
            state: "exited".into(),
            labels,
        }
    }

    fn existing_environment() -> MockBackend {
        MockBackend {
            networks: vec![NetworkInfo {
                id: "n1".into(),
                name: "devbox-network".into(),
                labels: Labels::new(),
            }],
            volumes: vec![VolumeInfo {
                name: "devbox".into(),
                labels: Labels::new(),
            }],
            containers: vec![container(
                "p1",
                "/devbox-proxy",
                label_set([(labels::TYPE, "proxy"), (labels::ENVIRONMENT, "devbox")]),
            )],
            ..MockBackend::default()
        }
    }

    #[test]
    fn test_fresh_environment_creates_everything() {
        let backend = MockBackend::default();
        let report = ensure_environment(&backend, &EnvironmentSpec::new("devbox")).unwrap();

        assert_eq!(report.network, Outcome::Created);
        assert_eq!(report.volume, Outcome::Created);
        assert_eq!(report.proxy, Outcome::Created);
        assert_eq!(
            *backend.calls.borrow(),
            vec![
                "create_network devbox-network",
                "create_volume devbox",
                "create_container devbox-proxy",
                "start_container id-devbox-proxy",
            ]
        );

        let created = backend.created_containers.borrow();
        let proxy = &created[0];
        assert_eq!(proxy.image, "devbox/proxy:latest");
        assert_eq!(proxy.network.as_deref(), Some("devbox-network"));
        assert_eq!(proxy.volumes, vec![("devbox".to_string(), "/data".to_string())]);
        assert_eq!(
            proxy.ports.iter().map(ToString::to_string).collect::<Vec<_>>(),
            ["127.0.0.1:80:80", "127.0.0.1:443:443", "127.0.0.1:5000:5000"]
        );
        assert_eq!(proxy.labels.get(labels::TYPE).map(String::as_str), Some("proxy"));
        assert_eq!(
            proxy.labels.get(labels::ENVIRONMENT).map(String::as_str),
            Some("devbox")
        );
    }

    #[test]
    fn test_existing_environment_is_reused() {
        let backend = existing_environment();
        let report = ensure_environment(&backend, &EnvironmentSpec::new("devbox")).unwrap();

        assert_eq!(report.network, Outcome::Reused);
        assert_eq!(report.network_id, "n1");
        assert_eq!(report.volume, Outcome::Reused);
        assert_eq!(report.proxy, Outcome::Reused);
        assert_eq!(backend.calls_starting_with("create_"), 0);
        assert_eq!(backend.calls_starting_with("start_container"), 1);
        assert_eq!(*backend.calls.borrow(), vec!["start_container p1"]);
    }

    #[test]
    fn test_fuzzy_matches_are_not_reused() {
        let backend = MockBackend {
            networks: vec![NetworkInfo {
                id: "n2".into(),
                name: "devbox-network-old".into(),
                labels: Labels::new(),
            }],
            volumes: vec![VolumeInfo {
                name: "devbox-old".into(),
                labels: Labels::new(),
            }],
            containers: vec![container("p2", "devbox-proxy-old", Labels::new())],
            ..MockBackend::default()
        };
        let report = ensure_environment(&backend, &EnvironmentSpec::new("devbox")).unwrap();
        assert_eq!(report.network, Outcome::Created);
        assert_eq!(report.volume, Outcome::Created);
        assert_eq!(report.proxy, Outcome::Created);
        assert_eq!(backend.calls_starting_with("create_"), 3);
    }

    #[test]
    fn test_ports_are_overridable() {
        let backend = MockBackend::default();
        let spec = EnvironmentSpec::new("devbox").with_ports(vec![PortBinding {
            host_ip: "127.0.0.1".into(),
            host_port: 8080,
            container_port: 80,
        }]);
        ensure_environment(&backend, &spec).unwrap();
        let created = backend.created_containers.borrow();
        assert_eq!(created[0].ports[0].to_string(), "127.0.0.1:8080:80");
    }

    #[test]
    fn test_service_created_when_missing() {
        let backend = MockBackend::default();
        let outcome = ensure_service(&backend, "devbox", Service::Redis, true).unwrap();
        assert_eq!(outcome, ServiceOutcome::Running(Outcome::Created));
        assert_eq!(
            *backend.calls.borrow(),
            vec![
                "create_container redis.service.devbox",
                "start_container id-redis.service.devbox",
            ]
        );
        let created = backend.created_containers.borrow();
        assert_eq!(created[0].ports, vec![PortBinding::loopback(6379)]);
    }

    #[test]
    fn test_service_reused_by_label() {
        let backend = MockBackend {
            containers: vec![container(
                "m1",
                "mailhog.service.devbox",
                label_set([(labels::TYPE, "mailhog"), (labels::ENVIRONMENT, "devbox")]),
            )],
            ..MockBackend::default()
        };
        let outcome = ensure_service(&backend, "devbox", Service::Mailhog, true).unwrap();
        assert_eq!(outcome, ServiceOutcome::Running(Outcome::Reused));
        assert_eq!(*backend.calls.borrow(), vec!["start_container m1"]);
    }

    #[test]
    fn test_disabled_service_is_removed() {
        let backend = MockBackend {
            containers: vec![container(
                "r1",
                "redis.service.devbox",
                label_set([(labels::TYPE, "redis"), (labels::ENVIRONMENT, "devbox")]),
            )],
            ..MockBackend::default()
        };
        let outcome = ensure_service(&backend, "devbox", Service::Redis, false).unwrap();
        assert_eq!(outcome, ServiceOutcome::Removed);
        assert_eq!(*backend.calls.borrow(), vec!["remove_container r1"]);

        let outcome = ensure_service(&MockBackend::default(), "devbox", Service::Redis, false).unwrap();
        assert_eq!(outcome, ServiceOutcome::Absent);
    }

    #[test]
    fn test_proxy_of_another_environment_is_not_reused() {
        let backend = MockBackend {
            containers: vec![container(
                "p9",
                "other-proxy",
                label_set([(labels::TYPE, "proxy"), (labels::ENVIRONMENT, "other")]),
            )],
            ..MockBackend::default()
        };
        let report = ensure_environment(&backend, &EnvironmentSpec::new("devbox")).unwrap();
        assert_eq!(report.proxy, Outcome::Created);
        assert_eq!(report.proxy_id, "id-devbox-proxy");
    }

    #[test]
    fn test_unlabeled_container_with_proxy_name_is_not_reused() {
        let backend = MockBackend {
            containers: vec![container("x1", "devbox-proxy", Labels::new())],
            ..MockBackend::default()
        };
        let report = ensure_environment(&backend, &EnvironmentSpec::new("devbox")).unwrap();
        assert_eq!(report.proxy, Outcome::Created);
    }

    #[test]
    fn test_services_of_another_environment_are_left_alone() {
        let backend = MockBackend {
            containers: vec![container(
                "other-redis",
                "redis.service.other",
                label_set([(labels::TYPE, "redis"), (labels::ENVIRONMENT, "other")]),
            )],
            ..MockBackend::default()
        };

        let outcome = ensure_service(&backend, "devbox", Service::Redis, false).unwrap();
        assert_eq!(outcome, ServiceOutcome::Absent);
        assert!(backend.calls.borrow().is_empty());

        let outcome = ensure_service(&backend, "devbox", Service::Redis, true).unwrap();
        assert_eq!(outcome, ServiceOutcome::Running(Outcome::Created));
        assert_eq!(
            *backend.calls.borrow(),
            vec![
                "create_container redis.service.devbox",
                "start_container id-redis.service.devbox",
            ]
        );
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_exec_and_wait_polls_until_exit() {
        let backend = MockBackend::default();
        backend.running_polls.set(3);
        let command = vec!["pg_dump".to_string(), "devbox".to_string()];
        exec_and_wait(&backend, "postgres_11.7_5432", &command, &fast_poll(), &CancelToken::new())
            .unwrap();
        assert_eq!(backend.calls_starting_with("exec_status"), 4);
    }

    #[test]
    fn test_exec_and_wait_reports_exit_code() {
        let backend = MockBackend {
            exit_code: 2,
            ..MockBackend::default()
        };
        let err = exec_and_wait(
            &backend,
            "mysql_5.7_3306",
            &["false".to_string()],
            &fast_poll(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ExecFailed { code: 2, .. }));
    }

    #[test]
    fn test_exec_and_wait_times_out() {
        let backend = MockBackend::default();
        backend.running_polls.set(u32::MAX);
        let config = PollConfig {
            timeout: Duration::from_millis(20),
            ..fast_poll()
        };
        let err = exec_and_wait(&backend, "db", &["sleep".to_string()], &config, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Wait(converge::Error::Timeout { .. })));
    }

    #[test]
    fn test_exec_and_wait_cancelled() {
        let backend = MockBackend::default();
        backend.running_polls.set(u32::MAX);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = exec_and_wait(&backend, "db", &["sleep".to_string()], &fast_poll(), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Wait(converge::Error::Cancelled)));
    }
}
