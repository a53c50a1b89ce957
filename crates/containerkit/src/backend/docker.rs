//! Docker CLI backend.
//!
//! Runs `docker` directly on the host, or through the VM manager's `exec`
//! verb when the daemon lives inside the machine. Listings use
//! `--format '{{json .}}'`, one JSON object per line.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{
    ContainerInfo, ContainerSpec, ExecHandle, ExecStatus, Filter, Labels, NetworkInfo,
    NetworkSpec, VolumeInfo, VolumeSpec,
};
use log::{debug, trace};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const JSON_FORMAT: &str = "{{json .}}";

/// Backend that executes real `docker` commands.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Executable to run
    program: PathBuf,
    /// Arguments that come before the docker subcommand
    prefix: Vec<String>,
}

impl DockerBackend {
    /// Use the `docker` found in PATH.
    pub fn new() -> Result<Self> {
        let program = which::which("docker").map_err(|_| Error::RuntimeNotFound {
            binary: "docker".to_string(),
        })?;
        Ok(Self {
            program,
            prefix: Vec::new(),
        })
    }

    /// Run docker inside `machine` through the VM manager at `vm_binary`.
    pub fn in_machine(vm_binary: &Path, machine: &str) -> Self {
        Self {
            program: vm_binary.to_path_buf(),
            prefix: vec![
                "exec".to_string(),
                machine.to_string(),
                "--".to_string(),
                "docker".to_string(),
            ],
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        let program = self
            .program
            .file_name()
            .map_or_else(|| self.program.to_string_lossy(), |n| n.to_string_lossy());
        std::iter::once(program.into_owned())
            .chain(self.prefix.iter().cloned())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run a docker command and return its trimmed stdout.
    fn run(&self, args: &[String]) -> Result<String> {
        let command = self.command_line(args);
        debug!("running {command}");

        let output = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn list<T: DeserializeOwned>(
        &self,
        what: &'static str,
        mut args: Vec<String>,
        filters: &[Filter],
    ) -> Result<Vec<T>> {
        for filter in filters {
            args.push("--filter".to_string());
            args.push(filter.to_string());
        }
        args.push("--format".to_string());
        args.push(JSON_FORMAT.to_string());
        parse_json_lines(what, &self.run(&args)?)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn push_labels(args: &mut Vec<String>, labels: &Labels) {
    for (key, value) in labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkLine {
    #[serde(rename = "ID")]
    id: String,
    name: String,
    #[serde(default)]
    labels: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeLine {
    name: String,
    #[serde(default)]
    labels: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: String,
}

/// Parse one JSON object per non-empty line.
pub fn parse_json_lines<T: DeserializeOwned>(what: &'static str, output: &str) -> Result<Vec<T>> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| serde_json::from_str(line).map_err(|source| Error::Parse { what, source }))
        .collect()
}

/// Parse the `k=v,k2=v2` label column.
pub fn parse_labels(raw: &str) -> Labels {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

/// Quote one word for `sh -c`.
fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn status_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{nanos}", std::process::id())
}

impl Backend for DockerBackend {
    fn list_networks(&self, filters: &[Filter]) -> Result<Vec<NetworkInfo>> {
        let lines: Vec<NetworkLine> = self.list("network", strings(&["network", "ls"]), filters)?;
        Ok(lines
            .into_iter()
            .map(|l| NetworkInfo {
                id: l.id,
                name: l.name,
                labels: parse_labels(&l.labels),
            })
            .collect())
    }

    fn list_volumes(&self, filters: &[Filter]) -> Result<Vec<VolumeInfo>> {
        let lines: Vec<VolumeLine> = self.list("volume", strings(&["volume", "ls"]), filters)?;
        Ok(lines
            .into_iter()
            .map(|l| VolumeInfo {
                name: l.name,
                labels: parse_labels(&l.labels),
            })
            .collect())
    }

    fn list_containers(&self, filters: &[Filter], all: bool) -> Result<Vec<ContainerInfo>> {
        let mut args = strings(&["container", "ls"]);
        if all {
            args.push("--all".to_string());
        }
        let lines: Vec<ContainerLine> = self.list("container", args, filters)?;
        Ok(lines
            .into_iter()
            .map(|l| ContainerInfo {
                id: l.id,
                names: l.names.split(',').map(str::to_string).collect(),
                state: l.state,
                labels: parse_labels(&l.labels),
            })
            .collect())
    }

    fn create_network(&self, spec: &NetworkSpec) -> Result<String> {
        let mut args = strings(&["network", "create", "--driver", &spec.driver]);
        if spec.attachable {
            args.push("--attachable".to_string());
        }
        push_labels(&mut args, &spec.labels);
        args.push(spec.name.clone());

        let id = self.run(&args)?;
        if id.is_empty() {
            return Err(Error::MissingId {
                kind: "network",
                name: spec.name.clone(),
            });
        }
        Ok(id)
    }

    fn create_volume(&self, spec: &VolumeSpec) -> Result<String> {
        let mut args = strings(&["volume", "create", "--driver", &spec.driver]);
        push_labels(&mut args, &spec.labels);
        args.push(spec.name.clone());
        self.run(&args)
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut args = strings(&["container", "create", "--name", &spec.name]);
        push_labels(&mut args, &spec.labels);
        for port in &spec.ports {
            args.push("--publish".to_string());
            args.push(port.to_string());
        }
        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for (volume, target) in &spec.volumes {
            args.push("--volume".to_string());
            args.push(format!("{volume}:{target}"));
        }
        args.push(spec.image.clone());

        let id = self.run(&args)?;
        if id.is_empty() {
            return Err(Error::MissingId {
                kind: "container",
                name: spec.name.clone(),
            });
        }
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.run(&strings(&["container", "start", id]))?;
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.run(&strings(&["container", "rm", "--force", "--volumes", id]))?;
        Ok(())
    }

    fn exec_detached(&self, container: &str, command: &[String]) -> Result<ExecHandle> {
        let status_file = format!("/tmp/devbox-exec-{}.status", status_token());
        let script = format!(
            "{}; echo $? > {status_file}.tmp && mv {status_file}.tmp {status_file}",
            command.iter().map(|w| shell_quote(w)).collect::<Vec<_>>().join(" ")
        );
        self.run(&strings(&["exec", "--detach", container, "sh", "-c", &script]))?;

        Ok(ExecHandle {
            container: container.to_string(),
            command: command.join(" "),
            status_file,
        })
    }

    fn exec_status(&self, handle: &ExecHandle) -> Result<ExecStatus> {
        let args = strings(&["exec", &handle.container, "cat", &handle.status_file]);
        match self.run(&args) {
            Ok(content) if content.is_empty() => Ok(ExecStatus::Running),
            Ok(content) => content
                .parse()
                .map(ExecStatus::Exited)
                .map_err(|_| Error::CommandFailed {
                    command: self.command_line(&args),
                    stderr: format!("unexpected exit status {content:?}"),
                }),
            Err(Error::CommandFailed { .. }) => {
                trace!("{} still running", handle.command);
                Ok(ExecStatus::Running)
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_container_lines() {
        let output = r#"
{"Command":"\"caddy\"","ID":"abc123","Labels":"com.devbox.environment=devbox,com.devbox.type=proxy","Names":"devbox-proxy","State":"exited"}
{"ID":"def456","Labels":"","Names":"redis.service.devbox","State":"running"}
"#;
        let lines: Vec<ContainerLine> = parse_json_lines("container", output).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, "abc123");
        assert_eq!(lines[0].names, "devbox-proxy");
        assert_eq!(
            parse_labels(&lines[0].labels).get("com.devbox.type").map(String::as_str),
            Some("proxy")
        );
        assert!(parse_labels(&lines[1].labels).is_empty());
    }

    #[test]
    fn test_parse_network_lines() {
        let output = r#"{"Driver":"bridge","ID":"n1","Labels":"com.devbox.type=network","Name":"devbox-network"}"#;
        let lines: Vec<NetworkLine> = parse_json_lines("network", output).unwrap();
        assert_eq!(lines[0].name, "devbox-network");
        assert_eq!(lines[0].id, "n1");
    }

    #[test]
    fn test_parse_error_names_resource() {
        let err = parse_json_lines::<VolumeLine>("volume", "not json").unwrap_err();
        assert!(err.to_string().starts_with("unexpected volume listing"));
    }

    #[test]
    fn test_in_machine_command_line() {
        let backend = DockerBackend::in_machine(Path::new("/usr/local/bin/multipass"), "dev");
        assert_eq!(
            backend.command_line(&strings(&["container", "ls"])),
            "multipass exec dev -- docker container ls"
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("pg_dump"), "pg_dump");
        assert_eq!(shell_quote("--file=/tmp/x.sql"), "--file=/tmp/x.sql");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
