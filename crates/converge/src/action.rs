//! Actions: immutable descriptions of one invocation of the VM manager.
//!
//! An [`Action`] carries the full argument vector (verb first), an optional
//! payload for the child's stdin, and an [`ExecMode`]. The verb is a closed
//! [`ActionKind`], and the argv prefix each verb needs is decided by a single
//! exhaustive match in [`ActionKind::prefix`].

use crate::error::{ConfigError, Result};
use crate::types::Mount;
use std::fmt;

/// Every verb the VM manager is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Launch,
    Exec,
    Mount,
    Umount,
    Info,
    Delete,
    Start,
    Stop,
    Restart,
    Shell,
}

impl ActionKind {
    /// The subcommand passed to the VM manager.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Exec => "exec",
            Self::Mount => "mount",
            Self::Umount => "umount",
            Self::Info => "info",
            Self::Delete => "delete",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Shell => "shell",
        }
    }

    /// Leading argv for this verb, before the caller's arguments.
    pub fn prefix(self, machine: &str) -> Vec<String> {
        let verb = self.verb().to_string();
        match self {
            Self::Mount | Self::Umount | Self::Delete | Self::Launch => vec![verb],
            Self::Shell | Self::Info | Self::Start | Self::Stop | Self::Restart => {
                vec![verb, machine.to_string()]
            }
            Self::Exec => vec![verb, machine.to_string(), "--".to_string()],
        }
    }

    /// Verbs that always take over the terminal.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Shell)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// How the runner hands the action to the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Spawn a child, forward its output, and wait for it
    Spawn,
    /// Replace the current process; never returns on success
    Interactive,
}

/// Machine sizing for `launch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub machine: String,
    pub cpus: u32,
    /// Memory with unit suffix, e.g. `4G`
    pub memory: String,
    /// Disk with unit suffix, e.g. `40G`
    pub disk: String,
    /// Image alias, e.g. `18.04`
    pub image: String,
}

/// One unit of remote work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    kind: ActionKind,
    args: Vec<String>,
    input: Option<String>,
    mode: ExecMode,
}

impl Action {
    /// Build an action from a verb and the arguments that follow its prefix.
    pub fn new<I, S>(kind: ActionKind, machine: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = kind.prefix(machine);
        argv.extend(args.into_iter().map(Into::into));
        let mode = if kind.is_interactive() {
            ExecMode::Interactive
        } else {
            ExecMode::Spawn
        };
        Self {
            kind,
            args: argv,
            input: None,
            mode,
        }
    }

    /// `exec <machine> -- <args>`
    pub fn exec<I, S>(machine: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ActionKind::Exec, machine, args)
    }

    /// `exec <machine> -- sudo <args>`
    pub fn sudo<I, S>(machine: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = std::iter::once("sudo".to_string()).chain(args.into_iter().map(Into::into));
        Self::new(ActionKind::Exec, machine, args)
    }

    /// `mount <source> <machine>:<dest>`; the destination must be absolute.
    pub fn mount(machine: &str, mount: &Mount) -> Result<Self> {
        require_absolute(&mount.dest)?;
        Ok(Self::new(
            ActionKind::Mount,
            machine,
            [mount.source.clone(), format!("{machine}:{}", mount.dest)],
        ))
    }

    /// `umount <machine>:<dest>`; the destination must be absolute.
    pub fn umount(machine: &str, dest: &str) -> Result<Self> {
        require_absolute(dest)?;
        Ok(Self::new(ActionKind::Umount, machine, [format!("{machine}:{dest}")]))
    }

    /// `launch` with cloud-init fed through stdin.
    pub fn launch(spec: &LaunchSpec, cloud_init: &str) -> Self {
        Self::new(
            ActionKind::Launch,
            &spec.machine,
            [
                "--name".to_string(),
                spec.machine.clone(),
                "--cpus".to_string(),
                spec.cpus.to_string(),
                "--mem".to_string(),
                spec.memory.clone(),
                "--disk".to_string(),
                spec.disk.clone(),
                spec.image.clone(),
                "--cloud-init".to_string(),
                "-".to_string(),
            ],
        )
        .with_input(cloud_init)
    }

    /// `info <machine> --format=csv`
    pub fn info_csv(machine: &str) -> Self {
        Self::new(ActionKind::Info, machine, ["--format=csv"])
    }

    /// `delete <machine>`, optionally purging.
    pub fn delete(machine: &str, purge: bool) -> Self {
        let mut args = vec![machine.to_string()];
        if purge {
            args.push("--purge".to_string());
        }
        Self::new(ActionKind::Delete, machine, args)
    }

    /// `shell <machine>`, always interactive.
    pub fn shell(machine: &str) -> Self {
        Self::new(ActionKind::Shell, machine, Vec::<String>::new())
    }

    /// Attach a payload for the child's stdin.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Mark the action as a terminal hand-off.
    pub fn interactive(mut self) -> Self {
        self.mode = ExecMode::Interactive;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Full argv passed to the VM manager, verb first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn input(&self) -> Option<&str> {
        self.input.as_deref().filter(|s| !s.is_empty())
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_interactive(&self) -> bool {
        self.mode == ExecMode::Interactive
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

fn require_absolute(dest: &str) -> Result<()> {
    if dest.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("mount destination must be absolute: {dest}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prefix_table() {
        assert_eq!(ActionKind::Mount.prefix("dev"), vec!["mount"]);
        assert_eq!(ActionKind::Info.prefix("dev"), vec!["info", "dev"]);
        assert_eq!(ActionKind::Exec.prefix("dev"), vec!["exec", "dev", "--"]);
        assert_eq!(ActionKind::Shell.prefix("dev"), vec!["shell", "dev"]);
    }

    #[test]
    fn test_mount_argv() {
        let action = Action::mount("dev", &Mount::new("/home/u/app", "/devbox/sites/app")).unwrap();
        assert_eq!(action.args(), ["mount", "/home/u/app", "dev:/devbox/sites/app"]);
        assert_eq!(action.mode(), ExecMode::Spawn);
        assert!(action.input().is_none());
    }

    #[test]
    fn test_relative_dest_rejected() {
        assert!(Action::mount("dev", &Mount::new("/home/u/app", "sites/app")).is_err());
        assert!(Action::umount("dev", "sites/app").is_err());
    }

    #[test]
    fn test_sudo_exec_argv() {
        let action = Action::sudo("dev", ["service", "nginx", "restart"]);
        assert_eq!(
            action.args(),
            ["exec", "dev", "--", "sudo", "service", "nginx", "restart"]
        );
    }

    #[test]
    fn test_launch_carries_cloud_init() {
        let spec = LaunchSpec {
            machine: "dev".into(),
            cpus: 2,
            memory: "4G".into(),
            disk: "40G".into(),
            image: "18.04".into(),
        };
        let action = Action::launch(&spec, "#cloud-config\n");
        assert_eq!(
            action.args(),
            [
                "launch", "--name", "dev", "--cpus", "2", "--mem", "4G", "--disk", "40G", "18.04",
                "--cloud-init", "-"
            ]
        );
        assert_eq!(action.input(), Some("#cloud-config\n"));
    }

    #[test]
    fn test_shell_is_interactive() {
        let action = Action::shell("dev");
        assert!(action.is_interactive());
        assert_eq!(action.args(), ["shell", "dev"]);
        assert!(!Action::exec("dev", ["ls"]).is_interactive());
        assert!(Action::exec("dev", ["ls"]).interactive().is_interactive());
    }

    #[test]
    fn test_empty_input_is_none() {
        assert!(Action::exec("dev", ["cat"]).with_input("").input().is_none());
    }
}
