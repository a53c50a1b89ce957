//! `ssh` and `machine` subcommands: thin wrappers over the VM manager.

use anyhow::{Context, Result};
use colored::Colorize;
use converge::{Action, ActionKind, NoProgress, Runner, run_all};

use crate::cli::MachineCommand;
use crate::engine;
use crate::settings::Settings;
use crate::ui;

/// Replace this process with a shell in the machine.
pub fn ssh(settings: &Settings) -> Result<()> {
    let runner = settings.runner()?;
    match runner
        .exec_interactive(&Action::shell(&settings.machine))
        .with_context(|| format!("Failed to open a shell in {}", settings.machine))?
    {}
}

pub fn run(settings: &Settings, cmd: MachineCommand) -> Result<()> {
    let action = match cmd {
        MachineCommand::Start => lifecycle(ActionKind::Start, &settings.machine),
        MachineCommand::Stop => lifecycle(ActionKind::Stop, &settings.machine),
        MachineCommand::Restart => lifecycle(ActionKind::Restart, &settings.machine),
        MachineCommand::Info => lifecycle(ActionKind::Info, &settings.machine),
        MachineCommand::Delete { purge, yes } => {
            if !yes {
                ui::warn(&format!(
                    "This deletes {} and everything inside it",
                    settings.machine.bold()
                ));
                if !engine::confirm("Delete the machine?", false)? {
                    return Ok(());
                }
            }
            Action::delete(&settings.machine, purge)
        }
    };

    let verb = action.kind().verb();
    let runner = settings.runner()?;
    run_all(&runner, std::slice::from_ref(&action), &mut NoProgress)
        .with_context(|| format!("Failed to {verb} machine {}", settings.machine))?;
    log::info!("{verb} {} done", settings.machine);
    Ok(())
}

fn lifecycle(kind: ActionKind, machine: &str) -> Action {
    Action::new(kind, machine, Vec::<String>::new())
}
