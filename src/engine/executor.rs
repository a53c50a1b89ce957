//! Execution engine - devbox executor with UI integration

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use converge::{Action, RunProgress, Runner, run_all};

use super::differ::display_actions;
use crate::ui;

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Print every command before confirming
    pub verbose: bool,
    /// Suppress step output
    pub quiet: bool,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub completed: usize,
    pub skipped: usize,
}

/// Prints one line per action as it starts.
struct StepProgress {
    quiet: bool,
    completed: usize,
}

impl RunProgress for StepProgress {
    fn on_action_start(&mut self, index: usize, total: usize, action: &Action) {
        if !self.quiet {
            ui::step(index + 1, total, &action.to_string());
        }
    }

    fn on_action_complete(&mut self, _index: usize, _action: &Action) {
        self.completed += 1;
    }
}

/// Confirm, then run `actions` in order, stopping at the first failure.
pub fn execute<R>(
    runner: &R,
    binary: &str,
    actions: &[Action],
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary>
where
    R: Runner + ?Sized,
{
    if actions.is_empty() {
        return Ok(ExecuteSummary::default());
    }

    if opts.dry_run || opts.verbose {
        display_actions(binary, actions);
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary {
            completed: 0,
            skipped: actions.len(),
        });
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            completed: 0,
            skipped: actions.len(),
        });
    }

    println!();
    let mut progress = StepProgress {
        quiet: opts.quiet,
        completed: 0,
    };
    run_all(runner, actions, &mut progress).with_context(|| {
        format!(
            "Stopped after {} of {} commands; run `devbox apply` to converge the rest",
            progress.completed,
            actions.len()
        )
    })?;

    Ok(ExecuteSummary {
        completed: progress.completed,
        skipped: 0,
    })
}

/// Confirm with user
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    Ok(confirmed)
}

fn confirm_proceed() -> Result<bool> {
    confirm("Continue?", true)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    if summary.completed == 0 {
        return;
    }
    println!();
    println!(
        "  {} Machine converged ({} commands run)",
        "✓".green().bold(),
        summary.completed
    );
}
