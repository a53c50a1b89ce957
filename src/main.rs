mod cli;
mod commands;
mod engine;
mod paths;
mod settings;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use converge::{CancelToken, ErrorCategory};
use settings::Settings;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// First Ctrl-C cancels the running work; a second one exits immediately.
fn install_signal_handlers(cancel: &CancelToken) -> Result<()> {
    let flag = cancel.flag();
    signal_hook::flag::register_conditional_shutdown(SIGINT, 1, flag.clone())
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(SIGINT, flag.clone())
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, flag).context("Failed to install SIGTERM handler")?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "devbox", &mut io::stdout());
        return Ok(());
    }

    let cancel = CancelToken::new();
    install_signal_handlers(&cancel)?;
    let settings = Settings::from_cli(&cli, cancel)?;
    log::debug!(
        "machine {} via {}, config {}",
        settings.machine,
        settings.vm_binary,
        settings.config_path.display()
    );

    match cli.command {
        Command::Apply(args) => commands::apply::apply(&settings, args.dry_run, args.yes),
        Command::Diff => commands::apply::diff(&settings),
        Command::Init(args) => commands::init::run(&settings, &args),
        Command::Site(cmd) => commands::site::run(&settings, cmd),
        Command::Db(cmd) => commands::db::run(&settings, cmd),
        Command::Ssh => commands::machine::ssh(&settings),
        Command::Machine(cmd) => commands::machine::run(&settings, cmd),
        Command::Completions { .. } => Ok(()),
    }
}

/// Print the error chain, then what kind of failure it was and what to try.
fn report(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));

    let category = err.chain().find_map(|cause| {
        cause
            .downcast_ref::<converge::Error>()
            .map(converge::Error::category)
            .or_else(|| {
                cause
                    .downcast_ref::<containerkit::Error>()
                    .map(containerkit::Error::category)
            })
            .or_else(|| {
                cause
                    .downcast_ref::<converge::ConfigError>()
                    .map(|_| ErrorCategory::Configuration)
            })
    });

    if let Some(category) = category {
        ui::dim(&format!("{}: {}", category.description(), category.advice()));
    }
}
