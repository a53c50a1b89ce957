//! `db` subcommands.

use anyhow::{Context, Result, anyhow};
use colored::{ColoredString, Colorize};
use containerkit::Client;
use converge::{
    Action, Collector, Database, DatabaseContainer, Engine, PollConfig, Runner, provision, validate,
};
use std::time::Duration;

use crate::cli::DbCommand;
use crate::engine::{self, ExecuteOptions};
use crate::settings::Settings;
use crate::ui;

pub fn run(settings: &Settings, cmd: DbCommand) -> Result<()> {
    match cmd {
        DbCommand::Add {
            engine,
            version,
            port,
            yes,
        } => add(settings, Database::new(engine.into(), version, port), yes),
        DbCommand::Remove { name, yes } => remove(settings, &name, yes),
        DbCommand::Ls => list(settings),
        DbCommand::Shell { name } => shell(settings, &name),
        DbCommand::Exec {
            name,
            timeout,
            command,
        } => exec(settings, &name, timeout, &command),
    }
}

fn options(settings: &Settings, yes: bool) -> ExecuteOptions {
    ExecuteOptions {
        dry_run: false,
        yes,
        verbose: true,
        quiet: settings.quiet,
    }
}

pub fn add(settings: &Settings, database: Database, yes: bool) -> Result<()> {
    validate::engine_version(database.engine, &database.version)?;

    let mut config = settings.load_config_or_default()?;
    if config.database_exists(&database) {
        ui::info(&format!("Database {} is already configured", database.name().bold()));
        return Ok(());
    }
    config.add_database(database.clone())?;
    settings.save_config(&config)?;

    let actions = provision::create_database(&settings.machine, &database);
    let summary = engine::execute(
        &settings.runner()?,
        &settings.vm_binary,
        &actions,
        &options(settings, yes),
    )?;
    engine::print_summary(&summary);
    if summary.completed > 0 {
        ui::success(&format!(
            "{} listening on 127.0.0.1:{}",
            database.name().bold(),
            database.port
        ));
    }
    Ok(())
}

pub fn remove(settings: &Settings, name: &str, yes: bool) -> Result<()> {
    let mut config = settings.load_config()?;
    let database = config.remove_database(name)?;

    let actions = [provision::remove_database(&settings.machine, &database)];
    let summary = engine::execute(
        &settings.runner()?,
        &settings.vm_binary,
        &actions,
        &options(settings, yes),
    )?;
    if summary.skipped > 0 {
        return Ok(());
    }
    settings.save_config(&config)?;
    engine::print_summary(&summary);
    ui::success(&format!("Removed {} (volume {} kept)", name.bold(), name));
    Ok(())
}

pub fn list(settings: &Settings) -> Result<()> {
    let config = settings.load_config_or_default()?;
    let runner = settings.runner()?;
    let ctx = settings.plan_context();

    let pb = ui::spinner("Listing containers...", settings.quiet);
    let containers = Collector::new(&runner, &ctx.machine, &ctx.layout).database_containers();
    pb.finish_and_clear();
    let containers = containers.unwrap_or_else(|e| {
        ui::warn(&format!("Could not list containers: {e}"));
        Vec::new()
    });

    ui::header(&format!("Databases ({})", settings.machine));
    if config.databases.is_empty() && containers.is_empty() {
        ui::dim("No databases configured. Add one with `devbox db add mysql 5.7 3306`.");
        return Ok(());
    }

    for db in &config.databases {
        println!("  {} {:<28} {}", "●".green(), db.name().bold(), status(&containers, db));
    }
    for container in containers
        .iter()
        .filter(|c| !config.databases.contains(&c.database))
    {
        println!(
            "  {} {:<28} {}",
            "○".dimmed(),
            container.database.name(),
            "not in config (apply will remove it)".dimmed()
        );
    }
    Ok(())
}

fn status(containers: &[DatabaseContainer], database: &Database) -> ColoredString {
    match containers.iter().find(|c| &c.database == database) {
        Some(c) if c.running => "running".green(),
        Some(_) => "stopped (apply will start it)".yellow(),
        None => "missing (apply will create it)".red(),
    }
}

fn parse_name(name: &str) -> Result<Database> {
    Database::from_name(name)
        .ok_or_else(|| anyhow!("{name} is not a database name like mysql_5.7_3306"))
}

/// Hand the terminal to the engine's client inside the container.
pub fn shell(settings: &Settings, name: &str) -> Result<()> {
    let database = parse_name(name)?;
    let action = shell_action(&settings.machine, &database);
    let runner = settings.runner()?;
    match runner
        .exec_interactive(&action)
        .with_context(|| format!("Failed to open a shell in {name}"))?
    {}
}

fn shell_action(machine: &str, database: &Database) -> Action {
    let engine: Engine = database.engine;
    let argv = ["docker", "exec", "-it"]
        .into_iter()
        .map(str::to_string)
        .chain(std::iter::once(database.name()))
        .chain(engine.shell_command().iter().map(|s| (*s).to_string()));
    Action::exec(machine, argv).interactive()
}

/// Run a command in the database container and wait for it to finish.
pub fn exec(settings: &Settings, name: &str, timeout: u64, command: &[String]) -> Result<()> {
    parse_name(name)?;
    let runner = settings.runner()?;
    let client = Client::in_machine(runner.binary(), &settings.machine);
    let poll = PollConfig::with_timeout(Duration::from_secs(timeout));

    let pb = ui::spinner(&format!("Running `{}` in {name}...", command.join(" ")), settings.quiet);
    let result = client.exec_and_wait(name, command, &poll, &settings.cancel);
    pb.finish_and_clear();
    result.with_context(|| format!("Command failed in {name}"))?;

    ui::success(&format!("Finished in {}", name.bold()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_action_argv() {
        let db = Database::new(Engine::Postgres, "11.7", 5432);
        let action = shell_action("dev", &db);
        assert!(action.is_interactive());
        assert_eq!(
            action.args(),
            [
                "exec",
                "dev",
                "--",
                "docker",
                "exec",
                "-it",
                "postgres_11.7_5432",
                "psql",
                "-U",
                "devbox"
            ]
        );
    }

    #[test]
    fn test_status_tells_stopped_from_missing() {
        let mysql = Database::new(Engine::Mysql, "5.7", 3306);
        let postgres = Database::new(Engine::Postgres, "11.7", 5432);
        let containers = vec![DatabaseContainer {
            database: mysql.clone(),
            running: false,
        }];
        assert!(status(&containers, &mysql).to_string().contains("stopped"));
        assert!(status(&containers, &postgres).to_string().contains("missing"));
    }

    #[test]
    fn test_parse_name_rejects_other_containers() {
        assert!(parse_name("devbox-proxy").is_err());
        assert_eq!(
            parse_name("mysql_5.7_3306").unwrap(),
            Database::new(Engine::Mysql, "5.7", 3306)
        );
    }
}
