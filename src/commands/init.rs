//! `init`: container environment, machine launch, and a starter config.

use anyhow::{Context, Result};
use colored::Colorize;
use containerkit::{Client, EnvironmentReport, EnvironmentSpec};
use converge::{Action, LaunchSpec, NoProgress, Probe, provision, run_all, validate};

use crate::cli::InitArgs;
use crate::settings::Settings;
use crate::ui;

pub fn run(settings: &Settings, args: &InitArgs) -> Result<()> {
    validate::cpus(args.cpus)?;
    validate::size("memory", &args.memory)?;
    validate::size("disk", &args.disk)?;

    ui::header(&format!("devbox init ({})", settings.environment));

    let spec = EnvironmentSpec::new(&settings.environment);
    let pb = ui::spinner("Reconciling containers...", settings.quiet);
    let report = Client::new().and_then(|client| client.ensure_environment(&spec));
    pb.finish_and_clear();
    let report = report.with_context(|| {
        format!("Failed to set up container environment {}", settings.environment)
    })?;
    print_report(&spec, &report);

    if !args.skip_launch {
        launch(settings, args)?;
    }

    if settings.config_path.exists() {
        ui::dim(&format!("Config: {}", settings.config_path.display()));
    } else {
        settings.save_config(&converge::DesiredConfig::default())?;
        ui::success(&format!(
            "Wrote starter config {}",
            settings.config_path.display()
        ));
    }
    Ok(())
}

fn print_report(spec: &EnvironmentSpec, report: &EnvironmentReport) {
    ui::kv("network", &format!("{} ({})", spec.network_name(), report.network));
    ui::kv("volume", &format!("{} ({})", spec.volume_name(), report.volume));
    ui::kv("proxy", &format!("{} ({}, running)", spec.proxy_name(), report.proxy));
}

/// Launch the machine unless `info` already finds it.
fn launch(settings: &Settings, args: &InitArgs) -> Result<()> {
    let runner = settings.runner()?;
    if runner.capture(&Action::info_csv(&settings.machine)).is_ok() {
        ui::info(&format!("Machine {} already exists", settings.machine.bold()));
        return Ok(());
    }

    let spec = LaunchSpec {
        machine: settings.machine.clone(),
        cpus: args.cpus,
        memory: args.memory.clone(),
        disk: args.disk.clone(),
        image: args.image.clone(),
    };
    ui::info(&format!(
        "Launching {} ({} cpus, {} memory, {} disk)",
        settings.machine.bold(),
        spec.cpus,
        spec.memory,
        spec.disk
    ));
    run_all(
        &runner,
        &[Action::launch(&spec, provision::CLOUD_INIT)],
        &mut NoProgress,
    )
    .with_context(|| format!("Failed to launch machine {}", settings.machine))?;
    ui::success(&format!("Machine {} is up", settings.machine));
    Ok(())
}
