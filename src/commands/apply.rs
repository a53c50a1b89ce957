//! `apply` and `diff`: converge the machine on its config.

use anyhow::{Context, Result};
use containerkit::{Client, Service, ServiceOutcome};
use converge::{Collector, DesiredConfig, ObservedState, Services, StateDiff, converge};

use crate::engine::{self, ExecuteOptions};
use crate::settings::Settings;
use crate::ui;

/// Observe the machine with a spinner on screen.
pub fn observe(settings: &Settings) -> Result<ObservedState> {
    let runner = settings.runner()?;
    let ctx = settings.plan_context();
    let pb = ui::spinner(&format!("Inspecting {}...", settings.machine), settings.quiet);
    let observed = Collector::new(&runner, &ctx.machine, &ctx.layout).collect();
    pb.finish_and_clear();
    observed.with_context(|| format!("Failed to inspect machine {}", settings.machine))
}

fn plan(settings: &Settings) -> Result<(DesiredConfig, StateDiff, Vec<converge::Action>)> {
    let config = settings.load_config()?;
    let observed = observe(settings)?;
    let (diff, actions) = converge(&observed, &config, &settings.plan_context())?;
    log::info!("{} changes, {} commands planned", diff.summary().total(), actions.len());
    Ok((config, diff, actions))
}

/// Preview what apply would change.
pub fn diff(settings: &Settings) -> Result<()> {
    let (_, diff, actions) = plan(settings)?;
    engine::display_diff(&diff);
    engine::differ::display_actions(&settings.vm_binary, &actions);
    Ok(())
}

/// Make the machine match its config.
pub fn apply(settings: &Settings, dry_run: bool, yes: bool) -> Result<()> {
    ui::header(&format!("devbox apply ({})", settings.machine));

    let (config, diff, actions) = plan(settings)?;
    engine::display_diff(&diff);

    let runner = settings.runner()?;
    let opts = ExecuteOptions {
        dry_run,
        yes,
        verbose: settings.verbose > 0,
        quiet: settings.quiet,
    };
    let summary = engine::execute(&runner, &settings.vm_binary, &actions, &opts)?;
    engine::print_summary(&summary);

    if !dry_run && summary.skipped == 0 {
        converge_services(settings, config.services)?;
    }
    Ok(())
}

/// Bring the optional service containers in line with the config.
fn converge_services(settings: &Settings, services: Services) -> Result<()> {
    let client = Client::new()?;
    for service in Service::ALL {
        let enabled = match service {
            Service::Mailhog => services.mailhog,
            Service::Redis => services.redis,
        };
        let outcome = client
            .ensure_service(&settings.environment, service, enabled)
            .with_context(|| format!("Failed to converge service {service}"))?;
        match outcome {
            ServiceOutcome::Running(o) => ui::success(&format!("{service} running ({o})")),
            ServiceOutcome::Removed => ui::info(&format!("{service} removed")),
            ServiceOutcome::Absent => log::debug!("{service} disabled"),
        }
    }
    Ok(())
}
