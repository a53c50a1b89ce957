//! Turning a diff into an ordered action list.
//!
//! The order is fixed: mount removals, mount additions, the PHP version,
//! site removals and additions (one nginx reload at the end), then database
//! removals and additions. Only what the diff names is touched, so a diff
//! with no changes plans nothing.

use crate::action::Action;
use crate::config::DesiredConfig;
use crate::diff::StateDiff;
use crate::error::Result;
use crate::observe::ObservedState;
use crate::provision;
use crate::resolve::PathResolver;
use crate::sequence::{SiteLayout, SiteSequencer};
use log::debug;

/// Everything planning needs to know about the target machine.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub machine: String,
    pub layout: SiteLayout,
    pub resolver: PathResolver,
}

impl PlanContext {
    pub fn new(machine: impl Into<String>, resolver: PathResolver) -> Self {
        Self {
            machine: machine.into(),
            layout: SiteLayout::default(),
            resolver,
        }
    }

    pub fn with_layout(mut self, layout: SiteLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Diff `observed` against `desired` and plan the result.
pub fn converge(
    observed: &ObservedState,
    desired: &DesiredConfig,
    ctx: &PlanContext,
) -> Result<(StateDiff, Vec<Action>)> {
    let diff = StateDiff::compute(observed, desired, &ctx.resolver);
    let actions = plan(&diff, desired, ctx)?;
    Ok((diff, actions))
}

/// Actions that apply `diff`.
///
/// When the PHP version changes, sites that stay are re-staged too so their
/// FastCGI socket follows the new version.
pub fn plan(diff: &StateDiff, desired: &DesiredConfig, ctx: &PlanContext) -> Result<Vec<Action>> {
    let machine = ctx.machine.as_str();
    let mut actions = Vec::new();

    // ===== Mounts =====
    for mount in &diff.mounts.remove {
        actions.push(Action::umount(machine, &mount.dest)?);
    }
    for mount in &diff.mounts.add {
        actions.push(Action::mount(machine, mount)?);
    }

    // ===== PHP =====
    if let Some(version) = &diff.php {
        actions.extend(provision::install_php(machine, version));
    }

    // ===== Sites =====
    let mut seq = SiteSequencer::new(machine, &ctx.layout);
    for site in &diff.sites.remove {
        seq.unstage_site(&site.hostname, None);
    }
    if diff.php.is_some() {
        for site in &desired.sites {
            let unchanged = !diff.sites.add.iter().any(|s| s.hostname == site.hostname)
                && !diff.sites.remove.iter().any(|s| s.hostname == site.hostname);
            if unchanged {
                seq.unstage_site(&site.hostname, None);
                seq.stage_site(site, &desired.php)?;
            }
        }
    }
    for site in &diff.sites.add {
        seq.stage_site(site, &desired.php)?;
    }
    actions.extend(seq.finish());

    // ===== Databases =====
    for database in &diff.databases.remove {
        actions.push(provision::remove_database(machine, database));
    }
    for database in &diff.start_databases {
        actions.push(provision::start_database(machine, database));
    }
    for database in &diff.databases.add {
        actions.extend(provision::create_database(machine, database));
    }

    debug!("planned {} actions for {machine}", actions.len());
    Ok(actions)
}
