//! `site` subcommands.
//!
//! Each command edits the config first, then runs only the commands for the
//! site it touched, so a later `apply` has nothing left to do.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use converge::resolve::normalize;
use converge::{Action, Mount, Site, sequence, validate, webroot_for_mount};
use std::path::PathBuf;

use crate::cli::SiteCommand;
use crate::engine::{self, ExecuteOptions};
use crate::paths;
use crate::settings::Settings;
use crate::ui;

/// Where new site mounts land inside the machine.
const SITES_ROOT: &str = "/devbox/sites";

pub fn run(settings: &Settings, cmd: SiteCommand) -> Result<()> {
    match cmd {
        SiteCommand::Add {
            hostname,
            source,
            webroot,
            aliases,
            public_dir,
            yes,
        } => add(
            settings,
            &SiteRequest {
                hostname,
                source,
                webroot,
                aliases,
                public_dir,
            },
            yes,
        ),
        SiteCommand::Remove {
            hostname,
            keep_files,
            yes,
        } => remove(settings, &hostname, keep_files, yes),
        SiteCommand::Rename { old, new, yes } => rename(settings, &old, &new, yes),
        SiteCommand::Ls => list(settings),
    }
}

pub struct SiteRequest {
    pub hostname: String,
    pub source: String,
    pub webroot: Option<String>,
    pub aliases: Vec<String>,
    pub public_dir: String,
}

fn options(settings: &Settings, yes: bool) -> ExecuteOptions {
    ExecuteOptions {
        dry_run: false,
        yes,
        verbose: true,
        quiet: settings.quiet,
    }
}

/// A host directory given on the command line, made absolute against the
/// current directory.
fn source_path(source: &str) -> Result<PathBuf> {
    let expanded = paths::expand(source);
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(normalize(&cwd.join(expanded)))
}

/// Decide where a new site lives and whether it needs its own mount.
///
/// A source already under a declared mount reuses it; otherwise the source
/// gets a dedicated mount at the webroot.
fn place_site(
    settings: &Settings,
    mounts: &[Mount],
    request: &SiteRequest,
) -> Result<(Site, Option<Mount>)> {
    let source = source_path(&request.source)?;
    let resolver = settings.resolver();

    let existing = mounts
        .iter()
        .find_map(|m| webroot_for_mount(&resolver.resolve_mount(m), &source));

    let (webroot, mount) = match (existing, &request.webroot) {
        (Some(webroot), None) => (webroot, None),
        (_, Some(webroot)) => (
            webroot.clone(),
            Some(Mount::new(source.to_string_lossy(), webroot.clone())),
        ),
        (None, None) => {
            let webroot = format!("{SITES_ROOT}/{}", request.hostname);
            (
                webroot.clone(),
                Some(Mount::new(source.to_string_lossy(), webroot)),
            )
        }
    };

    let site = Site {
        hostname: request.hostname.clone(),
        webroot,
        aliases: request.aliases.clone(),
        public_dir: request.public_dir.clone(),
    };
    Ok((site, mount))
}

pub fn add(settings: &Settings, request: &SiteRequest, yes: bool) -> Result<()> {
    validate::hostname(&request.hostname)?;
    for alias in &request.aliases {
        validate::hostname(alias)?;
    }

    let mut config = settings.load_config_or_default()?;
    if config.find_site(&request.hostname).is_some() {
        bail!("Site {} already exists", request.hostname);
    }

    let (site, mount) = place_site(settings, &config.mounts, request)?;

    let mut actions = Vec::new();
    if let Some(mount) = &mount
        && config.add_mount(mount.clone())?
    {
        actions.push(Action::mount(&settings.machine, mount)?);
    }
    actions.extend(sequence::add_site(
        &settings.machine,
        &settings.plan_context().layout,
        &site,
        &config.php,
    )?);

    config.add_site(site.clone())?;
    settings.save_config(&config)?;
    ui::success(&format!("Added {} to {}", site.to_string().bold(), settings.config_path.display()));

    let summary = engine::execute(
        &settings.runner()?,
        &settings.vm_binary,
        &actions,
        &options(settings, yes),
    )?;
    engine::print_summary(&summary);
    Ok(())
}

pub fn remove(settings: &Settings, hostname: &str, keep_files: bool, yes: bool) -> Result<()> {
    let mut config = settings.load_config()?;
    let (site, mount) = config.remove_site(hostname)?;

    let actions = sequence::remove_site(
        &settings.machine,
        &settings.plan_context().layout,
        &site.hostname,
        mount.as_ref(),
        !keep_files,
    )?;

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
    ui::success(&format!("Removed {}", site.hostname.bold()));
    Ok(())
}

pub fn rename(settings: &Settings, old: &str, new: &str, yes: bool) -> Result<()> {
    let mut config = settings.load_config()?;
    let mut rename = config.rename_site(old, new)?;

    let resolver = settings.resolver();
    rename.old_mount = rename.old_mount.map(|m| resolver.resolve_mount(&m));
    rename.new_mount = rename.new_mount.map(|m| resolver.resolve_mount(&m));

    let actions = sequence::rename_site(
        &settings.machine,
        &settings.plan_context().layout,
        &rename,
        &config.php,
    )?;

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
    ui::success(&format!("Renamed {} to {}", old, new.bold()));
    Ok(())
}

pub fn list(settings: &Settings) -> Result<()> {
    let config = settings.load_config_or_default()?;
    ui::header(&format!("Sites ({})", settings.machine));

    if config.sites.is_empty() {
        ui::dim("No sites configured. Add one with `devbox site add <hostname>`.");
        return Ok(());
    }

    for site in &config.sites {
        println!("  {} {}", "●".green(), site.hostname.bold());
        ui::kv("  root", &site.document_root());
        if !site.aliases.is_empty() {
            ui::kv("  aliases", &site.aliases.join(", "));
        }
        if let Some(mount) = config.mount_for(&site.webroot) {
            ui::kv("  mount", &mount.source);
        }
    }
    Ok(())
}
