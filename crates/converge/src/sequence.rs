//! Site template sequencing.
//!
//! A site goes live in a fixed order: copy the template into
//! `sites-available`, substitute its four placeholders, link it into
//! `sites-enabled`, and finally reload nginx. [`SiteSequencer`] tracks each
//! site's [`SiteStage`] and refuses out-of-order steps, and it only emits the
//! reload from [`SiteSequencer::finish`], so the reload is always last and
//! happens once no matter how many sites changed.

use crate::action::Action;
use crate::error::{Error, Result};
use crate::types::{Mount, Site};
use std::collections::HashMap;
use std::fmt;

/// Placeholders in the nginx template, in substitution order.
pub const PLACEHOLDER_WEBROOT: &str = "CHANGEWEBROOTDIR";
pub const PLACEHOLDER_SERVER_NAME: &str = "CHANGESERVERNAME";
pub const PLACEHOLDER_PUBLIC_DIR: &str = "CHANGEPUBLICDIR";
pub const PLACEHOLDER_PHP_VERSION: &str = "CHANGEPHPVERSION";

/// Where the template and the nginx site directories live in the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub template: String,
    pub available_dir: String,
    pub enabled_dir: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            template: "/opt/devbox/nginx/template.conf".to_string(),
            available_dir: "/etc/nginx/sites-available".to_string(),
            enabled_dir: "/etc/nginx/sites-enabled".to_string(),
        }
    }
}

impl SiteLayout {
    pub fn available(&self, hostname: &str) -> String {
        format!("{}/{hostname}", self.available_dir)
    }

    pub fn enabled(&self, hostname: &str) -> String {
        format!("{}/{hostname}", self.enabled_dir)
    }
}

/// Progress of one site through staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SiteStage {
    Unstaged,
    TemplateCopied,
    VariablesSubstituted,
    Linked,
    Live,
}

impl fmt::Display for SiteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unstaged => "unstaged",
            Self::TemplateCopied => "template-copied",
            Self::VariablesSubstituted => "variables-substituted",
            Self::Linked => "linked",
            Self::Live => "live",
        };
        f.write_str(name)
    }
}

/// Emits site actions for one machine, reload last.
#[derive(Debug)]
pub struct SiteSequencer<'a> {
    machine: &'a str,
    layout: &'a SiteLayout,
    actions: Vec<Action>,
    stages: HashMap<String, SiteStage>,
    needs_reload: bool,
}

impl<'a> SiteSequencer<'a> {
    pub fn new(machine: &'a str, layout: &'a SiteLayout) -> Self {
        Self {
            machine,
            layout,
            actions: Vec::new(),
            stages: HashMap::new(),
            needs_reload: false,
        }
    }

    /// Current stage of `hostname` within this sequence.
    pub fn stage(&self, hostname: &str) -> SiteStage {
        self.stages
            .get(hostname)
            .copied()
            .unwrap_or(SiteStage::Unstaged)
    }

    fn advance(&mut self, hostname: &str, from: SiteStage, to: SiteStage) -> Result<()> {
        let current = self.stage(hostname);
        if current != from {
            return Err(Error::StageOrder {
                hostname: hostname.to_string(),
                from: current.to_string(),
                to: to.to_string(),
            });
        }
        self.stages.insert(hostname.to_string(), to);
        Ok(())
    }

    /// Append an action that is not a site step (e.g. a mount change).
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// `cp <template> sites-available/<hostname>`
    pub fn copy_template(&mut self, hostname: &str) -> Result<()> {
        self.advance(hostname, SiteStage::Unstaged, SiteStage::TemplateCopied)?;
        self.actions.push(Action::sudo(
            self.machine,
            [
                "cp".to_string(),
                self.layout.template.clone(),
                self.layout.available(hostname),
            ],
        ));
        self.needs_reload = true;
        Ok(())
    }

    /// The four `sed -i` substitutions, in fixed order. Empty values still
    /// produce their substitution so no placeholder survives.
    pub fn substitute(&mut self, site: &Site, php: &str) -> Result<()> {
        self.advance(
            &site.hostname,
            SiteStage::TemplateCopied,
            SiteStage::VariablesSubstituted,
        )?;
        let file = self.layout.available(&site.hostname);
        let values = [
            (PLACEHOLDER_WEBROOT, site.webroot.trim_end_matches('/').to_string()),
            (PLACEHOLDER_SERVER_NAME, site.server_name()),
            (PLACEHOLDER_PUBLIC_DIR, site.public_dir.trim_matches('/').to_string()),
            (PLACEHOLDER_PHP_VERSION, php.to_string()),
        ];
        for (placeholder, value) in values {
            self.actions.push(Action::sudo(
                self.machine,
                [
                    "sed".to_string(),
                    "-i".to_string(),
                    format!("s|{placeholder}|{value}|g"),
                    file.clone(),
                ],
            ));
        }
        Ok(())
    }

    /// `ln -s sites-available/<hostname> sites-enabled/`
    pub fn link(&mut self, hostname: &str) -> Result<()> {
        self.advance(hostname, SiteStage::VariablesSubstituted, SiteStage::Linked)?;
        self.actions.push(Action::sudo(
            self.machine,
            [
                "ln".to_string(),
                "-s".to_string(),
                self.layout.available(hostname),
                format!("{}/", self.layout.enabled_dir),
            ],
        ));
        Ok(())
    }

    /// Copy, substitute, and link one site.
    pub fn stage_site(&mut self, site: &Site, php: &str) -> Result<()> {
        self.copy_template(&site.hostname)?;
        self.substitute(site, php)?;
        self.link(&site.hostname)
    }

    /// Remove a site's enabled link and available file, and optionally its
    /// content directory inside the machine.
    pub fn unstage_site(&mut self, hostname: &str, content_dir: Option<&str>) {
        self.unlink_site(hostname);
        if let Some(dir) = content_dir {
            self.remove_content(dir);
        }
    }

    /// `rm sites-enabled/<hostname>` then `rm sites-available/<hostname>`
    pub fn unlink_site(&mut self, hostname: &str) {
        self.actions.push(Action::sudo(
            self.machine,
            ["rm".to_string(), self.layout.enabled(hostname)],
        ));
        self.actions.push(Action::sudo(
            self.machine,
            ["rm".to_string(), self.layout.available(hostname)],
        ));
        self.stages.remove(hostname);
        self.needs_reload = true;
    }

    /// `rm -rf <dir>` inside the machine.
    pub fn remove_content(&mut self, dir: &str) {
        self.actions.push(Action::exec(
            self.machine,
            ["rm".to_string(), "-rf".to_string(), dir.to_string()],
        ));
    }

    /// Whether any site step was emitted.
    pub fn touched_sites(&self) -> bool {
        self.needs_reload
    }

    /// The emitted actions followed by a single reload, when any site changed.
    pub fn finish(mut self) -> Vec<Action> {
        if self.needs_reload {
            for stage in self.stages.values_mut() {
                if *stage == SiteStage::Linked {
                    *stage = SiteStage::Live;
                }
            }
            self.actions.push(reload_nginx(self.machine));
        }
        self.actions
    }
}

/// `sudo service nginx restart`
pub fn reload_nginx(machine: &str) -> Action {
    Action::sudo(machine, ["service", "nginx", "restart"])
}

/// Actions to bring one new site live.
pub fn add_site(machine: &str, layout: &SiteLayout, site: &Site, php: &str) -> Result<Vec<Action>> {
    let mut seq = SiteSequencer::new(machine, layout);
    seq.stage_site(site, php)?;
    Ok(seq.finish())
}

/// Actions to take a site down.
///
/// nginx stops referencing the site before its mount is detached. The mount
/// point is deleted only when `delete_content` is set, and only after the
/// umount so the host's files are never touched.
pub fn remove_site(
    machine: &str,
    layout: &SiteLayout,
    hostname: &str,
    mount: Option<&Mount>,
    delete_content: bool,
) -> Result<Vec<Action>> {
    let mut seq = SiteSequencer::new(machine, layout);
    seq.unlink_site(hostname);
    if let Some(mount) = mount {
        seq.push(Action::umount(machine, &mount.dest)?);
        if delete_content {
            seq.remove_content(&mount.dest);
        }
    }
    Ok(seq.finish())
}

/// A site renamed in the config, with the mounts that back each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRename {
    pub old: Site,
    pub new: Site,
    /// Mount serving the old webroot, if any
    pub old_mount: Option<Mount>,
    /// Mount serving the new webroot, if any
    pub new_mount: Option<Mount>,
}

/// Actions to rename a site.
///
/// When both webroots sit under the same mount nothing is remounted.
/// Otherwise the old mount is detached and the new one attached before the
/// old site is taken down. The new site is then staged and nginx reloaded.
/// Mount sources must already be resolved.
pub fn rename_site(
    machine: &str,
    layout: &SiteLayout,
    rename: &SiteRename,
    php: &str,
) -> Result<Vec<Action>> {
    let mut seq = SiteSequencer::new(machine, layout);

    if rename.old_mount != rename.new_mount {
        if let Some(old) = &rename.old_mount {
            seq.push(Action::umount(machine, &old.dest)?);
        }
        if let Some(new) = &rename.new_mount {
            seq.push(Action::mount(machine, new)?);
        }
    }

    seq.unstage_site(&rename.old.hostname, None);
    seq.stage_site(&rename.new, php)?;
    Ok(seq.finish())
}

/// The mount whose destination most specifically contains `webroot`.
pub fn find_mount<'m>(mounts: &'m [Mount], webroot: &str) -> Option<&'m Mount> {
    mounts
        .iter()
        .filter(|m| m.contains(webroot))
        .max_by_key(|m| m.dest.trim_end_matches('/').len())
}
