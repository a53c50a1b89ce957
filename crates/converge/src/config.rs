//! Desired configuration file
//!
//! One YAML file per machine declares the PHP version, mounts, sites,
//! databases and optional services. Loading distinguishes a missing file
//! from one that does not parse, and [`DesiredConfig::validate`] checks the
//! semantic rules separately.

use crate::error::ConfigError;
use crate::sequence::{SiteRename, find_mount};
use crate::types::{Database, Mount, Services, Site};
use crate::validate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_PHP: &str = "7.4";

fn default_php() -> String {
    DEFAULT_PHP.to_string()
}

/// Everything the machine should have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
    #[serde(default = "default_php")]
    pub php: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sites: Vec<Site>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<Database>,

    #[serde(default, skip_serializing_if = "Services::is_empty")]
    pub services: Services,
}

impl Default for DesiredConfig {
    fn default() -> Self {
        Self {
            php: default_php(),
            mounts: Vec::new(),
            sites: Vec::new(),
            databases: Vec::new(),
            services: Services::default(),
        }
    }
}

impl DesiredConfig {
    /// Load and parse the config at `path`. Does not validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content, path)
    }

    /// Parse YAML; `path` is only used for error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        // An empty file is a config with every default.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check semantic rules that the YAML schema cannot express.
    pub fn validate(&self) -> Result<()> {
        validate::php_version(&self.php)?;

        for mount in &self.mounts {
            if mount.source.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mount for {} has an empty source",
                    mount.dest
                )));
            }
            validate::machine_path("mount destination", &mount.dest)?;
        }

        let mut hostnames = HashSet::new();
        for site in &self.sites {
            validate::hostname(&site.hostname)?;
            for alias in &site.aliases {
                validate::hostname(alias)?;
            }
            validate::machine_path("webroot", &site.webroot)?;
            if !hostnames.insert(site.hostname.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "site {} is defined more than once",
                    site.hostname
                )));
            }
        }

        validate::databases(&self.databases)
    }

    // =========================================================================
    // Mounts
    // =========================================================================

    /// Whether an identical mount is already declared.
    pub fn already_mounted(&self, mount: &Mount) -> bool {
        self.mounts.iter().any(|m| m == mount)
    }

    /// Add a mount unless an identical one exists. Returns whether it was added.
    pub fn add_mount(&mut self, mount: Mount) -> Result<bool> {
        validate::machine_path("mount destination", &mount.dest)?;
        if self.already_mounted(&mount) {
            return Ok(false);
        }
        if let Some(existing) = self.mounts.iter().find(|m| m.dest == mount.dest) {
            return Err(ConfigError::Invalid(format!(
                "{} is already mounted from {}",
                mount.dest, existing.source
            )));
        }
        self.mounts.push(mount);
        Ok(true)
    }

    /// The declared mount that serves `webroot`, if any.
    pub fn mount_for(&self, webroot: &str) -> Option<&Mount> {
        find_mount(&self.mounts, webroot)
    }

    // =========================================================================
    // Sites
    // =========================================================================

    pub fn site_exists(&self, site: &Site) -> bool {
        self.sites.iter().any(|s| s.same_as(site))
    }

    pub fn find_site(&self, hostname: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.hostname == hostname)
    }

    pub fn add_site(&mut self, site: Site) -> Result<()> {
        validate::hostname(&site.hostname)?;
        validate::machine_path("webroot", &site.webroot)?;
        if self.find_site(&site.hostname).is_some() {
            return Err(ConfigError::Invalid(format!(
                "site {} already exists",
                site.hostname
            )));
        }
        self.sites.push(site);
        Ok(())
    }

    /// Remove a site and any mount that served only that site's webroot.
    pub fn remove_site(&mut self, hostname: &str) -> Result<(Site, Option<Mount>)> {
        let index = self
            .sites
            .iter()
            .position(|s| s.hostname == hostname)
            .ok_or_else(|| ConfigError::Invalid(format!("site {hostname} does not exist")))?;
        let site = self.sites.remove(index);

        let exact = self
            .mounts
            .iter()
            .position(|m| m.dest.trim_end_matches('/') == site.webroot.trim_end_matches('/'));
        let mount = exact.map(|i| self.mounts.remove(i));
        Ok((site, mount))
    }

    /// Rename a site. When the site has a mount of its own, a webroot named
    /// after the old hostname moves with the mount. A site under a shared
    /// mount keeps its webroot, since its content does not move.
    pub fn rename_site(&mut self, old: &str, new: &str) -> Result<SiteRename> {
        validate::hostname(new)?;
        if old == new {
            return Err(ConfigError::Invalid(
                "the new and original hostnames match".to_string(),
            ));
        }
        if self.find_site(new).is_some() {
            return Err(ConfigError::Invalid(format!("site {new} already exists")));
        }

        let index = self
            .sites
            .iter()
            .position(|s| s.hostname == old)
            .ok_or_else(|| ConfigError::Invalid(format!("site {old} does not exist")))?;

        let old_site = self.sites[index].clone();
        let old_mount = self.mount_for(&old_site.webroot).cloned();

        let mut new_site = old_site.clone();
        new_site.hostname = new.to_string();

        let new_mount = match &old_mount {
            Some(mount)
                if mount.dest.trim_end_matches('/') == old_site.webroot.trim_end_matches('/') =>
            {
                new_site.webroot = rename_component(&old_site.webroot, old, new);
                let renamed = Mount::new(mount.source.clone(), new_site.webroot.clone());
                if let Some(m) = self.mounts.iter_mut().find(|m| *m == mount) {
                    *m = renamed.clone();
                }
                Some(renamed)
            }
            other => other.clone(),
        };

        self.sites[index] = new_site.clone();

        Ok(SiteRename {
            old: old_site,
            new: new_site,
            old_mount,
            new_mount,
        })
    }

    // =========================================================================
    // Databases
    // =========================================================================

    pub fn database_exists(&self, database: &Database) -> bool {
        self.databases.iter().any(|d| d.name() == database.name())
    }

    pub fn add_database(&mut self, database: Database) -> Result<()> {
        let mut candidate = self.databases.clone();
        candidate.push(database.clone());
        validate::databases(&candidate)?;
        self.databases.push(database);
        Ok(())
    }

    /// Remove a database by container name.
    pub fn remove_database(&mut self, name: &str) -> Result<Database> {
        let index = self
            .databases
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| ConfigError::Invalid(format!("database {name} does not exist")))?;
        Ok(self.databases.remove(index))
    }
}

/// Replace a path component equal to `old` with `new`.
fn rename_component(path: &str, old: &str, new: &str) -> String {
    path.split('/')
        .map(|part| if part == old { new } else { part })
        .collect::<Vec<_>>()
        .join("/")
}
