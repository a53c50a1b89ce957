//! Observed-state collection.
//!
//! The [`Collector`] asks the machine what it currently has (mounts, enabled
//! sites, database containers, PHP version) through a [`Probe`] and turns the
//! answers into the same types the desired config uses. Parsing lives in free
//! functions so it can be tested without a machine.

use crate::action::Action;
use crate::error::{Error, Result};
use crate::runner::Probe;
use crate::sequence::SiteLayout;
use crate::types::{Database, Mount, Site};
use log::{debug, warn};

/// Column holding the mount list in `info --format=csv` output.
const MOUNTS_COLUMN: usize = 12;

/// What the machine currently has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub mounts: Vec<Mount>,
    pub sites: Vec<Site>,
    /// Database containers in any state
    pub databases: Vec<Database>,
    /// The subset of `databases` whose containers are not running
    pub stopped_databases: Vec<Database>,
    /// `major.minor`, or `None` when PHP is not installed
    pub php: Option<String>,
}

/// A database container and whether it is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseContainer {
    pub database: Database,
    pub running: bool,
}

/// Reads observed state from one machine.
pub struct Collector<'a, P: Probe + ?Sized> {
    probe: &'a P,
    machine: &'a str,
    layout: &'a SiteLayout,
}

impl<'a, P: Probe + ?Sized> Collector<'a, P> {
    pub fn new(probe: &'a P, machine: &'a str, layout: &'a SiteLayout) -> Self {
        Self {
            probe,
            machine,
            layout,
        }
    }

    /// Everything at once.
    pub fn collect(&self) -> Result<ObservedState> {
        let containers = self.database_containers()?;
        let state = ObservedState {
            mounts: self.mounts()?,
            sites: self.sites()?,
            stopped_databases: containers
                .iter()
                .filter(|c| !c.running)
                .map(|c| c.database.clone())
                .collect(),
            databases: containers.into_iter().map(|c| c.database).collect(),
            php: self.php_version()?,
        };
        debug!(
            "observed {} mounts, {} sites, {} databases ({} stopped), php {:?}",
            state.mounts.len(),
            state.sites.len(),
            state.databases.len(),
            state.stopped_databases.len(),
            state.php
        );
        Ok(state)
    }

    /// Mounts reported by `info --format=csv`.
    pub fn mounts(&self) -> Result<Vec<Mount>> {
        let csv = self.probe.capture(&Action::info_csv(self.machine))?;
        parse_mounts_csv(&csv, self.machine)
    }

    /// Sites linked into `sites-enabled`, read back from their config files.
    pub fn sites(&self) -> Result<Vec<Site>> {
        let listing = self.probe.capture(&Action::exec(
            self.machine,
            ["ls", self.layout.enabled_dir.as_str()],
        ))?;

        let mut sites = Vec::new();
        for conf in parse_sites_listing(&listing) {
            let file = self.layout.available(&conf);
            let root = self
                .grep_directive(&file, "root")?
                .and_then(|out| parse_directive(&out, "root"));
            let names = self
                .grep_directive(&file, "server_name")?
                .and_then(|out| parse_server_name(&out));
            match (root, names) {
                (Some(webroot), Some((hostname, aliases))) => {
                    let mut site = Site::new(hostname, webroot);
                    site.aliases = aliases;
                    sites.push(site);
                }
                _ => warn!("skipping site {conf}: missing root or server_name"),
            }
        }
        Ok(sites)
    }

    /// Lines of an nginx file mentioning `directive`; `None` when grep finds nothing.
    fn grep_directive(&self, file: &str, directive: &str) -> Result<Option<String>> {
        let action = Action::exec(
            self.machine,
            ["grep".to_string(), format!("{directive} "), file.to_string()],
        );
        match self.probe.capture(&action) {
            Ok(output) => Ok(Some(output)),
            Err(e) if e.is_command_failure() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Database containers, stopped ones included, recognized by their
    /// `engine_version_port` names.
    pub fn database_containers(&self) -> Result<Vec<DatabaseContainer>> {
        let output = self.probe.capture(&Action::exec(
            self.machine,
            ["docker", "container", "ls", "--all", "--format", "{{.Names}} {{.State}}"],
        ))?;
        Ok(parse_containers(&output))
    }

    /// Installed PHP version; a failing `php --version` means not installed.
    pub fn php_version(&self) -> Result<Option<String>> {
        match self
            .probe
            .capture(&Action::exec(self.machine, ["php", "--version"]))
        {
            Ok(output) => Ok(parse_php_version(&output)),
            Err(e) if e.is_command_failure() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Split one CSV line, honoring double-quoted cells and `""` escapes.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            other => cell.push(other),
        }
    }
    cells.push(cell);
    cells
}

/// Mounts for `machine` from `info --format=csv` output.
///
/// The mounts cell holds `source => dest` records separated by `;` with a
/// trailing empty segment. Sources may contain spaces.
pub fn parse_mounts_csv(csv: &str, machine: &str) -> Result<Vec<Mount>> {
    let row = csv
        .lines()
        .skip(1)
        .map(split_csv_line)
        .find(|cells| cells.first().is_some_and(|c| c == machine))
        .ok_or_else(|| Error::observation("mounts", format!("no info row for machine {machine}")))?;

    let Some(cell) = row.get(MOUNTS_COLUMN) else {
        debug!("info row has {} columns, assuming no mounts", row.len());
        return Ok(Vec::new());
    };

    let mut mounts = Vec::new();
    for record in cell.split(';') {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let (source, dest) = record.rsplit_once("=>").ok_or_else(|| {
            Error::observation("mounts", format!("unrecognized mount record: {record}"))
        })?;
        mounts.push(Mount::new(source.trim(), dest.trim()));
    }
    Ok(mounts)
}

/// Site config names from `ls sites-enabled`, skipping `default`.
pub fn parse_sites_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "default")
        .map(str::to_string)
        .collect()
}

/// Second field of the first line whose first field is `directive`.
pub fn parse_directive(output: &str, directive: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next()? != directive {
            return None;
        }
        let value = fields.next()?.trim_end_matches(';');
        let value = if value.len() > 1 {
            value.trim_end_matches('/')
        } else {
            value
        };
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Hostname and aliases from a `server_name` line.
pub fn parse_server_name(output: &str) -> Option<(String, Vec<String>)> {
    output.lines().find_map(|line| {
        let mut fields = line
            .split_whitespace()
            .map(|f| f.trim_end_matches(';'))
            .filter(|f| !f.is_empty());
        if fields.next()? != "server_name" {
            return None;
        }
        let hostname = fields.next()?.to_string();
        Some((hostname, fields.map(str::to_string).collect()))
    })
}

/// Database containers from `{{.Names}} {{.State}}` lines; other
/// containers are ignored. A line without a state counts as running.
pub fn parse_containers(output: &str) -> Vec<DatabaseContainer> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace().map(|f| f.trim_matches('\''));
            let name = fields.next()?;
            let running = fields
                .next()
                .is_none_or(|state| matches!(state, "running" | "restarting"));
            match Database::from_name(name) {
                Some(database) => Some(DatabaseContainer { database, running }),
                None => {
                    debug!("ignoring container {name}");
                    None
                }
            }
        })
        .collect()
}

/// `major.minor` from the first line of `php --version`.
pub fn parse_php_version(output: &str) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let full = line.split_whitespace().nth(1)?;
    let mut parts = full.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    let minor: String = minor.chars().take_while(char::is_ascii_digit).collect();
    if major.is_empty() || minor.is_empty() {
        return None;
    }
    Some(format!("{major}.{minor}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::FakeProbe;
    use crate::types::Engine;
    use pretty_assertions::assert_eq;

    const INFO_CSV: &str = "\
Name,State,Ipv4,Ipv6,Release,Image hash,Image release,Load,Disk usage,Disk total,Memory usage,Memory total,Mounts
dev,Running,192.168.64.2,,Ubuntu 18.04.4 LTS,2f6bc5e7d9ac,18.04 LTS,0.00 0.00 0.00,2.1G,38.6G,150.0M,3.9G,\"/home/u/app => /devbox/sites/app;/home/u/My Sites/blog => /devbox/sites/blog;\"
other,Running,192.168.64.3,,Ubuntu 18.04.4 LTS,2f6bc5e7d9ac,18.04 LTS,0.00 0.00 0.00,2.1G,38.6G,150.0M,3.9G,/tmp/x => /x;
";

    #[test]
    fn test_split_csv_line_quotes() {
        assert_eq!(
            split_csv_line(r#"a,"b,c","say ""hi""",,"#),
            vec!["a", "b,c", "say \"hi\"", "", ""]
        );
    }

    #[test]
    fn test_parse_mounts_csv() {
        let mounts = parse_mounts_csv(INFO_CSV, "dev").unwrap();
        assert_eq!(
            mounts,
            vec![
                Mount::new("/home/u/app", "/devbox/sites/app"),
                Mount::new("/home/u/My Sites/blog", "/devbox/sites/blog"),
            ]
        );
    }

    #[test]
    fn test_parse_mounts_csv_other_machine() {
        let mounts = parse_mounts_csv(INFO_CSV, "other").unwrap();
        assert_eq!(mounts, vec![Mount::new("/tmp/x", "/x")]);
    }

    #[test]
    fn test_parse_mounts_csv_missing_machine() {
        let err = parse_mounts_csv(INFO_CSV, "nope").unwrap_err();
        assert!(matches!(err, Error::Observation { .. }));
    }

    #[test]
    fn test_parse_mounts_csv_no_mounts() {
        let csv = "Name,State\ndev,Stopped\n";
        assert!(parse_mounts_csv(csv, "dev").unwrap().is_empty());
    }

    #[test]
    fn test_parse_sites_listing() {
        assert_eq!(
            parse_sites_listing("default\napp.test\n\nblog.test\n"),
            vec!["app.test", "blog.test"]
        );
    }

    #[test]
    fn test_parse_directive() {
        let grep = "    root /devbox/sites/app/web;\n";
        assert_eq!(
            parse_directive(grep, "root").as_deref(),
            Some("/devbox/sites/app/web")
        );
        let grep = "server_name app.test www.app.test;\n";
        assert_eq!(parse_directive(grep, "server_name").as_deref(), Some("app.test"));
        assert_eq!(parse_directive("# root is elsewhere\n", "root"), None);
    }

    #[test]
    fn test_parse_server_name_keeps_aliases() {
        assert_eq!(
            parse_server_name("    server_name app.test www.app.test api.app.test;\n"),
            Some((
                "app.test".to_string(),
                vec!["www.app.test".to_string(), "api.app.test".to_string()]
            ))
        );
        assert_eq!(
            parse_server_name("server_name app.test ;"),
            Some(("app.test".to_string(), Vec::new()))
        );
        assert_eq!(parse_server_name("# server_name is set below\n"), None);
    }

    #[test]
    fn test_parse_directive_trailing_slash() {
        assert_eq!(
            parse_directive("root /devbox/sites/app/;", "root").as_deref(),
            Some("/devbox/sites/app")
        );
    }

    #[test]
    fn test_parse_containers() {
        let out = "'mysql_5.7_3306' running\npostgres_11.7_5432 exited\ndevbox-proxy running\nredis.service.devbox running\n";
        assert_eq!(
            parse_containers(out),
            vec![
                DatabaseContainer {
                    database: Database::new(Engine::Mysql, "5.7", 3306),
                    running: true,
                },
                DatabaseContainer {
                    database: Database::new(Engine::Postgres, "11.7", 5432),
                    running: false,
                },
            ]
        );
    }

    #[test]
    fn test_parse_containers_without_state() {
        let parsed = parse_containers("mysql_5.7_3306\n");
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].running);
    }

    #[test]
    fn test_parse_php_version() {
        let out = "PHP 7.4.3 (cli) (built: Feb 20 2020 21:53:46) ( NTS )\nCopyright (c) The PHP Group\n";
        assert_eq!(parse_php_version(out).as_deref(), Some("7.4"));
        assert_eq!(
            parse_php_version("PHP 7.2.24-0ubuntu0.18.04.3 (cli)").as_deref(),
            Some("7.2")
        );
        assert_eq!(parse_php_version(""), None);
        assert_eq!(parse_php_version("PHP"), None);
    }

    #[test]
    fn test_collect_through_probe() {
        let layout = SiteLayout::default();
        let probe = FakeProbe::default()
            .with("info dev --format=csv", INFO_CSV)
            .with("exec dev -- ls /etc/nginx/sites-enabled", "default\napp.test\nbroken.test\n")
            .with(
                "exec dev -- grep root  /etc/nginx/sites-available/app.test",
                "root /devbox/sites/app/web;",
            )
            .with(
                "exec dev -- grep server_name  /etc/nginx/sites-available/app.test",
                "server_name app.test www.app.test;",
            )
            .with(
                "exec dev -- docker container ls --all --format {{.Names}} {{.State}}",
                "mysql_5.7_3306 running\npostgres_11.7_5432 exited\n",
            )
            .with("exec dev -- php --version", "PHP 7.3.1 (cli)\n");

        let state = Collector::new(&probe, "dev", &layout).collect().unwrap();
        assert_eq!(state.mounts.len(), 2);
        let mut site = Site::new("app.test", "/devbox/sites/app/web");
        site.aliases = vec!["www.app.test".to_string()];
        assert_eq!(state.sites, vec![site]);
        assert_eq!(
            state.databases,
            vec![
                Database::new(Engine::Mysql, "5.7", 3306),
                Database::new(Engine::Postgres, "11.7", 5432),
            ]
        );
        assert_eq!(
            state.stopped_databases,
            vec![Database::new(Engine::Postgres, "11.7", 5432)]
        );
        assert_eq!(state.php.as_deref(), Some("7.3"));
    }

    #[test]
    fn test_missing_php_is_none() {
        let layout = SiteLayout::default();
        let probe = FakeProbe::default();
        let collector = Collector::new(&probe, "dev", &layout);
        assert_eq!(collector.php_version().unwrap(), None);
    }
}
