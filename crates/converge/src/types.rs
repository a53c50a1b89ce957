//! Entity types shared by the desired config and the observed state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A host directory shared into the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mount {
    /// Host path, absolute, relative to the config file, or starting with `~`
    pub source: String,
    /// Absolute path inside the machine
    pub dest: String,
}

impl Mount {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// Whether the destination is an absolute machine path.
    pub fn has_absolute_dest(&self) -> bool {
        self.dest.starts_with('/')
    }

    /// Whether `path` (a machine path) lives under this mount's destination.
    pub fn contains(&self, path: &str) -> bool {
        let dest = self.dest.trim_end_matches('/');
        if dest.is_empty() {
            return path.starts_with('/');
        }
        path == dest || path.strip_prefix(dest).is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.source, self.dest)
    }
}

/// An nginx virtual host served from the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub hostname: String,
    /// Absolute path inside the machine
    pub webroot: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Directory under the webroot that nginx serves (may be empty)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_dir: String,
}

impl Site {
    pub fn new(hostname: impl Into<String>, webroot: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            webroot: webroot.into(),
            aliases: Vec::new(),
            public_dir: String::new(),
        }
    }

    /// Value for the `server_name` directive: hostname then aliases.
    pub fn server_name(&self) -> String {
        std::iter::once(self.hostname.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Directory nginx ends up serving, as written to the `root` directive.
    pub fn document_root(&self) -> String {
        let webroot = self.webroot.trim_end_matches('/');
        let public = self.public_dir.trim_matches('/');
        if public.is_empty() {
            webroot.to_string()
        } else {
            format!("{webroot}/{public}")
        }
    }

    /// Hostname, served directory and aliases (order-insensitive).
    pub fn identity(&self) -> (String, String, Vec<String>) {
        let mut aliases = self.aliases.clone();
        aliases.sort();
        aliases.dedup();
        (self.hostname.clone(), self.document_root(), aliases)
    }

    /// Two sites are the same when their identities match.
    pub fn same_as(&self, other: &Site) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.hostname, self.document_root())
    }
}

/// Database engine run as a container inside the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Mysql,
    Postgres,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Port the engine listens on inside its container.
    pub fn container_port(&self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Data directory inside the container, backed by a named volume.
    pub fn data_path(&self) -> &'static str {
        match self {
            Self::Mysql => "/var/lib/mysql",
            Self::Postgres => "/var/lib/postgresql/data",
        }
    }

    /// Environment passed to `docker run`.
    pub fn environment(&self) -> &'static [&'static str] {
        match self {
            Self::Mysql => &[
                "MYSQL_ROOT_PASSWORD=devbox",
                "MYSQL_DATABASE=devbox",
                "MYSQL_USER=devbox",
                "MYSQL_PASSWORD=devbox",
            ],
            Self::Postgres => &[
                "POSTGRES_USER=devbox",
                "POSTGRES_DB=devbox",
                "POSTGRES_PASSWORD=devbox",
            ],
        }
    }

    /// Versions accepted for this engine.
    pub fn supported_versions(&self) -> &'static [&'static str] {
        match self {
            Self::Mysql => &["8.0", "8", "5.8", "5.7", "5.6", "5"],
            Self::Postgres => &["12.2", "12", "11.7", "11", "10.12", "10", "9.6", "9.5", "9"],
        }
    }

    /// Client command for an interactive session in the container.
    pub fn shell_command(&self) -> &'static [&'static str] {
        match self {
            Self::Mysql => &["mysql", "-u", "root", "-pdevbox"],
            Self::Postgres => &["psql", "-U", "devbox"],
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unsupported database engine: {other}")),
        }
    }
}

/// A database container, identified by engine, version and host port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Database {
    pub engine: Engine,
    pub version: String,
    pub port: u16,
}

impl Database {
    pub fn new(engine: Engine, version: impl Into<String>, port: u16) -> Self {
        Self {
            engine,
            version: version.into(),
            port,
        }
    }

    /// Container and volume name: `engine_version_port`.
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.engine, self.version, self.port)
    }

    /// Parse a container name produced by [`Database::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        let mut parts = name.split('_');
        let engine = parts.next()?.parse().ok()?;
        let version = parts.next()?;
        let port = parts.next()?.parse().ok()?;
        if parts.next().is_some() || version.is_empty() {
            return None;
        }
        Some(Self::new(engine, version, port))
    }

    /// Image reference for `docker run`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.engine, self.version)
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Optional services run next to the databases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Services {
    #[serde(default)]
    pub mailhog: bool,
    #[serde(default)]
    pub redis: bool,
}

impl Services {
    pub fn is_empty(&self) -> bool {
        !self.mailhog && !self.redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_is_deterministic() {
        assert_eq!(Database::new(Engine::Mysql, "5.7", 3306).name(), "mysql_5.7_3306");
        assert_eq!(
            Database::new(Engine::Postgres, "11.7", 5432).name(),
            "postgres_11.7_5432"
        );
    }

    #[test]
    fn test_database_from_name() {
        let db = Database::from_name("postgres_11.7_5432").unwrap();
        assert_eq!(db, Database::new(Engine::Postgres, "11.7", 5432));
        assert!(Database::from_name("devbox-proxy").is_none());
        assert!(Database::from_name("mysql_5.7").is_none());
        assert!(Database::from_name("mysql_5.7_notaport").is_none());
        assert!(Database::from_name("mysql_5.7_3306_extra").is_none());
    }

    #[test]
    fn test_server_name_joins_aliases() {
        let mut site = Site::new("app.test", "/devbox/sites/app");
        assert_eq!(site.server_name(), "app.test");
        site.aliases = vec!["www.app.test".into(), "api.app.test".into()];
        assert_eq!(site.server_name(), "app.test www.app.test api.app.test");
    }

    #[test]
    fn test_document_root() {
        let mut site = Site::new("app.test", "/devbox/sites/app/");
        assert_eq!(site.document_root(), "/devbox/sites/app");
        site.public_dir = "web".into();
        assert_eq!(site.document_root(), "/devbox/sites/app/web");
    }

    #[test]
    fn test_same_as_compares_document_root() {
        let mut desired = Site::new("app.test", "/devbox/sites/app");
        desired.public_dir = "web".into();
        let observed = Site::new("app.test", "/devbox/sites/app/web");
        assert!(desired.same_as(&observed));
        assert!(!desired.same_as(&Site::new("app.test", "/devbox/sites/other")));
    }

    #[test]
    fn test_same_as_compares_aliases() {
        let mut desired = Site::new("app.test", "/devbox/sites/app");
        desired.aliases = vec!["www.app.test".into(), "api.app.test".into()];
        let mut observed = Site::new("app.test", "/devbox/sites/app");
        assert!(!desired.same_as(&observed));
        observed.aliases = vec!["api.app.test".into(), "www.app.test".into()];
        assert!(desired.same_as(&observed));
    }

    #[test]
    fn test_mount_contains() {
        let mount = Mount::new("~/dev", "/devbox/sites");
        assert!(mount.contains("/devbox/sites"));
        assert!(mount.contains("/devbox/sites/app"));
        assert!(!mount.contains("/devbox/sitesx"));
        assert!(!mount.contains("/var/www"));
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!("MySQL".parse::<Engine>().unwrap(), Engine::Mysql);
        assert_eq!("postgres".parse::<Engine>().unwrap(), Engine::Postgres);
        assert!("mariadb".parse::<Engine>().is_err());
    }
}
