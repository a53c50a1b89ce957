//! Field validation for the desired config and CLI input.

use crate::error::ConfigError;
use crate::types::{Database, Engine};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

type Result<T> = std::result::Result<T, ConfigError>;

/// PHP versions the machine image can install.
pub const PHP_VERSIONS: &[&str] = &["7.4", "7.3", "7.2"];

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")
        .expect("hostname pattern compiles")
});

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Lowercase DNS-style name without spaces.
pub fn hostname(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("hostname cannot be empty"));
    }
    if name.contains(char::is_whitespace) {
        return Err(invalid(format!("hostname cannot contain spaces: {name:?}")));
    }
    if name.chars().any(char::is_uppercase) {
        return Err(invalid(format!("hostname must be lowercase: {name}")));
    }
    if !HOSTNAME.is_match(name) {
        return Err(invalid(format!("not a valid hostname: {name}")));
    }
    Ok(())
}

/// Machine names are passed as single argv entries.
pub fn machine_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("machine name cannot be empty"));
    }
    if name.contains(char::is_whitespace) {
        return Err(invalid(format!("machine name cannot contain spaces: {name:?}")));
    }
    Ok(())
}

pub fn php_version(version: &str) -> Result<()> {
    if PHP_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(invalid(format!(
            "unsupported PHP version {version} (expected one of {})",
            PHP_VERSIONS.join(", ")
        )))
    }
}

pub fn engine_version(engine: Engine, version: &str) -> Result<()> {
    if engine.supported_versions().contains(&version) {
        Ok(())
    } else {
        Err(invalid(format!(
            "unsupported {engine} version {version} (expected one of {})",
            engine.supported_versions().join(", ")
        )))
    }
}

/// Each database needs a supported version, a unique host port, and a
/// unique engine+version pair.
pub fn databases(databases: &[Database]) -> Result<()> {
    let mut ports = HashSet::new();
    let mut pairs = HashSet::new();
    for db in databases {
        engine_version(db.engine, &db.version)?;
        if db.port == 0 {
            return Err(invalid(format!("{}: port cannot be 0", db.name())));
        }
        if !ports.insert(db.port) {
            return Err(invalid(format!("port {} is used by more than one database", db.port)));
        }
        if !pairs.insert((db.engine, db.version.as_str())) {
            return Err(invalid(format!(
                "{} {} is configured more than once",
                db.engine, db.version
            )));
        }
    }
    Ok(())
}

/// Memory and disk sizes are given in gigabytes, e.g. `4G`.
pub fn size(label: &str, value: &str) -> Result<()> {
    match value.strip_suffix('G') {
        Some(number) if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => Ok(()),
        _ => Err(invalid(format!("{label} must be a whole number of gigabytes like 4G, got {value}"))),
    }
}

pub fn cpus(count: u32) -> Result<()> {
    if count == 0 {
        Err(invalid("cpus must be at least 1"))
    } else {
        Ok(())
    }
}

/// Machine paths are absolute.
pub fn machine_path(label: &str, path: &str) -> Result<()> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(invalid(format!("{label} must be an absolute path: {path}")))
    }
}
