//! Path resolution for devbox
//!
//! # Environment Variables
//!
//! - `DEVBOX_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/devbox`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `DEVBOX_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/devbox` (if set)
//! 3. `~/.config/devbox`
//!
//! Each machine has its own config file, `<config dir>/<machine>.yaml`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DEVBOX_CONFIG_DIR";

/// Get the devbox config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("devbox");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let path = home_dir()?.join(".config").join("devbox");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Config file for `machine` inside `dir`.
pub fn config_file_in(dir: &Path, machine: &str) -> PathBuf {
    dir.join(format!("{machine}.yaml"))
}

/// Config file for `machine` in the default config directory.
pub fn config_file(machine: &str) -> Result<PathBuf> {
    Ok(config_file_in(&config_dir()?, machine))
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Only use in single-threaded test contexts.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/devbox", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/devbox"));
        });
    }

    #[test]
    fn test_config_dir_xdg() {
        without_env_var(ENV_CONFIG_DIR, || {
            with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-devbox-test", || {
                assert_eq!(
                    config_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-devbox-test/devbox")
                );
            });
        });
    }

    #[test]
    fn test_config_file_per_machine() {
        assert_eq!(
            config_file_in(Path::new("/etc/devbox"), "work"),
            PathBuf::from("/etc/devbox/work.yaml")
        );
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/sites/app"), home.join("sites").join("app"));
    }
}
