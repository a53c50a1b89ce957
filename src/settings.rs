//! Process-wide settings, built once in `main` and passed by reference.

use crate::cli::Cli;
use crate::paths;
use anyhow::{Context, Result};
use converge::{
    CancelToken, ConfigError, DesiredConfig, PathResolver, PlanContext, ProcessRunner, validate,
};
use std::path::{Path, PathBuf};

pub struct Settings {
    pub machine: String,
    pub vm_binary: String,
    pub environment: String,
    pub config_path: PathBuf,
    pub home: PathBuf,
    pub verbose: u8,
    pub quiet: bool,
    pub cancel: CancelToken,
}

impl Settings {
    pub fn from_cli(cli: &Cli, cancel: CancelToken) -> Result<Self> {
        validate::machine_name(&cli.machine)?;

        let config_path = match &cli.config {
            Some(path) => paths::expand(&path.to_string_lossy()),
            None => paths::config_file(&cli.machine)?,
        };

        Ok(Self {
            machine: cli.machine.clone(),
            vm_binary: cli.vm_binary.clone(),
            environment: cli.environment.clone(),
            config_path,
            home: paths::home_dir()?,
            verbose: cli.verbose,
            quiet: cli.quiet,
            cancel,
        })
    }

    /// Directory relative mount sources are resolved against.
    pub fn config_base_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(&self.home, self.config_base_dir())
    }

    pub fn plan_context(&self) -> PlanContext {
        PlanContext::new(&self.machine, self.resolver())
    }

    pub fn runner(&self) -> Result<ProcessRunner> {
        Ok(ProcessRunner::new(&self.vm_binary)?.with_cancel(self.cancel.clone()))
    }

    /// Load and validate the config; a missing file is an error.
    pub fn load_config(&self) -> Result<DesiredConfig> {
        let config = DesiredConfig::load(&self.config_path)
            .with_context(|| format!("Failed to load config for machine {}", self.machine))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", self.config_path.display()))?;
        Ok(config)
    }

    /// Like [`Self::load_config`], but a missing file yields the defaults.
    pub fn load_config_or_default(&self) -> Result<DesiredConfig> {
        match DesiredConfig::load(&self.config_path) {
            Ok(config) => {
                config
                    .validate()
                    .with_context(|| format!("Invalid config {}", self.config_path.display()))?;
                Ok(config)
            }
            Err(ConfigError::NotFound(_)) => {
                log::info!(
                    "no config at {}, starting from defaults",
                    self.config_path.display()
                );
                Ok(DesiredConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_config(&self, config: &DesiredConfig) -> Result<()> {
        config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save config for machine {}", self.machine))
    }
}
