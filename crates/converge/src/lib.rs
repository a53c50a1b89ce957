//! # Converge
//!
//! Desired-vs-observed reconciliation for a single development VM.
//!
//! The machine is driven entirely through an external VM manager binary
//! (`multipass` by default). This crate decides *what* to run: it reads the
//! desired config, asks the machine what it has, diffs the two, and plans an
//! ordered list of [`Action`]s that a [`Runner`] executes one by one.
//!
//! ## Core Concepts
//!
//! - **Action**: one invocation of the VM manager, with its full argv
//! - **ObservedState**: mounts, sites, databases and PHP version as reported by the machine
//! - **StateDiff**: the symmetric difference between observed and desired state
//! - **SiteSequencer**: stages nginx sites in a fixed order with one reload at the end
//! - **Runner**: executes actions, fail-fast, with cancellation
//!
//! ## Example
//!
//! ```no_run
//! use converge::{
//!     Collector, DesiredConfig, NoProgress, PathResolver, PlanContext, ProcessRunner,
//!     converge, run_all,
//! };
//! use std::path::Path;
//!
//! let config = DesiredConfig::load(Path::new("devbox.yaml"))?;
//! config.validate()?;
//!
//! let runner = ProcessRunner::new("multipass")?;
//! let ctx = PlanContext::new("devbox", PathResolver::new("/home/me", "/home/me/.config/devbox"));
//! let observed = Collector::new(&runner, &ctx.machine, &ctx.layout).collect()?;
//!
//! let (_, actions) = converge(&observed, &config, &ctx)?;
//! run_all(&runner, &actions, &mut NoProgress)?;
//! # Ok::<(), converge::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`Runner`]: executes actions
//! - [`Probe`]: executes actions and captures their output
//! - [`RunProgress`]: receives progress updates
//!
//! Tests substitute recording implementations, so nothing here needs a
//! real machine.

pub mod action;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod observe;
pub mod plan;
pub mod poll;
pub mod provision;
pub mod resolve;
pub mod runner;
pub mod sequence;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use action::{Action, ActionKind, ExecMode, LaunchSpec};
pub use config::{DEFAULT_PHP, DesiredConfig};
pub use context::{CancelToken, NoProgress, RunProgress};
pub use diff::{Changes, DiffSummary, StateDiff};
pub use error::{ConfigError, Error, ErrorCategory, Result};
pub use observe::{Collector, DatabaseContainer, ObservedState};
pub use plan::{PlanContext, converge, plan};
pub use poll::{PollConfig, poll_until};
pub use resolve::{PathResolver, webroot_for_mount};
pub use runner::{Probe, ProcessRunner, RunReport, Runner, run_all};
pub use sequence::{SiteLayout, SiteRename, SiteSequencer, SiteStage};
pub use types::{Database, Engine, Mount, Services, Site};
