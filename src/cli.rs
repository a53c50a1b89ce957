use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use converge::Engine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devbox")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Local development environment: one VM, its sites, and its databases", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Machine to manage
    #[arg(short, long, global = true, env = "DEVBOX_MACHINE", default_value = "devbox")]
    pub machine: String,

    /// Config file (default: <config dir>/<machine>.yaml)
    #[arg(short, long, global = true, env = "DEVBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// VM manager binary
    #[arg(long, global = true, env = "DEVBOX_VM_BINARY", default_value = "multipass")]
    pub vm_binary: String,

    /// Container environment name
    #[arg(short, long, global = true, env = "DEVBOX_ENVIRONMENT", default_value = "devbox")]
    pub environment: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make the machine match the config
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff,

    /// Create the container environment and launch the machine
    Init(InitArgs),

    /// Manage sites
    #[command(subcommand)]
    Site(SiteCommand),

    /// Manage databases
    #[command(subcommand)]
    Db(DbCommand),

    /// Open a shell in the machine
    Ssh,

    /// Control the machine itself
    #[command(subcommand)]
    Machine(MachineCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Init
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// Show the plan without running it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Only reconcile containers, do not launch the machine
    #[arg(long)]
    pub skip_launch: bool,

    /// Virtual CPUs
    #[arg(long, default_value = "2")]
    pub cpus: u32,

    /// Memory, in gigabytes with a G suffix
    #[arg(long, default_value = "4G")]
    pub memory: String,

    /// Disk size, in gigabytes with a G suffix
    #[arg(long, default_value = "40G")]
    pub disk: String,

    /// Ubuntu image to launch
    #[arg(long, default_value = "18.04")]
    pub image: String,
}

// ============================================================================
// Site Commands
// ============================================================================

#[derive(Subcommand)]
pub enum SiteCommand {
    /// Mount a project directory and serve it under a hostname
    Add {
        /// Hostname, e.g. myapp.test
        hostname: String,

        /// Project directory on this host
        #[arg(default_value = ".")]
        source: String,

        /// Directory inside the machine (default: /devbox/sites/<hostname>)
        #[arg(long)]
        webroot: Option<String>,

        /// Additional server names
        #[arg(short, long = "alias")]
        aliases: Vec<String>,

        /// Directory under the webroot that nginx serves, e.g. web
        #[arg(short, long, default_value = "")]
        public_dir: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Stop serving a site and detach its mount
    #[command(alias = "rm")]
    Remove {
        /// Hostname of the site
        hostname: String,

        /// Keep the site's directory inside the machine
        #[arg(long)]
        keep_files: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Change a site's hostname
    Rename {
        /// Current hostname
        old: String,

        /// New hostname
        new: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List configured sites
    #[command(alias = "list")]
    Ls,
}

// ============================================================================
// Database Commands
// ============================================================================

#[derive(Clone, Copy, ValueEnum)]
pub enum EngineArg {
    Mysql,
    Postgres,
}

impl From<EngineArg> for Engine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Mysql => Engine::Mysql,
            EngineArg::Postgres => Engine::Postgres,
        }
    }
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Add a database container
    Add {
        /// Database engine
        #[arg(value_enum)]
        engine: EngineArg,

        /// Engine version, e.g. 5.7 or 11.7
        version: String,

        /// Host port to publish
        port: u16,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove a database container (its data volume is kept)
    #[command(alias = "rm")]
    Remove {
        /// Database name, e.g. mysql_5.7_3306
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List databases and whether their containers are running
    #[command(alias = "list")]
    Ls,

    /// Open the database's command-line client
    Shell {
        /// Database name
        name: String,
    },

    /// Run a command in the database container and wait for it
    Exec {
        /// Database name
        name: String,

        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

// ============================================================================
// Machine Commands
// ============================================================================

#[derive(Subcommand)]
pub enum MachineCommand {
    /// Start the machine
    Start,

    /// Stop the machine
    Stop,

    /// Restart the machine
    Restart,

    /// Show machine details
    Info,

    /// Delete the machine
    Delete {
        /// Also purge it so the name can be reused
        #[arg(long)]
        purge: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_db_exec() {
        let cli = Cli::try_parse_from([
            "devbox",
            "db",
            "exec",
            "mysql_5.7_3306",
            "--timeout",
            "10",
            "--",
            "mysqldump",
            "-uroot",
        ])
        .unwrap();
        match cli.command {
            Command::Db(DbCommand::Exec {
                name,
                timeout,
                command,
            }) => {
                assert_eq!(name, "mysql_5.7_3306");
                assert_eq!(timeout, 10);
                assert_eq!(command, ["mysqldump", "-uroot"]);
            }
            _ => panic!("expected db exec"),
        }
    }

    #[test]
    fn test_global_machine_flag() {
        let cli = Cli::try_parse_from(["devbox", "diff", "--machine", "work"]).unwrap();
        assert_eq!(cli.machine, "work");
        assert!(matches!(cli.command, Command::Diff));
    }
}
