//! # Command Line Interface
//!
//! `keyward list|status|rotate` work on rotation plan files; `keyward access`
//! works on access documents. Results go to stdout, logs to stderr.

pub mod access;
pub mod output;
pub mod plans;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::observability::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Credential rotation and declarative access reconciliation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log format (pretty or json); overrides KEYWARD_LOG_FORMAT
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the rotation plans of a configuration
    #[command(
        after_help = "EXAMPLES:\n    keyward list --config plans/\n    keyward list --config plans.json --output json"
    )]
    List {
        /// Plan file or directory of *.json plan files
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,

        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "table", value_parser = ["json", "yaml", "table"])]
        output: String,
    },

    /// Show expiration and pending revocations per plan
    Status {
        /// Plan file or directory of *.json plan files
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,

        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "table", value_parser = ["json", "yaml", "table"])]
        output: String,
    },

    /// Rotate selected plans
    #[command(
        long_about = "Originate a new value for each selected plan, distribute it to every consumer and revoke the previous value according to the plan's revocation policy.\n\nEvery selected plan is attempted; the command fails if any of them failed.",
        after_help = "EXAMPLES:\n    # Rotate everything inside its warning window\n    keyward rotate --all --expiring --config plans/\n\n    # Preview two plans\n    keyward rotate --secrets db-password,api-key --dry-run --config plans/"
    )]
    Rotate {
        /// Rotate every plan
        #[arg(long)]
        all: bool,

        /// Rotate the named plans
        #[arg(long, value_name = "NAMES", value_delimiter = ',', num_args = 1..)]
        secrets: Vec<String>,

        /// Only rotate plans that expire within their warning window
        #[arg(long)]
        expiring: bool,

        /// Log intended changes without touching any backend
        #[arg(long)]
        dry_run: bool,

        /// No operator available; plans with manual steps fail
        #[arg(long)]
        unattended: bool,

        /// Plan file or directory of *.json plan files
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,

        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "table", value_parser = ["json", "yaml", "table"])]
        output: String,
    },

    /// Access document commands
    Access {
        #[command(subcommand)]
        command: access::AccessCommands,
    },
}

/// Parse arguments and run the selected command
pub async fn run_cli(cancel: CancellationToken) -> anyhow::Result<()> {
    run(Cli::parse(), cancel).await
}

/// Run an already parsed command line
pub async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env()?;

    let log_format = cli.log_format.or(runtime.log_format).unwrap_or_default();
    init_logging(log_format, cli.verbose);
    debug!(?runtime, "Loaded runtime configuration");

    match cli.command {
        Commands::List { config, output } => plans::handle_list(&config, &output, &runtime)?,
        Commands::Status { config, output } => {
            plans::handle_status(&config, &output, &runtime).await?
        }
        Commands::Rotate { all, secrets, expiring, dry_run, unattended, config, output } => {
            let args = plans::RotateArgs { all, secrets, expiring, dry_run, unattended };
            plans::handle_rotate(args, &config, &output, &runtime, cancel).await?
        }
        Commands::Access { command } => access::handle_access_command(command).await?,
    }

    Ok(())
}
