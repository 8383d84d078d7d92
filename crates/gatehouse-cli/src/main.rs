//! Operator CLI for the gatehouse integration gatekeeper.
//!
//! # Usage
//!
//! ```bash
//! gatehouse <command> [options]
//! ```
//!
//! # Commands
//!
//! - `review` - Review all outstanding contributor branches
//! - `integrate <branch>` - Drive one branch through the integration
//!   state machine
//! - `status` - Report current branch, pending reviews, last integration
//! - `override <name>` - Open an unrestricted emergency workspace
//! - `monitor` - Poll on an interval, re-reviewing and auto-integrating
//!
//! # Exit codes
//!
//! - `0` - success
//! - `1` - validation failure or failed attempt (non-fatal, recorded)
//! - `2` - configuration error (fatal, nothing recorded)

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gatehouse_core::config::ConfigError;
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

/// Exit code for a failed attempt or validation failure.
const EXIT_FAILURE: u8 = 1;
/// Exit code for a fatal configuration error.
const EXIT_CONFIG_ERROR: u8 = 2;

/// Integration gatekeeper for multi-contributor development.
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Integration gatekeeper for multi-contributor development", long_about = None)]
struct Cli {
    /// Path to the gatehouse configuration file.
    #[arg(short, long, default_value = "gatehouse.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Available gatehouse commands.
#[derive(Subcommand)]
enum Commands {
    /// Review all outstanding contributor branches.
    ///
    /// Runs the risk analyzer over every branch matching a configured
    /// contributor prefix that is ahead of the integration branch, and
    /// writes the review ledger.
    Review,

    /// Drive one reviewed branch through the integration state machine.
    ///
    /// Merges into the integration branch, resolves trivial conflicts,
    /// runs the validation gate, and decides whether to advance to the
    /// main line. Failed attempts are rolled back and recorded.
    Integrate {
        /// The branch to integrate.
        branch: String,

        /// Confirm merging the integration branch into the main line
        /// (not needed when automation.auto_push is enabled).
        #[arg(long)]
        confirm_push: bool,

        /// Proceed past a failed validation gate. Honored only when the
        /// configuration enables automation.override_on_validation_failure.
        #[arg(long)]
        override_validation: bool,
    },

    /// Report current branch, pending reviews, and the last integration.
    Status {
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Open an unrestricted emergency workspace.
    ///
    /// Creates an override branch from the integration branch, bypassing
    /// boundary checks. Always recorded in the override log.
    #[command(name = "override")]
    OverrideMode {
        /// Name for the emergency workspace (becomes `override/<name>`).
        name: String,
    },

    /// Poll on an interval, re-reviewing branches and flagging stale
    /// reviews; auto-integrates eligible branches when
    /// automation.auto_approve is enabled.
    Monitor {
        /// Poll interval in seconds.
        #[arg(short, long, default_value_t = 60)]
        interval: u64,

        /// Run a single poll cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG_ERROR)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Review => commands::review(&cli.config),
        Commands::Integrate {
            branch,
            confirm_push,
            override_validation,
        } => commands::integrate(&cli.config, &branch, confirm_push, override_validation),
        Commands::Status { json } => commands::status(&cli.config, json),
        Commands::OverrideMode { name } => commands::override_mode(&cli.config, &name),
        Commands::Monitor { interval, once } => commands::monitor(&cli.config, interval, once),
    }
}
