//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use veritas_ops::Mode;

/// Veritas pay-per-query server.
#[derive(Parser, Debug)]
#[command(name = "veritas-server")]
#[command(version)]
#[command(about = "Pay-per-query answer server with token charge and burn")]
#[command(
    long_about = "Answers queries with a language model, charging each query in application tokens \
                  and burning 1% of every charge.\n\nRun 'veritas-server init' to write a config file."
)]
pub struct Cli {
    /// Subcommand to execute; defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "VERITAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Override the configured bind address.
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Load and validate the configuration, then exit.
    CheckConfig,

    /// Estimate the charge for a query without touching the ledger.
    Quote {
        /// Query text.
        input: String,

        /// Answer mode.
        #[arg(short, long, default_value = "truth")]
        mode: ModeArg,

        /// Model to price; defaults to the configured model.
        #[arg(long)]
        model: Option<String>,

        /// Print the estimate as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Mode argument for clap.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ModeArg {
    #[default]
    Truth,
    Bias,
    Steelman,
    Audit,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Truth => Mode::Truth,
            ModeArg::Bias => Mode::Bias,
            ModeArg::Steelman => Mode::Steelman,
            ModeArg::Audit => Mode::Audit,
        }
    }
}
