//! Library interface for the `labtally` CLI.
//!
//! Exposes the argument parser and command structure so they can be tested
//! without spawning the binary. The entry point is in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - The two actions: `count` and `recent`
//! - [`commands`] - Command implementations

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Set the global color mode. Call once at startup.
    pub fn apply(self) {
        match self {
            Self::Auto => {}
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RUST_LOG             Log filter (e.g., debug, labtally_core=trace)
    LABTALLY_LOG_PATH    Explicit log file path
    LABTALLY_LOG_DIR     Log directory

CONFIGURATION:
    Settings are read from ./.labtally.toml (or labtally.toml, .yaml, .json),
    searching upward to the nearest .git directory, then from
    ~/.config/labtally/config.toml. [api] API_KEY and [oauth] oauth_token
    are required.
";

/// Command-line interface definition for labtally.
#[derive(Parser)]
#[command(name = "labtally")]
#[command(about = "Enumerate GitLab projects and tally their contributors", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The action to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (merged over discovered files)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail in the log (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available actions.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every project, export it to CSV, and run the contributor counter
    Count(commands::count::CountArgs),

    /// Report contributors active within the recency window, per project
    Recent(commands::recent::RecentArgs),
}

/// Returns the clap command, for help rendering and tests.
pub fn command() -> clap::Command {
    Cli::command()
}
