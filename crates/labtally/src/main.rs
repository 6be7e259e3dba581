//! labtally CLI
#![deny(unsafe_code)]

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use labtally::{Cli, Commands, commands};
use labtally_core::config::{Config, ConfigLoader, LogLevel};
use tracing::{debug, error};

mod observability;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.color.apply();

    if let Some(ref dir) = cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    }

    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
        anyhow::anyhow!(
            "current directory is not valid UTF-8: {}",
            e.into_path_buf().display()
        )
    })?;

    let explicit_config = cli
        .config
        .as_ref()
        .map(|path| {
            Utf8PathBuf::try_from(path.clone()).map_err(|e| {
                anyhow::anyhow!(
                    "config path is not valid UTF-8: {}",
                    e.into_path_buf().display()
                )
            })
        })
        .transpose()?;

    // Logging comes up before the config is checked so a bad config is
    // still recorded in the log.
    let loaded = load_config(&cwd, explicit_config.as_deref());
    let log_dir = loaded
        .as_ref()
        .ok()
        .and_then(|config| config.log_dir.as_ref())
        .map(|dir| dir.as_std_path().to_path_buf());
    let log_level = loaded
        .as_ref()
        .map_or(LogLevel::default().as_str(), |config| config.log_level.as_str());
    let obs_config = observability::ObservabilityConfig::from_env_with_overrides(log_dir);
    let env_filter = observability::env_filter(cli.quiet, cli.verbose, log_level);
    let guard = observability::init_observability(&obs_config, env_filter)
        .context("failed to initialize logging")?;

    debug!(
        command = ?cli.command,
        verbose = cli.verbose,
        quiet = cli.quiet,
        json = cli.json,
        chdir = ?cli.chdir,
        log_path = ?guard.log_path(),
        "CLI initialized"
    );

    let config =
        loaded.inspect_err(|err| error!(error = %format_args!("{err:#}"), "fatal error"))?;

    let result = match cli.command {
        Commands::Count(args) => commands::count::cmd_count(args, cli.json, &config),
        Commands::Recent(args) => commands::recent::cmd_recent(args, cli.json, &config),
    };
    if let Err(ref err) = result {
        error!(error = %format_args!("{err:#}"), "fatal error");
    }
    result
}

/// Discover and merge config files, with `explicit` (from `--config`) on top.
fn load_config(cwd: &Utf8Path, explicit: Option<&Utf8Path>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new().with_project_search(cwd);
    if let Some(path) = explicit {
        anyhow::ensure!(path.is_file(), "config file not found: {path}");
        loader = loader.with_file(path);
    }
    loader
        .load_or_error()
        .context("failed to load configuration")
}
