//! Count command: enumerate projects, export them, run the counter.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, instrument};

use labtally_core::Config;
use labtally_core::counter::{CounterContext, CounterRun, run_counter};
use labtally_core::export::{read_projects_csv, write_projects_csv};

/// Arguments for the `count` subcommand.
#[derive(Args, Debug, Default)]
pub struct CountArgs {
    // Everything comes from the config file; uses global --json flag
}

#[derive(Debug, Serialize)]
struct CountSummary {
    projects: usize,
    projects_file: String,
    output_file: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spawn_error: Option<String>,
    stdout_bytes: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
}

impl CountSummary {
    fn new(projects: usize, projects_file: &camino::Utf8Path, run: CounterRun) -> Self {
        Self {
            projects,
            projects_file: projects_file.to_string(),
            output_file: run.output_file.to_string(),
            success: run.success,
            exit_code: run.exit_code,
            spawn_error: run.spawn_error,
            stdout_bytes: run.stdout_bytes,
            duration_ms: u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX),
            stderr: run.stderr,
        }
    }
}

/// Enumerate all projects, write them to the CSV, and hand the CSV to the
/// contributor counter.
///
/// A counter that exits non-zero, or cannot be started, is reported in the
/// summary and the log; the command still succeeds.
#[instrument(name = "cmd_count", skip_all, fields(json_output = global_json))]
pub fn cmd_count(_args: CountArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let (credentials, client) = super::connect(config)?;
    debug!(api_root = %client.api_root(), "executing count command");

    let projects = super::enumerate_with_spinner(&client)?;
    info!(count = projects.len(), "projects enumerated");

    let projects_file = &config.counter.projects_file;
    write_projects_csv(projects_file, &projects).context("failed to export project list")?;

    // The counter sees exactly what was written to disk.
    let listed = read_projects_csv(projects_file).context("failed to read back project list")?;

    let run = run_counter(
        &config.counter,
        &CounterContext {
            projects_file,
            projects: &listed,
            token: &credentials.oauth_token,
            gitlab_url: &config.api.base_url,
        },
    )
    .context("failed to save contributor counter output")?;

    let summary = CountSummary::new(listed.len(), projects_file, run);

    if global_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &CountSummary) {
    println!(
        "{} {} projects to {}",
        "Exported".green().bold(),
        summary.projects,
        summary.projects_file.cyan()
    );
    if let Some(ref reason) = summary.spawn_error {
        println!("{} {}", "✗".red(), reason.red());
    } else if summary.success {
        println!(
            "{} contributor count written to {} ({} ms)",
            "✓".green(),
            summary.output_file.cyan(),
            summary.duration_ms
        );
    } else {
        let code = summary
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        println!(
            "{} contributor counter exited with {} ({} written)",
            "✗".red(),
            code.red(),
            summary.output_file.cyan()
        );
        if !summary.stderr.is_empty() {
            println!("  {}", summary.stderr.dimmed());
        }
    }
}
