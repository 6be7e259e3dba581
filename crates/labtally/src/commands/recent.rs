//! Recent command: contributors active within the recency window.

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, instrument};

use labtally_core::Config;
use labtally_core::contributors::{
    FetchStatus, ProjectFailure, RecencyWindow, RecentFetch, fetch_recent_contributors,
};
use labtally_core::report::write_report;

/// Arguments for the `recent` subcommand.
#[derive(Args, Debug, Default)]
pub struct RecentArgs {
    // Window length and output path come from the [recent] config section
}

#[derive(Debug, Serialize)]
struct RecentSummary {
    projects: usize,
    projects_with_activity: usize,
    contributors: usize,
    window_days: u32,
    since: String,
    output_file: String,
    failures: Vec<ProjectFailure>,
}

impl RecentSummary {
    fn new(fetch: &RecentFetch, window: &RecencyWindow, output_file: &camino::Utf8Path) -> Self {
        Self {
            projects: fetch.report.len(),
            projects_with_activity: fetch
                .report
                .iter()
                .filter(|(_, records)| !records.is_empty())
                .count(),
            contributors: fetch.report.distinct_contributors(),
            window_days: window.days(),
            since: window.since().format("%Y-%m-%d").to_string(),
            output_file: output_file.to_string(),
            failures: fetch.failures.clone(),
        }
    }
}

/// Build the per-project recent-contributor report and write it as JSON.
///
/// Projects whose commits cannot be read are logged and reported with an
/// empty list; only enumeration failures abort the run.
#[instrument(name = "cmd_recent", skip_all, fields(json_output = global_json))]
pub fn cmd_recent(_args: RecentArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let (_credentials, client) = super::connect(config)?;
    debug!(api_root = %client.api_root(), "executing recent command");

    let projects = super::enumerate_with_spinner(&client)?;
    let window = RecencyWindow::ending_now(config.recent.window_days);
    info!(
        count = projects.len(),
        since = %window.since(),
        "collecting recent contributors"
    );

    let bar = ProgressBar::new(projects.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {wide_msg}")?
            .progress_chars("=> "),
    );
    let fetch = fetch_recent_contributors(&client, &projects, &window, |project, status| {
        if status == FetchStatus::Failed {
            bar.println(format!("  skipped {project}"));
        }
        bar.set_message(project.to_string());
        bar.inc(1);
    });
    bar.finish_and_clear();

    let output_file = &config.recent.output_file;
    write_report(output_file, &fetch.report).context("failed to write contributor report")?;

    let summary = RecentSummary::new(&fetch, &window, output_file);
    if global_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &RecentSummary) {
    println!(
        "{} {} contributors across {} of {} projects since {}",
        "Found".green().bold(),
        summary.contributors,
        summary.projects_with_activity,
        summary.projects,
        summary.since
    );
    println!("Report written to {}", summary.output_file.cyan());

    if !summary.failures.is_empty() {
        println!();
        println!(
            "{} {} projects could not be read:",
            "⚠".yellow(),
            summary.failures.len()
        );
        for failure in &summary.failures {
            let status = failure
                .status
                .map_or_else(String::new, |s| format!(" ({s})"));
            println!("  {}{}", failure.project.as_str().yellow(), status.dimmed());
        }
    }
}
