//! Command implementations

pub mod count;

pub mod recent;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use labtally_core::{Config, Credentials, GitlabClient, ProjectRef, enumerate_projects};
use std::time::Duration;

/// Validate credentials and build the API client.
///
/// Runs before any network call so a missing key fails fast.
pub fn connect(config: &Config) -> anyhow::Result<(Credentials, GitlabClient)> {
    let credentials = config.credentials().context("invalid configuration")?;
    let base_url = config.gitlab_url().context("invalid configuration")?;
    let client = GitlabClient::new(&base_url, &credentials.api_key, config.per_page())
        .context("failed to build GitLab client")?;
    Ok((credentials, client))
}

/// Enumerate every accessible project behind a spinner on stderr.
pub fn enumerate_with_spinner(client: &GitlabClient) -> anyhow::Result<Vec<ProjectRef>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Listing GitLab groups and projects...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let projects = enumerate_projects(client);
    spinner.finish_and_clear();

    projects.context("failed to enumerate GitLab projects")
}
