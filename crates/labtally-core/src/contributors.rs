//! Contributors active within a recency window, per project.
//!
//! Activity comes from each project's commit listing, requested with
//! `since = now - window` and filtered again locally. Commits are grouped by
//! author email; the newest commit supplies the display name and the
//! `last_activity` timestamp.
//!
//! A failing project never aborts the run: it is logged and recorded with an
//! empty contributor list.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::enumerate::ProjectRef;
use crate::gitlab::{Commit, GitlabClient, GitlabResult};

/// One contributor's activity inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorRecord {
    /// Author name from the newest commit.
    pub name: String,
    /// Author email (grouping key).
    pub email: String,
    /// Newest commit timestamp.
    pub last_activity: DateTime<Utc>,
    /// Commits inside the window.
    pub commits: u32,
}

/// Trailing lookback from a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    now: DateTime<Utc>,
    days: u32,
}

impl RecencyWindow {
    /// Window of `days` ending at `now`.
    pub const fn new(now: DateTime<Utc>, days: u32) -> Self {
        Self { now, days }
    }

    /// Window of `days` ending at the current instant.
    pub fn ending_now(days: u32) -> Self {
        Self::new(Utc::now(), days)
    }

    /// Start of the window, never earlier than the Unix epoch.
    pub fn since(&self) -> DateTime<Utc> {
        self.now
            .checked_sub_signed(Duration::days(i64::from(self.days)))
            .map_or(DateTime::UNIX_EPOCH, |since| since.max(DateTime::UNIX_EPOCH))
    }

    /// End of the window.
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Length in days.
    pub const fn days(&self) -> u32 {
        self.days
    }

    /// `since <= ts <= now`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since() <= ts && ts <= self.now
    }
}

/// Project path → contributors, serialized as a flat JSON object.
///
/// Every fetched project has a key, even when its list is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentContributorReport {
    projects: BTreeMap<ProjectRef, Vec<ContributorRecord>>,
}

impl RecentContributorReport {
    /// Number of projects in the report.
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the report has no projects.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Contributors recorded for `project`.
    pub fn get(&self, project: &ProjectRef) -> Option<&[ContributorRecord]> {
        self.projects.get(project).map(Vec::as_slice)
    }

    /// Iterate in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProjectRef, &[ContributorRecord])> {
        self.projects.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Distinct contributor emails across all projects.
    pub fn distinct_contributors(&self) -> usize {
        let mut emails: Vec<String> = self
            .projects
            .values()
            .flatten()
            .map(|c| c.email.to_lowercase())
            .collect();
        emails.sort_unstable();
        emails.dedup();
        emails.len()
    }

    fn insert(&mut self, project: ProjectRef, contributors: Vec<ContributorRecord>) {
        self.projects.insert(project, contributors);
    }
}

/// A project whose contributor fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectFailure {
    /// Project path.
    pub project: ProjectRef,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Error message.
    pub message: String,
}

/// Result of a whole fetch pass.
#[derive(Debug, Clone, Default)]
pub struct RecentFetch {
    /// One entry per requested project.
    pub report: RecentContributorReport,
    /// Projects recorded with an empty list because their fetch failed.
    pub failures: Vec<ProjectFailure>,
}

/// Per-project progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Fetched; number of qualifying contributors.
    Fetched(usize),
    /// Fetch failed; recorded as empty.
    Failed,
}

/// Fetch recent contributors for every project.
///
/// `on_project` is called once per project, after it is processed, in input
/// order.
#[instrument(skip_all, fields(projects = projects.len(), days = window.days()))]
pub fn fetch_recent_contributors(
    client: &GitlabClient,
    projects: &[ProjectRef],
    window: &RecencyWindow,
    mut on_project: impl FnMut(&ProjectRef, FetchStatus),
) -> RecentFetch {
    let mut fetch = RecentFetch::default();

    for project in projects {
        match project_contributors(client, project, window) {
            Ok(contributors) => {
                debug!(%project, count = contributors.len(), "contributors fetched");
                on_project(project, FetchStatus::Fetched(contributors.len()));
                fetch.report.insert(project.clone(), contributors);
            }
            Err(err) => {
                if err.is_authorization() {
                    warn!(%project, status = ?err.status(), error = %err, "contributors not accessible");
                } else {
                    error!(%project, status = ?err.status(), error = %err, "contributor fetch failed");
                }
                on_project(project, FetchStatus::Failed);
                fetch.failures.push(ProjectFailure {
                    project: project.clone(),
                    status: err.status(),
                    message: err.to_string(),
                });
                fetch.report.insert(project.clone(), Vec::new());
            }
        }
    }

    info!(
        projects = fetch.report.len(),
        failures = fetch.failures.len(),
        contributors = fetch.report.distinct_contributors(),
        "recent contributor fetch complete"
    );
    fetch
}

fn project_contributors(
    client: &GitlabClient,
    project: &ProjectRef,
    window: &RecencyWindow,
) -> GitlabResult<Vec<ContributorRecord>> {
    let mut commits = Vec::new();
    for page in client.project_commits(project.as_str(), window.since())? {
        commits.extend(page?);
    }
    Ok(aggregate(commits, window))
}

/// Group in-window commits by author, newest activity first.
pub fn aggregate(
    commits: impl IntoIterator<Item = Commit>,
    window: &RecencyWindow,
) -> Vec<ContributorRecord> {
    let mut by_author: HashMap<String, ContributorRecord> = HashMap::new();

    for commit in commits {
        let ts = commit.committed_date.with_timezone(&Utc);
        if !window.contains(ts) {
            continue;
        }
        let key = if commit.author_email.is_empty() {
            commit.author_name.to_lowercase()
        } else {
            commit.author_email.to_lowercase()
        };

        by_author
            .entry(key)
            .and_modify(|record| {
                record.commits += 1;
                if ts > record.last_activity {
                    record.last_activity = ts;
                    record.name.clone_from(&commit.author_name);
                }
            })
            .or_insert_with(|| ContributorRecord {
                name: commit.author_name.clone(),
                email: commit.author_email.clone(),
                last_activity: ts,
                commits: 1,
            });
    }

    let mut records: Vec<ContributorRecord> = by_author.into_values().collect();
    records.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.name.cmp(&b.name))
    });
    records
}
