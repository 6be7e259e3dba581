//! Project enumeration across every group the credential can see.
//!
//! Groups are listed first, then each group's projects with
//! `include_subgroups=true`. A final pass over `GET /projects?membership=true`
//! picks up projects outside any visible group: the user's personal
//! namespace and projects shared with the user directly. The same project
//! can turn up more than once; the walk keeps the first occurrence.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::gitlab::{GitlabClient, GitlabError, GitlabResult, Group, Pages, Project};

/// Full namespace path of a project (e.g., `group/sub/proj`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRef(String);

impl ProjectRef {
    /// Wrap a namespace path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// List every project visible to the client's credential.
///
/// Order is first-seen order across groups, then membership projects;
/// paths are unique.
///
/// # Errors
///
/// Aborts on the first failed request: [`GitlabError::Authorization`] when
/// the key is refused, any other variant for transient failures. Nothing is
/// retried.
#[instrument(skip_all, fields(api = %client.api_root()))]
pub fn enumerate_projects(client: &GitlabClient) -> GitlabResult<Vec<ProjectRef>> {
    let groups = list_groups(client).inspect_err(log_abort)?;
    if groups.is_empty() {
        warn!("no groups found or unable to access groups");
    }

    let mut collected = Collected::default();

    for group in &groups {
        info!(group = %group.name, group_id = group.id, "fetching projects for group");
        collected.extend(client.group_projects(group.id)?)?;
    }

    let from_groups = collected.projects.len();
    collected.extend(client.member_projects()?)?;
    debug!(
        added = collected.projects.len() - from_groups,
        "membership projects outside visible groups"
    );

    info!(
        groups = groups.len(),
        projects = collected.projects.len(),
        "project enumeration complete"
    );
    Ok(collected.projects)
}

/// First-seen, de-duplicated project paths.
#[derive(Default)]
struct Collected {
    seen: HashSet<String>,
    projects: Vec<ProjectRef>,
}

impl Collected {
    fn extend(&mut self, pages: Pages<'_, Project>) -> GitlabResult<()> {
        for page in pages {
            for project in page.inspect_err(log_abort)? {
                if self.seen.insert(project.path_with_namespace.clone()) {
                    self.projects.push(ProjectRef(project.path_with_namespace));
                }
            }
        }
        Ok(())
    }
}

fn list_groups(client: &GitlabClient) -> GitlabResult<Vec<Group>> {
    let mut groups = Vec::new();
    for page in client.groups()? {
        groups.extend(page?);
    }
    Ok(groups)
}

fn log_abort(err: &GitlabError) {
    error!(error = %err, status = ?err.status(), "project enumeration aborted");
}
