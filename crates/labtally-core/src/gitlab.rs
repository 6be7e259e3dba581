//! Blocking GitLab REST client.
//!
//! Every request carries the API key as a `PRIVATE-TOKEN` header. Listing
//! endpoints are consumed through [`Pages`], a lazy iterator that fetches one
//! page per call to `next()`.
//!
//! # Pagination
//!
//! GitLab signals the following page with the `X-Next-Page` header, which is
//! blank on the last page. Some deployments drop the header on large
//! collections, so when it is absent the iterator simply asks for
//! `page + 1`. An empty page always ends the walk.

use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_IN_ERROR: usize = 200;

/// Errors from GitLab API calls.
#[derive(Error, Debug)]
pub enum GitlabError {
    /// The API key was rejected (HTTP 401 or 403).
    #[error("GitLab rejected the API credential (HTTP {status}) at {url}")]
    Authorization {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Any other non-success status.
    #[error("GitLab request to {url} failed with HTTP {status}: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Start of the response body.
        body: String,
    },

    /// Network-level failure (DNS, connect, timeout, ...).
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Response body was not the expected JSON.
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The API key cannot be sent as a header value.
    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidToken,

    /// The base URL cannot host API paths.
    #[error("invalid GitLab base URL: {0}")]
    BaseUrl(String),
}

impl GitlabError {
    /// HTTP status code, when the server answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Authorization { status, .. } | Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the credential itself was refused.
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

/// Result alias for GitLab operations.
pub type GitlabResult<T> = Result<T, GitlabError>;

/// A group as returned by `GET /groups`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Group {
    /// Numeric group id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Namespace path (e.g., `acme/platform`).
    #[serde(default)]
    pub full_path: String,
}

/// A project as returned by the project listing endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Numeric project id.
    #[serde(default)]
    pub id: u64,
    /// Full namespace path (e.g., `acme/platform/api`).
    pub path_with_namespace: String,
}

/// A commit as returned by `GET /projects/:id/repository/commits`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// Author display name.
    pub author_name: String,
    /// Author email.
    #[serde(default)]
    pub author_email: String,
    /// When the commit landed.
    pub committed_date: DateTime<FixedOffset>,
}

/// GitLab API client bound to one instance and one credential.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: Client,
    api_root: Url,
    per_page: u32,
}

impl GitlabClient {
    /// Create a client for `base_url` (instance root, e.g. `https://gitlab.com`).
    ///
    /// # Errors
    ///
    /// Fails if the key is not a valid header value, the URL cannot be a base,
    /// or the TLS backend cannot initialize.
    pub fn new(base_url: &Url, api_key: &str, per_page: u32) -> GitlabResult<Self> {
        let mut token = HeaderValue::from_str(api_key).map_err(|_| GitlabError::InvalidToken)?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("labtally/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_root: api_root(base_url)?,
            per_page,
        })
    }

    /// Root of the v4 API (always ends in `/`).
    pub const fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// All groups visible to the credential.
    pub fn groups(&self) -> GitlabResult<Pages<'_, Group>> {
        Ok(self.pages(self.endpoint(&["groups"])?))
    }

    /// Projects of one group, including those in its subgroups.
    pub fn group_projects(&self, group_id: u64) -> GitlabResult<Pages<'_, Project>> {
        let mut url = self.endpoint(&["groups", &group_id.to_string(), "projects"])?;
        url.query_pairs_mut().append_pair("include_subgroups", "true");
        Ok(self.pages(url))
    }

    /// Projects the credential is a member of, personal namespace included.
    pub fn member_projects(&self) -> GitlabResult<Pages<'_, Project>> {
        let mut url = self.endpoint(&["projects"])?;
        url.query_pairs_mut()
            .append_pair("membership", "true")
            .append_pair("simple", "true");
        Ok(self.pages(url))
    }

    /// Commits of a project (addressed by full path) committed at or after `since`.
    pub fn project_commits(
        &self,
        project_path: &str,
        since: DateTime<Utc>,
    ) -> GitlabResult<Pages<'_, Commit>> {
        let mut url = self.endpoint(&["projects", project_path, "repository", "commits"])?;
        url.query_pairs_mut().append_pair(
            "since",
            &since.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        Ok(self.pages(url))
    }

    fn pages<T>(&self, url: Url) -> Pages<'_, T> {
        Pages {
            client: self,
            url,
            next: Some(1),
            _item: PhantomData,
        }
    }

    /// Append path segments to the API root. Each segment is percent-encoded,
    /// so a project path becomes a single `group%2Fproject` segment.
    fn endpoint(&self, segments: &[&str]) -> GitlabResult<Url> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|()| GitlabError::BaseUrl(self.api_root.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    #[instrument(skip(self, url), fields(url = %url))]
    fn fetch_page<T: DeserializeOwned>(&self, url: &Url, page: u32) -> GitlabResult<Page<T>> {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &self.per_page.to_string());

        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|source| GitlabError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "credential rejected");
            return Err(GitlabError::Authorization {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let body: String = response
                .text()
                .unwrap_or_default()
                .chars()
                .take(MAX_BODY_IN_ERROR)
                .collect();
            warn!(status = status.as_u16(), "request failed");
            return Err(GitlabError::Request {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let next_page = next_page(response.headers(), page);
        let items: Vec<T> = response.json().map_err(|source| GitlabError::Decode {
            url: url.to_string(),
            source,
        })?;
        debug!(count = items.len(), ?next_page, "page fetched");

        Ok(Page { items, next_page })
    }
}

struct Page<T> {
    items: Vec<T>,
    next_page: Option<u32>,
}

/// Lazy page-by-page walk over one listing endpoint.
///
/// Yields each non-empty page. Stops after an empty page, after the last
/// page announced by the server, when the announced page does not move
/// forward, or after the first error.
#[derive(Debug)]
pub struct Pages<'a, T> {
    client: &'a GitlabClient,
    url: Url,
    next: Option<u32>,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for Pages<'_, T> {
    type Item = GitlabResult<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next.take()?;
        match self.client.fetch_page::<T>(&self.url, page) {
            Ok(Page { items, .. }) if items.is_empty() => None,
            Ok(Page { items, next_page }) => {
                self.next = next_page.filter(|&next| next > page);
                if next_page.is_some() && self.next.is_none() {
                    warn!(page, ?next_page, url = %self.url, "next page does not advance, stopping");
                }
                Some(Ok(items))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Resolve the page that follows `current`.
///
/// Present header: its value, or `None` when blank/unparseable.
/// Absent header: `current + 1`.
fn next_page(headers: &HeaderMap, current: u32) -> Option<u32> {
    match headers.get(NEXT_PAGE_HEADER) {
        None => current.checked_add(1),
        Some(value) => value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok()),
    }
}

fn api_root(base_url: &Url) -> GitlabResult<Url> {
    if base_url.cannot_be_a_base() {
        return Err(GitlabError::BaseUrl(base_url.to_string()));
    }
    let mut root = base_url.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join("api/v4/")
        .map_err(|e| GitlabError::BaseUrl(format!("{base_url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> GitlabClient {
        let base = Url::parse(&server.base_url()).unwrap();
        GitlabClient::new(&base, "test-key", 2).unwrap()
    }

    #[test]
    fn api_root_appends_v4() {
        let root = api_root(&Url::parse("https://gitlab.com").unwrap()).unwrap();
        assert_eq!(root.as_str(), "https://gitlab.com/api/v4/");

        let nested = api_root(&Url::parse("https://example.org/gitlab").unwrap()).unwrap();
        assert_eq!(nested.as_str(), "https://example.org/gitlab/api/v4/");
    }

    #[test]
    fn api_root_rejects_non_base_urls() {
        let url = Url::parse("mailto:ops@example.org").unwrap();
        assert!(matches!(api_root(&url), Err(GitlabError::BaseUrl(_))));
    }

    #[test]
    fn project_path_is_one_encoded_segment() {
        let base = Url::parse("https://gitlab.com").unwrap();
        let client = GitlabClient::new(&base, "k", 100).unwrap();
        let url = client
            .endpoint(&["projects", "group/sub/proj-b", "repository", "commits"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.com/api/v4/projects/group%2Fsub%2Fproj-b/repository/commits"
        );
    }

    #[test]
    fn next_page_header_rules() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_page(&headers, 3), Some(4));

        headers.insert(NEXT_PAGE_HEADER, HeaderValue::from_static("7"));
        assert_eq!(next_page(&headers, 3), Some(7));

        headers.insert(NEXT_PAGE_HEADER, HeaderValue::from_static(""));
        assert_eq!(next_page(&headers, 3), None);
    }

    #[test]
    fn pages_follow_next_page_header() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/groups")
                .query_param("page", "1")
                .query_param("per_page", "2")
                .header("private-token", "test-key");
            then.status(200).header("X-Next-Page", "2").json_body(json!([
                {"id": 1, "name": "acme", "full_path": "acme"},
                {"id": 2, "name": "infra", "full_path": "acme/infra"}
            ]));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "2");
            then.status(200)
                .header("X-Next-Page", "")
                .json_body(json!([{"id": 3, "name": "web", "full_path": "web"}]));
        });

        let client = client(&server);
        let pages: Vec<Vec<Group>> = client
            .groups()
            .unwrap()
            .collect::<GitlabResult<_>>()
            .unwrap();

        first.assert();
        second.assert();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1][0].full_path, "web");
    }

    #[test]
    fn pages_without_header_stop_on_empty_page() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "1");
            then.status(200).json_body(json!([{"id": 1}, {"id": 2}]));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "2");
            then.status(200).json_body(json!([{"id": 3}]));
        });
        let third = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "3");
            then.status(200).json_body(json!([]));
        });

        let client = client(&server);
        let ids: Vec<u64> = client
            .groups()
            .unwrap()
            .collect::<GitlabResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .flatten()
            .map(|g| g.id)
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        first.assert();
        second.assert();
        third.assert();
    }

    #[test]
    fn pages_stop_when_next_page_does_not_advance() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "1");
            then.status(200)
                .header("X-Next-Page", "2")
                .json_body(json!([{"id": 1}, {"id": 2}]));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "2");
            then.status(200)
                .header("X-Next-Page", "2")
                .json_body(json!([{"id": 3}]));
        });

        let client = client(&server);
        let pages: Vec<Vec<Group>> = client
            .groups()
            .unwrap()
            .collect::<GitlabResult<_>>()
            .unwrap();

        assert_eq!(pages.len(), 2);
        first.assert_hits(1);
        second.assert_hits(1);
    }

    #[test]
    fn pages_stop_when_next_page_goes_backwards() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups").query_param("page", "1");
            then.status(200)
                .header("X-Next-Page", "1")
                .json_body(json!([{"id": 1}]));
        });

        let client = client(&server);
        assert_eq!(client.groups().unwrap().count(), 1);
        first.assert_hits(1);
    }

    #[test]
    fn member_projects_ask_for_membership() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/projects")
                .query_param("membership", "true");
            then.status(200).header("X-Next-Page", "").json_body(json!([
                {"id": 40, "path_with_namespace": "alice/personal"}
            ]));
        });

        let client = client(&server);
        let projects: Vec<Project> = client
            .member_projects()
            .unwrap()
            .collect::<GitlabResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();

        mock.assert();
        assert_eq!(projects[0].path_with_namespace, "alice/personal");
    }

    #[test]
    fn unauthorized_maps_to_authorization_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups");
            then.status(401).json_body(json!({"message": "401 Unauthorized"}));
        });

        let client = client(&server);
        let mut pages = client.groups().unwrap();
        let err = pages.next().unwrap().unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(err.status(), Some(401));
        // Fused after the first error.
        assert!(pages.next().is_none());
    }

    #[test]
    fn server_error_maps_to_request_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups/9/projects");
            then.status(502).body("bad gateway");
        });

        let client = client(&server);
        let err = client
            .group_projects(9)
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        match err {
            GitlabError::Request { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected Request error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_maps_to_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v4/groups");
            then.status(200).body("<html>maintenance</html>");
        });

        let client = client(&server);
        let err = client.groups().unwrap().next().unwrap().unwrap_err();
        assert!(matches!(err, GitlabError::Decode { .. }));
    }

    #[test]
    fn group_projects_include_subgroups() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/groups/5/projects")
                .query_param("include_subgroups", "true");
            then.status(200).header("X-Next-Page", "").json_body(json!([
                {"id": 10, "path_with_namespace": "acme/api"}
            ]));
        });

        let client = client(&server);
        let projects: Vec<Project> = client
            .group_projects(5)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        mock.assert();
        assert_eq!(projects[0].path_with_namespace, "acme/api");
    }

    #[test]
    fn invalid_token_is_rejected_up_front() {
        let base = Url::parse("https://gitlab.com").unwrap();
        let err = GitlabClient::new(&base, "line\nbreak", 100).unwrap_err();
        assert!(matches!(err, GitlabError::InvalidToken));
    }
}
