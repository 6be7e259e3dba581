//! Configuration loading and discovery.
//!
//! This module provides configuration file discovery by:
//! 1. Walking up from the current directory to find project config
//! 2. Loading user config from XDG config directory
//! 3. Merging with sensible defaults
//!
//! # Supported formats
//!
//! - TOML (`.toml`)
//! - YAML (`.yaml`, `.yml`)
//! - JSON (`.json`)
//!
//! # Config file locations (in order of precedence, highest first):
//! - files passed explicitly (`--config`)
//! - `.labtally.<ext>` in current directory or any parent
//! - `labtally.<ext>` in current directory or any parent
//! - `~/.config/labtally/config.<ext>` (user config)
//!
//! # Credentials
//!
//! The two credentials live in their own sections, the same layout the
//! INI-style settings files used:
//!
//! ```toml
//! [api]
//! API_KEY = "glpat-..."
//!
//! [oauth]
//! oauth_token = "..."
//! ```
//!
//! They are optional at parse time so that `Config::default()` stays usable;
//! [`Config::credentials`] validates them once at startup.
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use labtally_core::config::ConfigLoader;
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! let credentials = config.credentials().unwrap();
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Public GitLab instance used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://gitlab.com";

/// Largest page size GitLab accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Default recency window for the `recent` action, in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 90;

/// The configuration for labtally.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for the log file (falls back to the working directory if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// GitLab API access.
    pub api: ApiConfig,
    /// Token handed to the contributor counting executable.
    pub oauth: OauthConfig,
    /// Contributor counter invocation.
    pub counter: CounterConfig,
    /// Recent-contributor report.
    pub recent: RecentConfig,
}

/// GitLab API section.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Personal access token sent as `PRIVATE-TOKEN`.
    #[serde(rename = "API_KEY", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Instance root, without the `/api/v4` suffix.
    pub base_url: String,
    /// Page size for listing endpoints (clamped to `1..=100`).
    pub per_page: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            per_page: MAX_PER_PAGE,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("per_page", &self.per_page)
            .finish()
    }
}

/// OAuth section.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct OauthConfig {
    /// Token passed to the counting executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,
}

impl fmt::Debug for OauthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OauthConfig")
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// How the external contributor counting executable is run.
///
/// Arguments support `{var}` interpolation:
/// - `{projects_file}` - path of the generated CSV
/// - `{projects}` - comma-joined project paths read back from the CSV
/// - `{token}` - the OAuth token
/// - `{gitlab_url}` - the configured base URL
///
/// # Example
///
/// ```toml
/// [counter]
/// executable = "cx.exe"
/// args = ["utils", "contributor-count", "gitlab", "--projects", "{projects}"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CounterConfig {
    /// Program name or path.
    pub executable: String,
    /// Argument template.
    pub args: Vec<String>,
    /// Where the project list is written.
    pub projects_file: Utf8PathBuf,
    /// Where the executable's stdout is written.
    pub output_file: Utf8PathBuf,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            executable: "cx".to_string(),
            args: [
                "utils",
                "contributor-count",
                "gitlab",
                "--projects",
                "{projects}",
                "--token",
                "{token}",
                "--url-gitlab",
                "{gitlab_url}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            projects_file: Utf8PathBuf::from("gitlab_projects.csv"),
            output_file: Utf8PathBuf::from("output.txt"),
        }
    }
}

/// Recent-contributor report settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecentConfig {
    /// Lookback from the moment of execution.
    pub window_days: u32,
    /// Where the JSON report is written.
    pub output_file: Utf8PathBuf,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            output_file: Utf8PathBuf::from("recent_contributors.json"),
        }
    }
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Validated credential pair, read-only for the rest of the run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// GitLab API key.
    pub api_key: String,
    /// OAuth token for the counting executable.
    pub oauth_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials { .. }")
    }
}

impl Config {
    /// Validate and return both credentials.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] when either value is absent or blank.
    pub fn credentials(&self) -> ConfigResult<Credentials> {
        let api_key = non_blank(self.api.api_key.as_deref(), "api.API_KEY")?;
        let oauth_token = non_blank(self.oauth.oauth_token.as_deref(), "oauth.oauth_token")?;
        Ok(Credentials {
            api_key,
            oauth_token,
        })
    }

    /// Parse the configured GitLab base URL.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBaseUrl`] if the value is not an absolute URL.
    pub fn gitlab_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.api.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.api.base_url.clone(),
            source,
        })
    }

    /// Page size clamped to what the API accepts.
    pub fn per_page(&self) -> u32 {
        self.api.per_page.clamp(1, MAX_PER_PAGE)
    }
}

fn non_blank(value: Option<&str>, field: &'static str) -> ConfigResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => {
            tracing::error!(field, "credential missing from configuration");
            Err(ConfigError::MissingCredential { field })
        }
    }
}

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "labtally";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Stop searching when we hit a directory containing this file/dir.
    boundary_marker: Option<String>,
    /// Explicit config files to load.
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            boundary_marker: Some(".git".to_string()),
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/labtally/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Stop walking up at a directory containing `marker`. Default is `.git`.
    pub fn with_boundary_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// Disable boundary marker (search all the way to filesystem root).
    pub fn without_boundary_marker(mut self) -> Self {
        self.boundary_marker = None;
        self
    }

    /// Add an explicit config file to load.
    ///
    /// Files are loaded in order, with later files taking precedence.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    ///
    /// Precedence (highest to lowest):
    /// 1. Explicit files (in order added via `with_file`)
    /// 2. Project config (closest to search root)
    /// 3. User config (`~/.config/labtally/config.<ext>`)
    /// 4. Default values
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<Config> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if self.include_user_config
            && let Some(user_config) = self.find_user_config()
        {
            figment = Self::merge_file(figment, &user_config);
        }

        if let Some(ref root) = self.project_search_root
            && let Some(project_config) = self.find_project_config(root)
        {
            figment = Self::merge_file(figment, &project_config);
        }

        for file in &self.explicit_files {
            figment = Self::merge_file(figment, file);
        }

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            base_url = %config.api.base_url,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration, returning an error if no config file is found.
    ///
    /// The CLI uses this: a run without any settings file cannot carry
    /// credentials, so it fails before touching the network.
    pub fn load_or_error(self) -> ConfigResult<Config> {
        let has_user = self.include_user_config && self.find_user_config().is_some();
        let has_project = self
            .project_search_root
            .as_ref()
            .and_then(|root| self.find_project_config(root))
            .is_some();
        let has_explicit = !self.explicit_files.is_empty();

        if !has_user && !has_project && !has_explicit {
            tracing::error!("no configuration file found");
            return Err(ConfigError::NotFound);
        }

        self.load()
    }

    fn find_project_config(&self, start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for ext in CONFIG_EXTENSIONS {
                let dotfile = dir.join(format!(".{APP_NAME}.{ext}"));
                if dotfile.is_file() {
                    return Some(dotfile);
                }

                let regular = dir.join(format!("{APP_NAME}.{ext}"));
                if regular.is_file() {
                    return Some(regular);
                }
            }

            // The directory holding the marker is the last one searched.
            if let Some(ref marker) = self.boundary_marker
                && dir.join(marker).exists()
            {
                break;
            }

            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        None
    }

    fn find_user_config(&self) -> Option<Utf8PathBuf> {
        let config_dir = user_config_dir()?;
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_dir.join(format!("config.{ext}")))
            .find(|path| path.is_file())
    }

    /// Merge a config file into the figment, detecting format from extension.
    fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
        match path.extension() {
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
            Some("json") => figment.merge(Json::file_exact(path.as_str())),
            _ => figment.merge(Toml::file_exact(path.as_str())),
        }
    }
}

/// Find the project config file path without loading it.
pub fn find_project_config<P: AsRef<Utf8Path>>(start: P) -> Option<Utf8PathBuf> {
    ConfigLoader::new()
        .with_project_search(start.as_ref())
        .without_boundary_marker()
        .find_project_config(start.as_ref())
}

/// Get the user config directory path.
///
/// Returns `~/.config/labtally/` on Linux, `~/Library/Application Support/labtally/`
/// on macOS, and equivalent on other platforms.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("", "", APP_NAME)?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}
