//! Core library for labtally.
//!
//! Everything the `labtally` CLI does lives here; the binary only parses
//! arguments, sets up logging, and prints summaries.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading and credential validation
//! - [`gitlab`] - Blocking GitLab REST client with lazy pagination
//! - [`enumerate`] - Project enumeration across groups and subgroups
//! - [`export`] - CSV export of project paths
//! - [`counter`] - External contributor counter invocation
//! - [`contributors`] - Contributors active within a recency window
//! - [`report`] - JSON output of the recent-contributor report
//! - [`error`] - Configuration error types
//!
//! # Quick Start
//!
//! ```no_run
//! use labtally_core::{ConfigLoader, GitlabClient, enumerate_projects};
//!
//! let config = ConfigLoader::new().load_or_error().expect("configuration");
//! let credentials = config.credentials().expect("credentials");
//! let client = GitlabClient::new(
//!     &config.gitlab_url().expect("base url"),
//!     &credentials.api_key,
//!     config.per_page(),
//! )
//! .expect("client");
//!
//! for project in enumerate_projects(&client).expect("projects") {
//!     println!("{project}");
//! }
//! ```
#![deny(unsafe_code)]

pub mod config;

pub mod contributors;

pub mod counter;

pub mod enumerate;

pub mod error;

pub mod export;

pub mod gitlab;

pub mod report;

pub use config::{Config, ConfigLoader, Credentials, LogLevel};

pub use enumerate::{ProjectRef, enumerate_projects};

pub use error::{ConfigError, ConfigResult};

pub use gitlab::{GitlabClient, GitlabError, GitlabResult};
