//! Error types for labtally-core

use thiserror::Error;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// Configuration file not found after searching all locations.
    #[error("no configuration file found")]
    NotFound,

    /// A required credential is absent or blank.
    #[error("missing credential `{field}` in configuration")]
    MissingCredential {
        /// Dotted path of the missing key (e.g., `api.API_KEY`).
        field: &'static str,
    },

    /// The configured GitLab base URL does not parse.
    #[error("invalid GitLab base URL `{url}`: {source}")]
    InvalidBaseUrl {
        /// The offending value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
