//! Runs the external contributor counting executable.
//!
//! The executable is opaque: it gets the project list (as a file path and,
//! for tools that want it inline, as a comma-joined list) plus the OAuth
//! token, and whatever it prints on stdout becomes the results file.
//!
//! A non-zero exit, or an executable that cannot be started at all, is
//! reported through [`CounterRun::success`] and logged; neither is an error.
//! The results file is written whenever the executable ran.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::CounterConfig;
use crate::enumerate::ProjectRef;

/// Child environment variable carrying the CSV path.
pub const ENV_PROJECTS_FILE: &str = "LABTALLY_PROJECTS_FILE";

/// Child environment variable carrying the OAuth token.
pub const ENV_OAUTH_TOKEN: &str = "LABTALLY_OAUTH_TOKEN";

const REDACTED: &str = "<redacted>";

/// Errors that stop the counter step.
#[derive(Error, Debug)]
pub enum CounterError {
    /// The results file could not be written.
    #[error("failed to write counter output to {path}: {source}")]
    WriteOutput {
        /// Results file.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for counter operations.
pub type CounterResult<T> = Result<T, CounterError>;

/// Values available for `{var}` interpolation in the argument template.
#[derive(Debug, Clone, Copy)]
pub struct CounterContext<'a> {
    /// Path of the CSV written by the export step.
    pub projects_file: &'a Utf8Path,
    /// Project paths as read back from that file.
    pub projects: &'a [ProjectRef],
    /// OAuth token for the executable.
    pub token: &'a str,
    /// GitLab instance root.
    pub gitlab_url: &'a str,
}

/// Outcome of one counter invocation.
#[derive(Debug, Clone)]
pub struct CounterRun {
    /// Whether the executable exited with status 0.
    pub success: bool,
    /// Exit code, if the process ran and was not killed by a signal.
    pub exit_code: Option<i32>,
    /// Why the executable could not be started, if it never ran.
    pub spawn_error: Option<String>,
    /// Where stdout was written (left untouched when the executable never ran).
    pub output_file: Utf8PathBuf,
    /// Size of the captured stdout.
    pub stdout_bytes: usize,
    /// Captured stderr, trimmed.
    pub stderr: String,
    /// Wall-clock run time.
    pub duration: Duration,
}

/// Run the counter and write its stdout to `config.output_file`.
///
/// Blocks until the executable exits.
///
/// # Errors
///
/// [`CounterError::WriteOutput`] if the results file cannot be written.
#[instrument(skip_all, fields(program = %config.executable))]
pub fn run_counter(config: &CounterConfig, context: &CounterContext<'_>) -> CounterResult<CounterRun> {
    let projects = join_projects(context.projects);
    let args: Vec<String> = config
        .args
        .iter()
        .map(|arg| interpolate(arg, context, &projects, context.token))
        .collect();

    let shown: Vec<String> = config
        .args
        .iter()
        .map(|arg| interpolate(arg, context, &projects, REDACTED))
        .collect();
    info!(args = ?shown, projects = context.projects.len(), "running contributor counter");

    let start = Instant::now();
    let output = match Command::new(&config.executable)
        .args(&args)
        .env(ENV_PROJECTS_FILE, context.projects_file.as_str())
        .env(ENV_OAUTH_TOKEN, context.token)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(err) => {
            error!(error = %err, "failed to start contributor counter");
            return Ok(CounterRun {
                success: false,
                exit_code: None,
                spawn_error: Some(format!("failed to run `{}`: {err}", config.executable)),
                output_file: config.output_file.clone(),
                stdout_bytes: 0,
                stderr: String::new(),
                duration: start.elapsed(),
            });
        }
    };
    let duration = start.elapsed();

    std::fs::write(&config.output_file, &output.stdout).map_err(|source| {
        CounterError::WriteOutput {
            path: config.output_file.clone(),
            source,
        }
    })?;
    debug!(path = %config.output_file, bytes = output.stdout.len(), "counter output written");

    let success = output.status.success();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if success {
        info!(
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "contributor count successful"
        );
    } else {
        error!(
            exit_code = ?output.status.code(),
            %stderr,
            "contributor counter returned an error"
        );
    }

    Ok(CounterRun {
        success,
        exit_code: output.status.code(),
        spawn_error: None,
        output_file: config.output_file.clone(),
        stdout_bytes: output.stdout.len(),
        stderr,
        duration,
    })
}

/// Replace `{var}` placeholders in one pass over the template, so
/// substituted values are never expanded again. Unknown placeholders are
/// left alone.
fn interpolate(arg: &str, context: &CounterContext<'_>, projects: &str, token: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let substitution = tail.find('}').and_then(|close| {
            let value = match &tail[1..close] {
                "projects_file" => context.projects_file.as_str(),
                "projects" => projects,
                "gitlab_url" => context.gitlab_url,
                "token" => token,
                _ => return None,
            };
            Some((value, close))
        });
        match substitution {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn join_projects(projects: &[ProjectRef]) -> String {
    projects
        .iter()
        .map(ProjectRef::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
