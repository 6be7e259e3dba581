//! Flat CSV export of project paths.
//!
//! One path per record, no header row. A field is quoted (RFC 4180) only when
//! it contains a comma, a double quote, CR, or LF; embedded quotes are doubled.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::enumerate::ProjectRef;

/// Errors from reading or writing the project list.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Filesystem failure.
    #[error("failed to access {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A quoted field was never closed.
    #[error("unterminated quoted field in {path}")]
    Unterminated {
        /// File involved.
        path: String,
    },
}

/// Result alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Write `projects` to `path`, one per line, replacing any previous contents.
#[instrument(skip(projects), fields(count = projects.len()))]
pub fn write_projects_csv(path: &Utf8Path, projects: &[ProjectRef]) -> ExportResult<()> {
    let io_err = |source| ExportError::Io {
        path: path.to_string(),
        source,
    };

    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for project in projects {
        writeln!(out, "{}", quote_field(project.as_str())).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    info!(%path, "project paths written");
    Ok(())
}

/// Read a project list written by [`write_projects_csv`].
///
/// Blank records are skipped.
#[instrument]
pub fn read_projects_csv(path: &Utf8Path) -> ExportResult<Vec<ProjectRef>> {
    let contents = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_string(),
        source,
    })?;

    let records = parse_records(&contents).ok_or_else(|| ExportError::Unterminated {
        path: path.to_string(),
    })?;

    let projects: Vec<ProjectRef> = records
        .into_iter()
        .filter(|r| !r.is_empty())
        .map(ProjectRef::new)
        .collect();
    debug!(count = projects.len(), "project paths read");
    Ok(projects)
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split single-column CSV text into records. `None` on an unclosed quote.
fn parse_records(text: &str) -> Option<Vec<String>> {
    let mut records = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (in_quotes, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => in_quotes = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => in_quotes = true,
            (false, '\r') if chars.peek() == Some(&'\n') => {}
            (false, '\n' | '\r') => records.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }

    if in_quotes {
        return None;
    }
    if !field.is_empty() {
        records.push(field);
    }
    Some(records)
}
