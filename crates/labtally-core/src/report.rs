//! JSON output of the recent-contributor report.

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

use crate::contributors::RecentContributorReport;

/// Errors from writing the report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Filesystem failure.
    #[error("failed to write report to {path}: {source}")]
    Io {
        /// Report file.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Write `report` to `path` as pretty-printed JSON, replacing any previous file.
#[instrument(skip(report), fields(projects = report.len()))]
pub fn write_report(path: &Utf8Path, report: &RecentContributorReport) -> ReportResult<()> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.write_all(b"\n").map_err(io_err)?;
    out.flush().map_err(io_err)?;

    info!(%path, "recent contributor report written");
    Ok(())
}
