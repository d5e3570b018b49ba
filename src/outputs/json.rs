//! JSON output of a digest.
//!
//! The file holds the serialized [`DigestReport`]: query, window, match count
//! and the top news with its summary sentences.

use crate::error::Result;
use crate::models::DigestReport;
use crate::outputs::file_stem;
use crate::utils::ensure_writable_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`DigestReport`] to `{json_output_dir}/{stem}.json`.
///
/// Creates the directory when needed and returns the path written.
///
/// # Errors
///
/// Fails when the directory is not writable or the file cannot be written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(report: &DigestReport, json_output_dir: &str) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)?;

    if let Err(e) = ensure_writable_dir(json_output_dir).await {
        error!(error = %e, "JSON output directory is not writable");
        return Err(e);
    }

    let path = Path::new(json_output_dir).join(format!("{}.json", file_stem(report)));
    info!(path = %path.display(), "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), articles = report.top_news.articles.len(), "Wrote JSON file");

    Ok(path)
}
