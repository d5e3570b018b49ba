//! Markdown rendering of a digest.
//!
//! The page lists the summary sentences first, then each top article with a
//! link and a short excerpt of its body.

use crate::error::Result;
use crate::models::{Article, DigestReport};
use crate::outputs::file_stem;
use crate::utils::{ensure_writable_dir, text_excerpts};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

const EXCERPT_LENGTH: usize = 400;
const EXCERPT_PARTS: usize = 2;
const EXCERPT_SEP: &str = " [...] ";

fn article_excerpt(article: &Article) -> String {
    let text = if article.body.trim().is_empty() {
        article.description.trim()
    } else {
        article.body.trim()
    };
    text_excerpts(text, EXCERPT_LENGTH, EXCERPT_PARTS, EXCERPT_SEP)
}

/// Render `report` as a Markdown page.
pub fn report_to_markdown(report: &DigestReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", report.query.trim());
    let _ = writeln!(
        md,
        "_{} to {}, {} matching articles. Generated {}._\n",
        report.date_from,
        report.date_to,
        report.count,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    if !report.top_news.sentences.is_empty() {
        md.push_str("## Summary\n\n");
        for sentence in &report.top_news.sentences {
            let _ = writeln!(md, "- {sentence}");
        }
        md.push('\n');
    }

    if report.top_news.articles.is_empty() {
        md.push_str("No articles found.\n");
        return md;
    }

    md.push_str("## Top stories\n\n");
    for article in &report.top_news.articles {
        let _ = writeln!(md, "### [{}]({})\n", article.title.trim(), article.url);
        if let Some(published) = article.published_at {
            let _ = writeln!(md, "_{}_\n", published.format("%Y-%m-%d %H:%M"));
        }
        let excerpt = article_excerpt(article);
        if !excerpt.is_empty() {
            let _ = writeln!(md, "{excerpt}\n");
        }
    }
    md
}

/// Write the Markdown page for `report` to `{markdown_output_dir}/{stem}.md`.
#[instrument(level = "info", skip_all, fields(markdown_output_dir = %markdown_output_dir))]
pub async fn write_report(report: &DigestReport, markdown_output_dir: &str) -> Result<PathBuf> {
    ensure_writable_dir(markdown_output_dir).await?;
    let path = Path::new(markdown_output_dir).join(format!("{}.md", file_stem(report)));
    fs::write(&path, report_to_markdown(report)).await?;
    info!(path = %path.display(), "Wrote Markdown report");
    Ok(path)
}
