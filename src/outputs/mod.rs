//! Output generation modules for JSON and Markdown.
//!
//! # Submodules
//!
//! - [`json`]: Writes a [`DigestReport`](crate::models::DigestReport) to a JSON file
//! - [`markdown`]: Renders the same report as a readable Markdown page
//!
//! # Output Structure
//!
//! Both files are named after the query and the date window:
//!
//! ```text
//! json_output_dir/
//! └── interest-rates_2023-04-03_2023-04-09.json
//!
//! markdown_output_dir/
//! └── interest-rates_2023-04-03_2023-04-09.md
//! ```

use crate::models::DigestReport;
use crate::utils::slugify_title;

pub mod json;
pub mod markdown;

/// File stem shared by every output of `report`.
pub fn file_stem(report: &DigestReport) -> String {
    format!(
        "{}_{}_{}",
        slugify_title(report.query.trim()),
        report.date_from,
        report.date_to
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::fixtures::article;
    use crate::models::{DigestReport, TopNews};
    use chrono::{NaiveDate, TimeZone, Utc};

    pub fn report() -> DigestReport {
        let mut wildfire = article(
            "wildfire",
            "Wildfire near city",
            "Firefighters battle a blaze",
            "Smoke covered the valley. Residents left early. Roads were closed. Crews arrived at noon. Rain is expected.",
        );
        wildfire.published_at = Utc.with_ymd_and_hms(2023, 4, 8, 9, 30, 0).single();
        DigestReport {
            query: "Wildfire Season!".to_string(),
            date_from: NaiveDate::from_ymd_opt(2023, 4, 3).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2023, 4, 9).unwrap(),
            count: 42,
            generated_at: Utc.with_ymd_and_hms(2023, 4, 10, 12, 0, 0).unwrap(),
            top_news: TopNews {
                sentences: vec!["A wildfire blaze is threatening the city.".to_string()],
                articles: vec![wildfire, article("markets", "Stock markets fall", "Investors sold shares", "")],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(&fixtures::report()), "wildfire-season_2023-04-03_2023-04-09");
    }
}
