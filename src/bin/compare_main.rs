use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::time::Duration;

use review_trends::chart_series;
use review_trends::data_fetch;
use review_trends::db_connect;
use review_trends::entity_comparison::{self, MAX_COMPARED_SCHOOLS};
use review_trends::env_loader;
use review_trends::excel_writer::{self, TrendExport};
use review_trends::filters::QueryParams;
use review_trends::models::{SchoolId, Topic};

/// Export positive mentions of one topic for up to two schools.
#[derive(Parser, Debug, PartialEq)]
#[command(name = "compare")]
struct CompareArgs {
    /// Topic slug or source key, e.g. `food` or `еда`
    topic: Topic,

    /// One or two school ids
    #[arg(required = true, num_args = 1..)]
    school_ids: Vec<SchoolId>,

    /// First review date to include (YYYY-MM-DD)
    #[arg(long = "from")]
    date_start: Option<NaiveDate>,

    /// Last review date to include (YYYY-MM-DD)
    #[arg(long = "to")]
    date_end: Option<NaiveDate>,
}

impl CompareArgs {
    /// Collapses repeated ids and checks the limits clap cannot express.
    fn validated(mut self) -> Result<Self> {
        let mut unique: Vec<SchoolId> = Vec::with_capacity(self.school_ids.len());
        for id in self.school_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        self.school_ids = unique;

        if self.school_ids.len() > MAX_COMPARED_SCHOOLS {
            return Err(anyhow!(
                "At most {} schools can be compared at once, got {}",
                MAX_COMPARED_SCHOOLS,
                self.school_ids.len()
            ));
        }
        if let (Some(start), Some(end)) = (self.date_start, self.date_end) {
            if start > end {
                return Err(anyhow!("--from {} is after --to {}", start, end));
            }
        }
        Ok(self)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    let args = CompareArgs::parse().validated()?;
    info!(
        "Comparing schools {:?} on '{}' ({:?} to {:?})",
        args.school_ids, args.topic, args.date_start, args.date_end
    );

    let pool = db_connect::connect().await?;
    info!("Database connection pool established.");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Loading reviews for {} schools...", args.school_ids.len()));

    let snapshot =
        data_fetch::fetch_review_snapshot(&pool, &args.school_ids, args.date_start, args.date_end)
            .await;

    spinner.set_message("Loading school names...");
    // Names are cosmetic: without them the columns fall back to placeholders.
    let schools = match data_fetch::fetch_schools(&pool, &QueryParams::default()).await {
        Ok(schools) => schools,
        Err(e) => {
            warn!("School list unavailable, using placeholder names: {:#}", e);
            Vec::new()
        }
    };
    spinner.finish_with_message("Data loaded");

    for notice in &snapshot.notices {
        println!("⚠️  {}", notice);
    }

    let table = entity_comparison::aggregate(&snapshot.schools, args.topic);
    let series = chart_series::school_series_names(table.schools(), &schools);
    let rows = chart_series::comparison_rows(&table, &schools);
    if rows.is_empty() {
        println!("ℹ️  No reviews in the selected period");
    }

    let mentions = series
        .iter()
        .zip(table.schools())
        .map(|(name, id)| (name.clone(), table.total_for(*id) as usize))
        .collect();
    let export = TrendExport {
        title: format!("{} positive mentions", args.topic),
        series,
        rows,
        ratings: None,
        mentions,
    };

    let ids: Vec<String> = args.school_ids.iter().map(|id| id.to_string()).collect();
    let stem = format!(
        "compare_{}_{}_{}",
        args.topic,
        ids.join("_"),
        Local::now().format("%Y%m%d%H%M%S")
    );
    let out_dir = env_loader::output_dir();
    let xlsx_path = out_dir.join(format!("{}.xlsx", stem));
    let json_path = out_dir.join(format!("{}.json", stem));
    excel_writer::write_excel_file(&xlsx_path, &export).await?;
    excel_writer::write_json_rows(&json_path, &export.rows).await?;

    println!("\n🎉 Comparison written to {:?} and {:?}", xlsx_path, json_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Result<CompareArgs> {
        let argv = std::iter::once("compare").chain(raw.iter().copied());
        CompareArgs::try_parse_from(argv)?.validated()
    }

    #[test]
    fn parses_topic_schools_and_range() {
        let parsed = parse(&["food", "12", "40", "--from", "2022-01-01"]).unwrap();
        assert_eq!(parsed.topic, Topic::Food);
        assert_eq!(parsed.school_ids, vec![12, 40]);
        assert_eq!(parsed.date_start, NaiveDate::from_ymd_opt(2022, 1, 1));
        assert_eq!(parsed.date_end, None);
    }

    #[test]
    fn accepts_source_topic_keys() {
        let parsed = parse(&["буллинг", "3"]).unwrap();
        assert_eq!(parsed.topic, Topic::Bullying);
    }

    #[test]
    fn rejects_more_than_two_schools() {
        assert!(parse(&["food", "1", "2", "3"]).is_err());
        // Repeated ids count once.
        assert_eq!(parse(&["food", "1", "1", "2"]).unwrap().school_ids, vec![1, 2]);
    }

    #[test]
    fn rejects_missing_or_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["food"]).is_err());
        assert!(parse(&["weather", "1"]).is_err());
        assert!(parse(&["food", "x"]).is_err());
        assert!(parse(&["food", "1", "--to"]).is_err());
        assert!(parse(&["food", "1", "--from", "2023-05-01", "--to", "2023-01-01"]).is_err());
    }
}
