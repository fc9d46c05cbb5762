use anyhow::{anyhow, Result};
use chrono::Local;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect, Select};
use log::{info, warn};
use std::str::FromStr;

use review_trends::chart_series;
use review_trends::data_fetch;
use review_trends::db_connect;
use review_trends::env_loader;
use review_trends::excel_writer::{self, TrendExport};
use review_trends::filters::{self, FilterCriteria, QueryParams, SportsFlags};
use review_trends::models::{SchoolRecord, Topic};
use review_trends::period::Granularity;
use review_trends::topic_sentiment;

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    info!("Starting interactive topic trend export.");

    let pool = db_connect::connect().await?;
    info!("Database connection pool established.");

    let theme = ColorfulTheme::default();

    // Step 1: School search, optionally narrowed by filters
    let params = prompt_school_query(&theme)?;
    let schools = data_fetch::fetch_schools(&pool, &params).await?;
    if schools.is_empty() {
        return Err(anyhow!("No schools match the given search and filters"));
    }
    println!("🔎 Schools found: {}", schools.len());

    // Step 2: School, topics and interval
    let school = select_school(&theme, &schools)?;
    let topics = select_topics(&theme)?;
    let granularity = select_granularity(&theme, env_loader::default_granularity())?;
    info!(
        "Selected school={} topics={:?} interval={}",
        school.school_id, topics, granularity
    );

    // Step 3: Fetch and aggregate. A failed fetch still produces an (empty) export.
    let reviews = match data_fetch::fetch_school_reviews(&pool, school.school_id, None, None).await {
        Ok(reviews) => reviews,
        Err(e) => {
            warn!("Review fetch failed for school {}: {:#}", school.school_id, e);
            println!("⚠️  Could not load reviews: {}", e);
            Vec::new()
        }
    };

    let table = topic_sentiment::aggregate(&reviews, &topics, granularity);
    let rows = chart_series::topic_rows(&table);
    if rows.is_empty() {
        println!("ℹ️  No data for the selected topics and period");
    }

    let mentions = table
        .topics()
        .iter()
        .map(|topic| {
            (
                topic.slug().to_string(),
                topic_sentiment::count_topic_mentions(&reviews, *topic),
            )
        })
        .collect();
    let export = TrendExport {
        title: format!("{} trend", granularity),
        series: chart_series::topic_series_names(&table),
        rows,
        ratings: Some(chart_series::rating_series(&reviews)),
        mentions,
    };

    // Step 4: Write the workbook and the JSON rows
    let stem = format!(
        "school_{}_topics_{}_{}",
        school.school_id,
        granularity,
        Local::now().format("%Y%m%d%H%M%S")
    );
    let out_dir = env_loader::output_dir();
    let xlsx_path = out_dir.join(format!("{}.xlsx", stem));
    let json_path = out_dir.join(format!("{}.json", stem));
    excel_writer::write_excel_file(&xlsx_path, &export).await?;
    excel_writer::write_json_rows(&json_path, &export.rows).await?;

    println!("\n🎉 Export written to {:?} and {:?}", xlsx_path, json_path);
    Ok(())
}

/// Asks for free-text search and, if wanted, filter criteria. Rejected criteria
/// are reported and asked for again; no query is built from them.
fn prompt_school_query(theme: &ColorfulTheme) -> Result<QueryParams> {
    let search: String = Input::with_theme(theme)
        .with_prompt("Search schools by name (empty for all)")
        .allow_empty(true)
        .interact_text()?;

    let apply = Confirm::with_theme(theme)
        .with_prompt("Apply filters?")
        .default(false)
        .interact()?;
    if !apply {
        return Ok(filters::build(&search, &FilterCriteria::default(), false));
    }

    loop {
        let criteria = prompt_criteria(theme)?;
        match filters::validate(&criteria) {
            Ok(()) => return Ok(filters::build(&search, &criteria, true)),
            Err(rejection) => {
                warn!("Filter criteria rejected: {}", rejection);
                println!("❌ {}", rejection);
            }
        }
    }
}

fn prompt_criteria(theme: &ColorfulTheme) -> Result<FilterCriteria> {
    let year_min = prompt_optional::<i32>(theme, "Year built from")?;
    let year_max = prompt_optional::<i32>(theme, "Year built to")?;
    let rating_min = prompt_optional::<f64>(theme, "Rating from (1-5)")?;
    let rating_max = prompt_optional::<f64>(theme, "Rating to (1-5)")?;

    let facilities = ["Pool", "Stadium", "Sports ground", "Sports complex"];
    let picked = MultiSelect::with_theme(theme)
        .with_prompt("Required facilities (space to toggle)")
        .items(&facilities)
        .interact()?;
    let sports = (!picked.is_empty()).then(|| SportsFlags {
        has_pool: picked.contains(&0),
        has_stadium: picked.contains(&1),
        has_sports_ground: picked.contains(&2),
        has_sports_complex: picked.contains(&3),
    });

    Ok(FilterCriteria {
        year_min,
        year_max,
        rating_min,
        rating_max,
        sports,
    })
}

fn prompt_optional<T: FromStr>(theme: &ColorfulTheme, prompt: &str) -> Result<Option<T>> {
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(format!("{} (empty to skip)", prompt))
            .allow_empty(true)
            .interact_text()?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<T>() {
            Ok(value) => return Ok(Some(value)),
            Err(_) => println!("❌ '{}' is not a valid number", raw),
        }
    }
}

fn select_school<'a>(theme: &ColorfulTheme, schools: &'a [SchoolRecord]) -> Result<&'a SchoolRecord> {
    let options: Vec<String> = schools
        .iter()
        .map(|s| format!("{} (#{})", s.display_name(), s.school_id))
        .collect();
    let selection = Select::with_theme(theme)
        .with_prompt("Choose a school")
        .default(0)
        .items(&options)
        .interact()?;
    let school = &schools[selection];
    println!("✅ Selected school: {}", school.display_name());
    Ok(school)
}

fn select_topics(theme: &ColorfulTheme) -> Result<Vec<Topic>> {
    let options: Vec<&str> = Topic::ALL.iter().map(|t| t.slug()).collect();
    let picked = MultiSelect::with_theme(theme)
        .with_prompt("Topics to chart (space to toggle)")
        .items(&options)
        .interact()?;
    if picked.is_empty() {
        warn!("No topics selected; the export will be empty.");
    }
    Ok(picked.into_iter().map(|idx| Topic::ALL[idx]).collect())
}

fn select_granularity(theme: &ColorfulTheme, default: Granularity) -> Result<Granularity> {
    let options: Vec<&str> = Granularity::ALL.iter().map(|g| g.as_str()).collect();
    let default_idx = Granularity::ALL.iter().position(|g| *g == default).unwrap_or(1);
    let selection = Select::with_theme(theme)
        .with_prompt("Interval")
        .default(default_idx)
        .items(&options)
        .interact()?;
    Ok(Granularity::ALL[selection])
}
