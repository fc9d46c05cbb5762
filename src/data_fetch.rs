use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::Value;
use tokio_postgres::types::ToSql;

use crate::db_connect::PgPool;
use crate::entity_comparison::SchoolReviews;
use crate::filters::{keys, QueryParams, QueryValue};
use crate::models::{reviews_from_json, ReviewRecord, SchoolId, SchoolRecord};

const ANALYTICS_SCHEMA: &str = "ca";

/// Column of `ca.get_schools()` each numeric or boolean filter key applies to.
const YEAR_COLUMN: &str = "year_built";
const RATING_COLUMN: &str = "rating";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Review window used when the caller gives no bound.
pub fn default_review_window(
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
) -> (NaiveDate, NaiveDate) {
    let earliest = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN);
    let latest = NaiveDate::from_ymd_opt(2100, 12, 31).unwrap_or(NaiveDate::MAX);
    (date_start.unwrap_or(earliest), date_end.unwrap_or(latest))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Translates query params into a WHERE clause over the `s` alias with numbered
/// placeholders starting at `$1`. Unknown keys are ignored.
pub fn build_school_filter_clause(params: &QueryParams) -> (String, Vec<SqlParam>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<SqlParam> = Vec::new();

    for (key, value) in params.iter() {
        let placeholder = format!("${}", values.len() + 1);
        match (key, value) {
            (keys::SEARCH, QueryValue::Text(text)) => {
                conditions.push(format!(
                    "(COALESCE(s.school_name, '') ILIKE {0} OR COALESCE(s.name_2gis, '') ILIKE {0} OR COALESCE(s.name_ym, '') ILIKE {0})",
                    placeholder
                ));
                values.push(Box::new(escape_like(text)));
            }
            (keys::YEAR_MIN | keys::YEAR_MAX, QueryValue::Integer(year)) => {
                let op = if key == keys::YEAR_MIN { ">=" } else { "<=" };
                conditions.push(format!("s.{}::int4 {} {}", YEAR_COLUMN, op, placeholder));
                values.push(Box::new(i32::try_from(*year).unwrap_or(i32::MAX)));
            }
            (keys::RATING_MIN | keys::RATING_MAX, QueryValue::Number(rating)) => {
                let op = if key == keys::RATING_MIN { ">=" } else { "<=" };
                conditions.push(format!("s.{}::float8 {} {}", RATING_COLUMN, op, placeholder));
                values.push(Box::new(*rating));
            }
            (
                keys::HAS_POOL | keys::HAS_STADIUM | keys::HAS_SPORTS_GROUND | keys::HAS_SPORTS_COMPLEX,
                QueryValue::Flag(true),
            ) => {
                conditions.push(format!("COALESCE(s.{}, false)", key));
            }
            _ => debug!("Ignoring query param {} = {}", key, value),
        }
    }

    if conditions.is_empty() {
        return ("1=1".to_string(), values);
    }
    (conditions.join(" AND "), values)
}

/// Fetches schools matching the built query params.
pub async fn fetch_schools(pool: &PgPool, params: &QueryParams) -> Result<Vec<SchoolRecord>> {
    info!("Fetching schools with {} filter params...", params.len());
    let client = pool.get().await.context("Failed to get DB client for school fetch")?;

    let (where_clause, values) = build_school_filter_clause(params);
    let query = format!(
        r#"
        SELECT row_to_json(s) AS school
        FROM {0}.get_schools() s
        WHERE {1}
        ORDER BY s.school_id
        "#,
        ANALYTICS_SCHEMA, where_clause
    );
    debug!("Fetching schools with query: {}", query);

    let sql_params: Vec<&(dyn ToSql + Sync)> = values
        .iter()
        .map(|v| v.as_ref() as &(dyn ToSql + Sync))
        .collect();
    let rows = client.query(&query, &sql_params).await
        .context("Failed to fetch schools")?;

    let mut schools = Vec::with_capacity(rows.len());
    for row in rows {
        let raw: Value = row.try_get("school").context("School row is not JSON")?;
        match serde_json::from_value::<SchoolRecord>(raw) {
            Ok(school) => schools.push(school),
            Err(e) => warn!("Skipping school row that does not match the expected shape: {}", e),
        }
    }

    info!("Fetched {} schools.", schools.len());
    Ok(schools)
}

/// Fetches one school's reviews in the given window via `ca.get_school_reviews_json`.
pub async fn fetch_school_reviews(
    pool: &PgPool,
    school_id: SchoolId,
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
) -> Result<Vec<ReviewRecord>> {
    let (start, end) = default_review_window(date_start, date_end);
    info!("Fetching reviews for school {} between {} and {}...", school_id, start, end);
    let client = pool.get().await.context("Failed to get DB client for review fetch")?;

    let query = format!("SELECT {}.get_school_reviews_json($1, $2, $3)", ANALYTICS_SCHEMA);
    let row = client
        .query_one(&query, &[&school_id, &start, &end])
        .await
        .with_context(|| format!("Failed to fetch reviews for school {}", school_id))?;

    // NULL means the school has no reviews in the window.
    let payload: Option<Value> = row.try_get(0).context("Review payload is not JSON")?;
    let reviews = payload.map(reviews_from_json).unwrap_or_default();

    info!("Fetched {} reviews for school {}.", reviews.len(), school_id);
    Ok(reviews)
}

/// Reviews for several schools plus user-facing notices for the ones that failed.
#[derive(Debug, Default)]
pub struct ReviewSnapshot {
    pub schools: Vec<SchoolReviews>,
    pub notices: Vec<String>,
}

/// Fetches every school concurrently. A failed fetch degrades to an empty
/// review list for that school and a notice, so aggregation still runs.
pub async fn fetch_review_snapshot(
    pool: &PgPool,
    school_ids: &[SchoolId],
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
) -> ReviewSnapshot {
    let fetches = school_ids
        .iter()
        .map(|id| fetch_school_reviews(pool, *id, date_start, date_end));
    let results = join_all(fetches).await;

    let mut snapshot = ReviewSnapshot::default();
    for (school_id, result) in school_ids.iter().zip(results) {
        let reviews = match result {
            Ok(reviews) => reviews,
            Err(e) => {
                warn!("Review fetch for school {} failed: {:#}", school_id, e);
                snapshot
                    .notices
                    .push(format!("Could not load reviews for school {}: {}", school_id, e));
                Vec::new()
            }
        };
        snapshot.schools.push(SchoolReviews::new(*school_id, reviews));
    }
    snapshot
}
