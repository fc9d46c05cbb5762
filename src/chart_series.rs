use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;

use crate::entity_comparison::EntityComparisonTable;
use crate::models::{ReviewRecord, SchoolId, SchoolRecord};
use crate::period::format_label;
use crate::topic_sentiment::TopicSentimentTable;

/// A single chart cell: a sentiment score in topic mode, a mention count in comparison mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesValue {
    Score(f64),
    Count(u32),
}

impl Serialize for SeriesValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SeriesValue::Score(score) => serializer.serialize_f64(*score),
            SeriesValue::Count(count) => serializer.serialize_u32(*count),
        }
    }
}

/// One x-axis position with an explicit entry for every requested series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub axis_key: String,
    pub axis_label: String,
    pub values: Vec<(String, Option<SeriesValue>)>,
}

impl SeriesRow {
    /// `None` both for a gap and for an unknown series; use [`SeriesRow::has_series`] to tell them apart.
    pub fn value(&self, series: &str) -> Option<SeriesValue> {
        self.values
            .iter()
            .find(|(name, _)| name == series)
            .and_then(|(_, value)| *value)
    }

    pub fn has_series(&self, series: &str) -> bool {
        self.values.iter().any(|(name, _)| name == series)
    }
}

const AXIS_KEY_FIELD: &str = "axisKey";
const AXIS_LABEL_FIELD: &str = "axisLabel";

// Flat object: { "axisKey": .., "axisLabel": .., "<series>": number|null, .. }
impl Serialize for SeriesRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry(AXIS_KEY_FIELD, &self.axis_key)?;
        map.serialize_entry(AXIS_LABEL_FIELD, &self.axis_label)?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Reshapes per-axis cells into rows, pairing each cell with its series name.
/// Shared by both aggregation modes; no counting happens here.
fn build_rows<I>(series: &[String], axis: I) -> Vec<SeriesRow>
where
    I: IntoIterator<Item = (String, String, Vec<Option<SeriesValue>>)>,
{
    if series.is_empty() {
        return Vec::new();
    }
    let mut rows: Vec<SeriesRow> = axis
        .into_iter()
        .map(|(axis_key, axis_label, cells)| SeriesRow {
            axis_key,
            axis_label,
            values: series.iter().cloned().zip(cells).collect(),
        })
        .collect();
    rows.sort_by(|a, b| a.axis_key.cmp(&b.axis_key));
    rows
}

/// Series names for the topic trend: the topic slugs in selection order.
pub fn topic_series_names(table: &TopicSentimentTable) -> Vec<String> {
    table.topics().iter().map(|topic| topic.slug().to_string()).collect()
}

/// One row per period; a cell is `null` when the period had no mention of that topic.
pub fn topic_rows(table: &TopicSentimentTable) -> Vec<SeriesRow> {
    let granularity = table.granularity();
    build_rows(
        &topic_series_names(table),
        table.iter().map(|(period, counters)| {
            let cells: Vec<Option<SeriesValue>> = counters
                .iter()
                .map(|counter| counter.score().map(SeriesValue::Score))
                .collect();
            (period.to_string(), format_label(period, granularity), cells)
        }),
    )
}

/// Column headers for the comparison chart. Missing school records fall back to
/// a placeholder. A name shared by two schools, or equal to one of the axis
/// fields of a serialized row, gets the school id appended.
pub fn school_series_names(school_ids: &[SchoolId], schools: &[SchoolRecord]) -> Vec<String> {
    let by_id: HashMap<SchoolId, &SchoolRecord> =
        schools.iter().map(|school| (school.school_id, school)).collect();
    let names: Vec<String> = school_ids
        .iter()
        .map(|id| match by_id.get(id) {
            Some(school) => school.display_name(),
            None => SchoolRecord::placeholder_name(*id),
        })
        .collect();

    names
        .iter()
        .zip(school_ids)
        .map(|(name, id)| {
            let reserved = name == AXIS_KEY_FIELD || name == AXIS_LABEL_FIELD;
            if reserved || names.iter().filter(|other| *other == name).count() > 1 {
                format!("{} (#{})", name, id)
            } else {
                name.clone()
            }
        })
        .collect()
}

/// One row per review date with a zero-filled count for every school.
pub fn comparison_rows(table: &EntityComparisonTable, schools: &[SchoolRecord]) -> Vec<SeriesRow> {
    build_rows(
        &school_series_names(table.schools(), schools),
        table.iter().map(|(date, counts)| {
            let key = date.format("%Y-%m-%d").to_string();
            let cells: Vec<Option<SeriesValue>> = counts
                .iter()
                .map(|count| Some(SeriesValue::Count(*count)))
                .collect();
            (key.clone(), key, cells)
        }),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingPoint {
    pub date: NaiveDate,
    pub rating: f64,
    pub review_id: Option<String>,
}

/// Per-review rating timeline: dated reviews with a rating in `[1, 5]`, by date.
pub fn rating_series(reviews: &[ReviewRecord]) -> Vec<RatingPoint> {
    let mut points: Vec<RatingPoint> = reviews
        .iter()
        .filter_map(|review| {
            let date = review.date?;
            let rating = review.rating.filter(|r| (1.0..=5.0).contains(r))?;
            Some(RatingPoint {
                date,
                rating,
                review_id: review.id.clone(),
            })
        })
        .collect();
    points.sort_by_key(|point| point.date);
    points
}
