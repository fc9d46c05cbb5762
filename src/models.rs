use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::period::parse_review_date;

/// School identifier as stored in the `ca` schema (`int4`).
pub type SchoolId = i32;

/// The fixed set of topics the upstream classifier tags reviews with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Repairs,
    Teachers,
    Food,
    Administration,
    Bullying,
    Infrastructure,
    Security,
    Cleanliness,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::Repairs,
        Topic::Teachers,
        Topic::Food,
        Topic::Administration,
        Topic::Bullying,
        Topic::Infrastructure,
        Topic::Security,
        Topic::Cleanliness,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Topic::Repairs => "repairs",
            Topic::Teachers => "teachers",
            Topic::Food => "food",
            Topic::Administration => "administration",
            Topic::Bullying => "bullying",
            Topic::Infrastructure => "infrastructure",
            Topic::Security => "security",
            Topic::Cleanliness => "cleanliness",
        }
    }

    /// Key used by the classifier output stored in the database.
    pub fn source_key(self) -> &'static str {
        match self {
            Topic::Repairs => "ремонт",
            Topic::Teachers => "учителя",
            Topic::Food => "еда",
            Topic::Administration => "администрация",
            Topic::Bullying => "буллинг",
            Topic::Infrastructure => "инфраструктура",
            Topic::Security => "охрана",
            Topic::Cleanliness => "уборка",
        }
    }

    /// Resolves either the English slug or the source key. Unknown keys yield `None`.
    pub fn from_key(key: &str) -> Option<Topic> {
        let key = key.trim().to_lowercase();
        Topic::ALL
            .into_iter()
            .find(|topic| topic.slug() == key || topic.source_key() == key)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Topic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::from_key(s).ok_or_else(|| {
            let known: Vec<&str> = Topic::ALL.iter().map(|t| t.slug()).collect();
            anyhow::anyhow!("Unknown topic '{}', expected one of: {}", s, known.join(", "))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Pos,
    Neg,
    Neutral,
}

impl Sentiment {
    /// Only the exact labels count. Anything else is "no signal".
    pub fn from_label(label: &str) -> Option<Sentiment> {
        match label {
            "pos" => Some(Sentiment::Pos),
            "neg" => Some(Sentiment::Neg),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// The `topics` column as it comes off the wire: either a JSON object or a
/// string holding one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TopicsPayload {
    Object(Map<String, Value>),
    Serialized(String),
    Other(Value),
}

impl Default for TopicsPayload {
    fn default() -> Self {
        TopicsPayload::Other(Value::Null)
    }
}

/// Normalized per-review topic labels. Only known topics with a recognized
/// sentiment are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicSentiments(BTreeMap<Topic, Sentiment>);

impl TopicSentiments {
    pub fn get(&self, topic: Topic) -> Option<Sentiment> {
        self.0.get(&topic).copied()
    }

    pub fn insert(&mut self, topic: Topic, sentiment: Sentiment) {
        self.0.insert(topic, sentiment);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Topic, Sentiment)> + '_ {
        self.0.iter().map(|(topic, sentiment)| (*topic, *sentiment))
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let mut sentiments = TopicSentiments::default();
        for (key, value) in object {
            let Some(topic) = Topic::from_key(key) else {
                continue;
            };
            if let Some(sentiment) = value.as_str().and_then(Sentiment::from_label) {
                sentiments.insert(topic, sentiment);
            }
        }
        sentiments
    }
}

impl From<TopicsPayload> for TopicSentiments {
    fn from(payload: TopicsPayload) -> Self {
        match payload {
            TopicsPayload::Object(object) => TopicSentiments::from_object(&object),
            TopicsPayload::Serialized(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(object) => TopicSentiments::from_object(&object),
                Err(e) => {
                    debug!("Unparseable topics payload treated as empty: {}", e);
                    TopicSentiments::default()
                }
            },
            TopicsPayload::Other(_) => TopicSentiments::default(),
        }
    }
}

/// Review as returned by `ca.get_school_reviews_json`. Older payloads use the
/// short names (`id`, `date`, `review_topic`); both may appear in one object.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub review_id: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub review_date: Option<Value>,
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub review_rating: Option<Value>,
    #[serde(default)]
    pub topics: Option<TopicsPayload>,
    #[serde(default)]
    pub review_topic: Option<TopicsPayload>,
}

/// A review after ingestion. Built once from [`RawReview`]; aggregation never
/// looks at the wire shape again.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawReview")]
pub struct ReviewRecord {
    pub id: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub topics: TopicSentiments,
}

impl ReviewRecord {
    pub fn new(date: NaiveDate) -> Self {
        ReviewRecord {
            date: Some(date),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_topic(mut self, topic: Topic, sentiment: Sentiment) -> Self {
        self.topics.insert(topic, sentiment);
        self
    }
}

impl From<RawReview> for ReviewRecord {
    fn from(raw: RawReview) -> Self {
        // Primary name wins; the short name only fills in for a missing or null value.
        let id = match raw.review_id.or(raw.id) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let date = raw
            .review_date
            .or(raw.date)
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_review_date);
        let rating = match raw.review_rating {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|r| r.is_finite());

        ReviewRecord {
            id,
            date,
            rating,
            topics: raw.topics.or(raw.review_topic).unwrap_or_default().into(),
        }
    }
}

/// Converts the JSON array produced by the database into review records.
/// Elements that are not review objects are skipped with a warning.
pub fn reviews_from_json(value: Value) -> Vec<ReviewRecord> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!("Expected a JSON array of reviews, got: {}", other);
            return Vec::new();
        }
    };

    let mut reviews = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<ReviewRecord>(item) {
            Ok(review) => reviews.push(review),
            Err(e) => warn!("Skipping malformed review entry: {}", e),
        }
    }
    reviews
}

/// School row from `ca.get_schools()`. Columns not needed here are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub school_id: SchoolId,
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub name_2gis: Option<String>,
    #[serde(default)]
    pub name_ym: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SchoolRecord {
    pub fn placeholder_name(school_id: SchoolId) -> String {
        format!("School {}", school_id)
    }

    pub fn display_name(&self) -> String {
        [&self.school_name, &self.name_2gis, &self.name_ym]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| SchoolRecord::placeholder_name(self.school_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_resolves_slug_and_source_key() {
        assert_eq!(Topic::from_key("food"), Some(Topic::Food));
        assert_eq!(Topic::from_key(" Food "), Some(Topic::Food));
        assert_eq!(Topic::from_key("еда"), Some(Topic::Food));
        assert_eq!(Topic::from_key("буллинг"), Some(Topic::Bullying));
        assert_eq!(Topic::from_key("parking"), None);
        assert!("weather".parse::<Topic>().is_err());
    }

    #[test]
    fn topics_object_keeps_known_topics_with_recognized_labels() {
        let review: ReviewRecord = serde_json::from_value(json!({
            "review_id": 7,
            "review_date": "2023-01-05",
            "topics": { "еда": "pos", "teachers": "neg", "parking": "pos", "уборка": "mixed" }
        }))
        .unwrap();

        assert_eq!(review.id.as_deref(), Some("7"));
        assert_eq!(review.topics.len(), 2);
        assert_eq!(review.topics.get(Topic::Food), Some(Sentiment::Pos));
        assert_eq!(review.topics.get(Topic::Teachers), Some(Sentiment::Neg));
        assert_eq!(review.topics.get(Topic::Cleanliness), None);
    }

    #[test]
    fn serialized_topics_are_parsed_once() {
        let review: ReviewRecord = serde_json::from_value(json!({
            "review_date": "2023-01-05",
            "review_topic": "{\"food\": \"neutral\"}"
        }))
        .unwrap();
        assert_eq!(review.topics.get(Topic::Food), Some(Sentiment::Neutral));
    }

    #[test]
    fn malformed_topics_become_empty_but_keep_the_date() {
        let review: ReviewRecord = serde_json::from_value(json!({
            "review_date": "2023-01-05",
            "topics": "{not json"
        }))
        .unwrap();
        assert!(review.topics.is_empty());
        assert_eq!(review.date, NaiveDate::from_ymd_opt(2023, 1, 5));

        let review: ReviewRecord = serde_json::from_value(json!({
            "review_date": "2023-01-05",
            "topics": ["food"]
        }))
        .unwrap();
        assert!(review.topics.is_empty());
    }

    #[test]
    fn rating_accepts_numbers_and_numeric_strings() {
        let ratings: Vec<Option<f64>> = [json!(4), json!("3.5"), json!(""), json!(null), json!("abc")]
            .into_iter()
            .map(|rating| {
                serde_json::from_value::<ReviewRecord>(json!({ "review_rating": rating }))
                    .unwrap()
                    .rating
            })
            .collect();
        assert_eq!(ratings, vec![Some(4.0), Some(3.5), None, None, None]);
    }

    #[test]
    fn unparseable_date_is_none() {
        let review: ReviewRecord =
            serde_json::from_value(json!({ "review_date": "yesterday", "topics": {} })).unwrap();
        assert_eq!(review.date, None);
        let review: ReviewRecord = serde_json::from_value(json!({ "date": 20230105 })).unwrap();
        assert_eq!(review.date, None);
    }

    #[test]
    fn long_and_short_field_names_can_coexist() {
        let reviews = reviews_from_json(json!([
            { "review_date": "2023-01-05", "date": null, "topics": { "food": "pos" } },
            { "review_date": "2023-01-06", "topics": null, "review_topic": { "food": "neg" } },
            { "review_date": null, "date": "2023-01-07", "review_id": null, "id": 9 },
            { "review_date": "2023-01-08", "date": "1999-12-31", "review_id": "a", "id": "b",
              "topics": { "food": "neutral" }, "review_topic": { "food": "pos" } }
        ]));
        assert_eq!(reviews.len(), 4);

        assert_eq!(reviews[0].date, NaiveDate::from_ymd_opt(2023, 1, 5));
        assert_eq!(reviews[0].topics.get(Topic::Food), Some(Sentiment::Pos));

        assert_eq!(reviews[1].topics.get(Topic::Food), Some(Sentiment::Neg));

        assert_eq!(reviews[2].date, NaiveDate::from_ymd_opt(2023, 1, 7));
        assert_eq!(reviews[2].id.as_deref(), Some("9"));

        assert_eq!(reviews[3].date, NaiveDate::from_ymd_opt(2023, 1, 8));
        assert_eq!(reviews[3].id.as_deref(), Some("a"));
        assert_eq!(reviews[3].topics.get(Topic::Food), Some(Sentiment::Neutral));
    }

    #[test]
    fn reviews_from_json_skips_non_objects() {
        let reviews = reviews_from_json(json!([
            { "review_date": "2023-01-05", "topics": { "food": "pos" } },
            42,
            { "review_date": "2023-02-01" }
        ]));
        assert_eq!(reviews.len(), 2);
        assert!(reviews_from_json(Value::Null).is_empty());
    }

    #[test]
    fn display_name_falls_back_through_sources() {
        let school: SchoolRecord = serde_json::from_value(json!({
            "school_id": 12,
            "school_name": "  ",
            "name_2gis": null,
            "name_ym": "Lyceum 2",
            "has_pool": true
        }))
        .unwrap();
        assert_eq!(school.display_name(), "Lyceum 2");
        assert_eq!(school.extra.get("has_pool"), Some(&json!(true)));

        let unnamed: SchoolRecord = serde_json::from_value(json!({ "school_id": 3 })).unwrap();
        assert_eq!(unnamed.display_name(), "School 3");
    }
}
