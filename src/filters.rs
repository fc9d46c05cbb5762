use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 5.0;

/// Query keys understood by the school search endpoint.
pub mod keys {
    pub const SEARCH: &str = "search";
    pub const YEAR_MIN: &str = "year_min";
    pub const YEAR_MAX: &str = "year_max";
    pub const RATING_MIN: &str = "rating_min";
    pub const RATING_MAX: &str = "rating_max";
    pub const HAS_POOL: &str = "has_pool";
    pub const HAS_STADIUM: &str = "has_stadium";
    pub const HAS_SPORTS_GROUND: &str = "has_sports_ground";
    pub const HAS_SPORTS_COMPLEX: &str = "has_sports_complex";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportsFlags {
    #[serde(default)]
    pub has_pool: bool,
    #[serde(default)]
    pub has_stadium: bool,
    #[serde(default)]
    pub has_sports_ground: bool,
    #[serde(default)]
    pub has_sports_complex: bool,
}

impl SportsFlags {
    fn enabled(&self) -> impl Iterator<Item = &'static str> {
        [
            (keys::HAS_POOL, self.has_pool),
            (keys::HAS_STADIUM, self.has_stadium),
            (keys::HAS_SPORTS_GROUND, self.has_sports_ground),
            (keys::HAS_SPORTS_COMPLEX, self.has_sports_complex),
        ]
        .into_iter()
        .filter_map(|(key, on)| on.then_some(key))
    }
}

/// Filter state as entered by the user. Every bound is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub year_min: Option<i32>,
    #[serde(default)]
    pub year_max: Option<i32>,
    #[serde(default)]
    pub rating_min: Option<f64>,
    #[serde(default)]
    pub rating_max: Option<f64>,
    #[serde(default)]
    pub sports: Option<SportsFlags>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterRejection {
    #[error("Year built: start value {min} cannot be greater than end value {max}")]
    YearRangeInverted { min: i32, max: i32 },
    #[error("Rating: minimum {min} cannot be greater than maximum {max}")]
    RatingRangeInverted { min: f64, max: f64 },
    #[error("Rating must be between 1 and 5, got {value}")]
    RatingOutOfBounds { value: f64 },
}

fn rating_in_bounds(value: f64) -> bool {
    (RATING_MIN..=RATING_MAX).contains(&value)
}

/// Checks range constraints in a fixed order and reports the first violation.
pub fn validate(criteria: &FilterCriteria) -> Result<(), FilterRejection> {
    if let (Some(min), Some(max)) = (criteria.year_min, criteria.year_max) {
        if min > max {
            return Err(FilterRejection::YearRangeInverted { min, max });
        }
    }
    if let (Some(min), Some(max)) = (criteria.rating_min, criteria.rating_max) {
        if min > max {
            return Err(FilterRejection::RatingRangeInverted { min, max });
        }
    }
    for value in [criteria.rating_min, criteria.rating_max].into_iter().flatten() {
        if !rating_in_bounds(value) {
            return Err(FilterRejection::RatingOutOfBounds { value });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Text(text) => f.write_str(text),
            QueryValue::Integer(n) => write!(f, "{}", n),
            QueryValue::Number(n) => write!(f, "{}", n),
            QueryValue::Flag(flag) => write!(f, "{}", flag),
        }
    }
}

/// Outbound query parameters, keyed by the names in [`keys`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<&'static str, QueryValue>);

impl QueryParams {
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &QueryValue)> {
        self.0.iter().map(|(key, value)| (*key, value))
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn insert(&mut self, key: &'static str, value: QueryValue) {
        self.0.insert(key, value);
    }
}

/// Builds the school search query. Free text is sent whenever it is non-blank;
/// criteria only once the user has applied them. Facility flags are sent only
/// when set, never as `false`.
pub fn build(search: &str, criteria: &FilterCriteria, applied: bool) -> QueryParams {
    let mut params = QueryParams::default();

    let search = search.trim();
    if !search.is_empty() {
        params.insert(keys::SEARCH, QueryValue::Text(search.to_string()));
    }
    if !applied {
        return params;
    }

    if let Some(year) = criteria.year_min {
        params.insert(keys::YEAR_MIN, QueryValue::Integer(i64::from(year)));
    }
    if let Some(year) = criteria.year_max {
        params.insert(keys::YEAR_MAX, QueryValue::Integer(i64::from(year)));
    }
    if let Some(rating) = criteria.rating_min {
        params.insert(keys::RATING_MIN, QueryValue::Number(rating));
    }
    if let Some(rating) = criteria.rating_max {
        params.insert(keys::RATING_MAX, QueryValue::Number(rating));
    }
    if let Some(sports) = &criteria.sports {
        for key in sports.enabled() {
            params.insert(key, QueryValue::Flag(true));
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inverted_year_range_is_rejected() {
        let criteria = FilterCriteria {
            year_min: Some(2010),
            year_max: Some(2005),
            ..Default::default()
        };
        assert_eq!(
            validate(&criteria),
            Err(FilterRejection::YearRangeInverted { min: 2010, max: 2005 })
        );
    }

    #[test]
    fn rating_bounds_are_enforced() {
        let low = FilterCriteria {
            rating_min: Some(0.5),
            ..Default::default()
        };
        assert_eq!(
            validate(&low),
            Err(FilterRejection::RatingOutOfBounds { value: 0.5 })
        );

        let high = FilterCriteria {
            rating_max: Some(5.5),
            ..Default::default()
        };
        assert!(matches!(validate(&high), Err(FilterRejection::RatingOutOfBounds { .. })));

        let inverted = FilterCriteria {
            rating_min: Some(4.0),
            rating_max: Some(2.0),
            ..Default::default()
        };
        assert!(matches!(validate(&inverted), Err(FilterRejection::RatingRangeInverted { .. })));
    }

    #[test]
    fn valid_ranges_are_accepted() {
        let criteria = FilterCriteria {
            rating_min: Some(2.0),
            rating_max: Some(4.0),
            year_min: Some(1990),
            year_max: Some(1990),
            ..Default::default()
        };
        assert_eq!(validate(&criteria), Ok(()));
        assert_eq!(validate(&FilterCriteria::default()), Ok(()));
    }

    #[test]
    fn criteria_deserialize_from_form_keys() {
        let criteria: FilterCriteria = serde_json::from_value(json!({
            "yearMin": 1960,
            "ratingMax": 4.5,
            "sports": { "has_pool": true }
        }))
        .unwrap();
        assert_eq!(criteria.year_min, Some(1960));
        assert_eq!(criteria.rating_max, Some(4.5));
        assert!(criteria.sports.unwrap().has_pool);
    }

    #[test]
    fn search_is_trimmed_and_blank_search_omitted() {
        let params = build("  lyceum ", &FilterCriteria::default(), false);
        assert_eq!(params.get(keys::SEARCH), Some(&QueryValue::Text("lyceum".to_string())));
        assert!(build("   ", &FilterCriteria::default(), true).is_empty());
    }

    #[test]
    fn criteria_are_sent_only_when_applied() {
        let criteria = FilterCriteria {
            year_min: Some(1970),
            rating_min: Some(3.0),
            sports: Some(SportsFlags {
                has_pool: true,
                has_stadium: false,
                ..Default::default()
            }),
            ..Default::default()
        };

        let pending = build("", &criteria, false);
        assert!(pending.is_empty());

        let applied = build("", &criteria, true);
        assert_eq!(applied.len(), 3);
        assert_eq!(applied.get(keys::YEAR_MIN), Some(&QueryValue::Integer(1970)));
        assert!(applied.contains(keys::HAS_POOL));
        assert!(!applied.contains(keys::HAS_STADIUM));
        assert!(!applied.contains(keys::YEAR_MAX));
    }

    #[test]
    fn params_render_as_query_pairs_and_json() {
        let criteria = FilterCriteria {
            rating_min: Some(2.0),
            rating_max: Some(4.5),
            sports: Some(SportsFlags {
                has_sports_complex: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let params = build("school 5", &criteria, true);
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("has_sports_complex".to_string(), "true".to_string()),
                ("rating_max".to_string(), "4.5".to_string()),
                ("rating_min".to_string(), "2".to_string()),
                ("search".to_string(), "school 5".to_string()),
            ]
        );
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({ "has_sports_complex": true, "rating_max": 4.5, "rating_min": 2.0, "search": "school 5" })
        );
    }
}
