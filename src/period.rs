use anyhow::anyhow;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Calendar bucket size for the topic trend chart. Weeks start on Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    #[default]
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Week, Granularity::Month, Granularity::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" | "weeks" => Ok(Granularity::Week),
            "month" | "months" => Ok(Granularity::Month),
            "year" | "years" => Ok(Granularity::Year),
            other => Err(anyhow!("Unknown interval '{}', expected week, month or year", other)),
        }
    }
}

/// Bucket key: `YYYY`, `YYYY-MM`, or the bucket Monday as `YYYY-MM-DD`.
/// String order equals chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses the date part of a review timestamp. Accepts `YYYY-MM-DD` optionally
/// followed by a time after `T` or a space; the time is ignored.
pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split(['T', ' ']).next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn derive(date: NaiveDate, granularity: Granularity) -> PeriodKey {
    let key = match granularity {
        Granularity::Year => format!("{:04}", date.year()),
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Week => {
            // num_days_from_monday is 6 on Sunday, so Sunday maps back to the Monday before it.
            let back = u64::from(date.weekday().num_days_from_monday());
            let monday = date.checked_sub_days(Days::new(back)).unwrap_or(date);
            format!("{:04}-{:02}-{:02}", monday.year(), monday.month(), monday.day())
        }
    };
    PeriodKey(key)
}

/// `None` when the raw date cannot be placed on the calendar.
pub fn derive_from_str(raw: &str, granularity: Granularity) -> Option<PeriodKey> {
    parse_review_date(raw).map(|date| derive(date, granularity))
}

/// Short display label for an axis tick. Keys of an unexpected shape are returned unchanged.
pub fn format_label(key: &PeriodKey, granularity: Granularity) -> String {
    let key = key.as_str();
    match granularity {
        Granularity::Year => key.to_string(),
        Granularity::Month => {
            let mut parts = key.split('-');
            let year = parts.next();
            let month = parts.next().and_then(|m| m.parse::<usize>().ok());
            match (year, month) {
                (Some(year), Some(month @ 1..=12)) => {
                    format!("{} {}", MONTH_ABBREVIATIONS[month - 1], year)
                }
                _ => key.to_string(),
            }
        }
        Granularity::Week => {
            let parts: Vec<&str> = key.split('-').collect();
            match parts.as_slice() {
                [_, month, day] if key.len() >= 10 => format!("{}.{}", day, month),
                _ => key.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn year_and_month_keys_are_zero_padded() {
        assert_eq!(derive(date(2023, 3, 9), Granularity::Year).as_str(), "2023");
        assert_eq!(derive(date(2023, 3, 9), Granularity::Month).as_str(), "2023-03");
        assert_eq!(derive(date(2023, 12, 31), Granularity::Month).as_str(), "2023-12");
    }

    #[test]
    fn sunday_belongs_to_the_preceding_monday() {
        let sunday = derive(date(2024, 1, 7), Granularity::Week);
        let monday = derive(date(2024, 1, 1), Granularity::Week);
        assert_eq!(sunday, monday);
        assert_eq!(monday.as_str(), "2024-01-01");
        assert_eq!(derive(date(2024, 1, 8), Granularity::Week).as_str(), "2024-01-08");
    }

    #[test]
    fn week_bucket_can_start_in_the_previous_year() {
        // 2023-01-01 is a Sunday.
        assert_eq!(derive(date(2023, 1, 1), Granularity::Week).as_str(), "2022-12-26");
    }

    #[test]
    fn derive_is_deterministic() {
        for granularity in Granularity::ALL {
            let d = date(2021, 6, 15);
            assert_eq!(derive(d, granularity), derive(d, granularity));
        }
    }

    #[test]
    fn unparseable_dates_yield_none() {
        assert_eq!(derive_from_str("", Granularity::Month), None);
        assert_eq!(derive_from_str("2023-02-30", Granularity::Month), None);
        assert_eq!(derive_from_str("05.01.2023", Granularity::Month), None);
        assert_eq!(
            derive_from_str("2023-01-05T10:30:00Z", Granularity::Month).unwrap().as_str(),
            "2023-01"
        );
        assert_eq!(
            derive_from_str(" 2023-01-05 10:30:00 ", Granularity::Year).unwrap().as_str(),
            "2023"
        );
    }

    #[test]
    fn labels_render_without_touching_keys() {
        let month = derive(date(2023, 1, 20), Granularity::Month);
        assert_eq!(format_label(&month, Granularity::Month), "Jan 2023");
        let week = derive(date(2024, 1, 7), Granularity::Week);
        assert_eq!(format_label(&week, Granularity::Week), "01.01");
        let year = derive(date(2024, 1, 7), Granularity::Year);
        assert_eq!(format_label(&year, Granularity::Year), "2024");
        assert_eq!(month.as_str(), "2023-01");
    }

    #[test]
    fn label_order_does_not_drive_key_order() {
        // "Feb 2023" sorts before "Jan 2023" as text; keys still sort chronologically.
        let jan = derive(date(2023, 1, 1), Granularity::Month);
        let feb = derive(date(2023, 2, 1), Granularity::Month);
        assert!(jan < feb);
        assert!(format_label(&feb, Granularity::Month) < format_label(&jan, Granularity::Month));
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Week".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!(" years ".parse::<Granularity>().unwrap(), Granularity::Year);
        assert!("day".parse::<Granularity>().is_err());
        assert_eq!(Granularity::default(), Granularity::Month);
    }
}
