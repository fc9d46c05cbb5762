use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

use crate::models::{ReviewRecord, SchoolId, Sentiment, Topic};

/// Selection cap enforced by callers. The aggregator itself accepts any number.
pub const MAX_COMPARED_SCHOOLS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct SchoolReviews {
    pub school_id: SchoolId,
    pub reviews: Vec<ReviewRecord>,
}

impl SchoolReviews {
    pub fn new(school_id: SchoolId, reviews: Vec<ReviewRecord>) -> Self {
        SchoolReviews { school_id, reviews }
    }
}

/// Positive mentions of one topic per (date, school). Every date row holds a
/// count for every school, zero when that school had none on that date.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityComparisonTable {
    topic: Topic,
    schools: Vec<SchoolId>,
    dates: BTreeMap<NaiveDate, Vec<u32>>,
}

impl EntityComparisonTable {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn schools(&self) -> &[SchoolId] {
        &self.schools
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dates ascending, counts in school order.
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &[u32])> {
        self.dates.iter().map(|(date, counts)| (date, counts.as_slice()))
    }

    pub fn count(&self, date: NaiveDate, school_id: SchoolId) -> Option<u32> {
        let index = self.schools.iter().position(|id| *id == school_id)?;
        self.dates.get(&date).and_then(|counts| counts.get(index)).copied()
    }

    pub fn total_for(&self, school_id: SchoolId) -> u32 {
        let Some(index) = self.schools.iter().position(|id| *id == school_id) else {
            return 0;
        };
        self.dates.values().map(|counts| counts[index]).sum()
    }
}

/// Counts positive mentions of `topic` per exact calendar date for each school.
///
/// The date axis is the union of every dated review across all schools, so a
/// date appears once any school has a review on it. Unlike the topic trend there
/// is no denominator: "no positive mention" and "no review" both read as 0.
/// A school listed twice is merged into a single column.
pub fn aggregate(per_school: &[SchoolReviews], topic: Topic) -> EntityComparisonTable {
    let mut schools: Vec<SchoolId> = Vec::with_capacity(per_school.len());
    for entry in per_school {
        if !schools.contains(&entry.school_id) {
            schools.push(entry.school_id);
        }
    }

    let mut dates: BTreeMap<NaiveDate, Vec<u32>> = BTreeMap::new();
    for entry in per_school {
        let Some(column) = schools.iter().position(|id| *id == entry.school_id) else {
            continue;
        };
        for review in &entry.reviews {
            let Some(date) = review.date else {
                continue;
            };
            let counts = dates.entry(date).or_insert_with(|| vec![0; schools.len()]);
            if review.topics.get(topic) == Some(Sentiment::Pos) {
                counts[column] += 1;
            }
        }
    }

    debug!(
        "Compared {} schools on '{}': {} distinct review dates.",
        schools.len(),
        topic,
        dates.len()
    );

    EntityComparisonTable {
        topic,
        schools,
        dates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn positive(d: NaiveDate, topic: Topic) -> ReviewRecord {
        ReviewRecord::new(d).with_topic(topic, Sentiment::Pos)
    }

    #[test]
    fn counts_positive_mentions_per_date_and_school() {
        let d1 = date(2023, 5, 1);
        let d2 = date(2023, 5, 3);
        let table = aggregate(
            &[
                SchoolReviews::new(1, vec![positive(d1, Topic::Food), positive(d1, Topic::Food)]),
                SchoolReviews::new(
                    2,
                    vec![
                        positive(d2, Topic::Food),
                        ReviewRecord::new(d2).with_topic(Topic::Food, Sentiment::Neg),
                    ],
                ),
            ],
            Topic::Food,
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.count(d1, 1), Some(2));
        assert_eq!(table.count(d1, 2), Some(0));
        assert_eq!(table.count(d2, 1), Some(0));
        assert_eq!(table.count(d2, 2), Some(1));
        assert_eq!(table.total_for(1), 2);
    }

    #[test]
    fn rows_are_rectangular() {
        let table = aggregate(
            &[
                SchoolReviews::new(10, vec![positive(date(2022, 1, 1), Topic::Repairs)]),
                SchoolReviews::new(20, vec![ReviewRecord::new(date(2022, 2, 1))]),
            ],
            Topic::Repairs,
        );
        for (_, counts) in table.iter() {
            assert_eq!(counts.len(), 2);
        }
        assert_eq!(table.count(date(2022, 2, 1), 20), Some(0));
    }

    #[test]
    fn other_topics_and_undated_reviews_do_not_count() {
        let table = aggregate(
            &[SchoolReviews::new(
                1,
                vec![
                    positive(date(2022, 1, 1), Topic::Teachers),
                    ReviewRecord::default().with_topic(Topic::Food, Sentiment::Pos),
                ],
            )],
            Topic::Food,
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.count(date(2022, 1, 1), 1), Some(0));
    }

    #[test]
    fn more_than_two_schools_each_get_a_column() {
        let d = date(2024, 9, 2);
        let table = aggregate(
            &[
                SchoolReviews::new(1, vec![positive(d, Topic::Food)]),
                SchoolReviews::new(2, vec![]),
                SchoolReviews::new(3, vec![positive(d, Topic::Food)]),
            ],
            Topic::Food,
        );
        assert_eq!(table.schools(), &[1, 2, 3]);
        assert_eq!(table.iter().next().unwrap().1, &[1, 0, 1]);
    }

    #[test]
    fn duplicate_school_entries_merge() {
        let d = date(2024, 9, 2);
        let table = aggregate(
            &[
                SchoolReviews::new(5, vec![positive(d, Topic::Food)]),
                SchoolReviews::new(5, vec![positive(d, Topic::Food)]),
            ],
            Topic::Food,
        );
        assert_eq!(table.schools(), &[5]);
        assert_eq!(table.count(d, 5), Some(2));
    }

    #[test]
    fn empty_inputs_give_empty_tables() {
        assert!(aggregate(&[], Topic::Food).is_empty());
        assert!(aggregate(&[SchoolReviews::new(1, vec![])], Topic::Food).is_empty());
    }
}
