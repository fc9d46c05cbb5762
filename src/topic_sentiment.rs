use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{ReviewRecord, Sentiment, Topic};
use crate::period::{derive, Granularity, PeriodKey};

/// Mention counts for one (period, topic) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounter {
    pub pos: u32,
    pub neg: u32,
    pub neutral: u32,
}

impl SentimentCounter {
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Pos => self.pos += 1,
            Sentiment::Neg => self.neg += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.pos + self.neg + self.neutral
    }

    /// Net positivity in `[-1, 1]`, or `None` when nothing was mentioned.
    /// An all-neutral cell scores `0.0`, not `None`.
    pub fn score(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((f64::from(self.pos) - f64::from(self.neg)) / f64::from(total))
    }
}

/// Counters per period, each period holding one counter per selected topic in
/// selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSentimentTable {
    granularity: Granularity,
    topics: Vec<Topic>,
    periods: BTreeMap<PeriodKey, Vec<SentimentCounter>>,
}

impl TopicSentimentTable {
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Periods in ascending key order with their counters in topic selection order.
    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, &[SentimentCounter])> {
        self.periods
            .iter()
            .map(|(period, counters)| (period, counters.as_slice()))
    }

    pub fn counter(&self, period: &PeriodKey, topic: Topic) -> Option<&SentimentCounter> {
        let index = self.topics.iter().position(|t| *t == topic)?;
        self.periods.get(period).and_then(|counters| counters.get(index))
    }

    pub fn score(&self, period: &PeriodKey, topic: Topic) -> Option<f64> {
        self.counter(period, topic).and_then(SentimentCounter::score)
    }
}

/// Buckets reviews by period and counts sentiment labels for the selected topics.
///
/// Every dated review registers its period, even one without a label for any
/// selected topic, so that period still produces a row (of gaps). Reviews
/// without a usable date are skipped. An empty selection yields an empty table.
pub fn aggregate(
    reviews: &[ReviewRecord],
    topics: &[Topic],
    granularity: Granularity,
) -> TopicSentimentTable {
    let mut selected: Vec<Topic> = Vec::with_capacity(topics.len());
    for topic in topics {
        if !selected.contains(topic) {
            selected.push(*topic);
        }
    }

    let mut periods: BTreeMap<PeriodKey, Vec<SentimentCounter>> = BTreeMap::new();
    let mut skipped = 0usize;

    if !selected.is_empty() {
        for review in reviews {
            let Some(date) = review.date else {
                skipped += 1;
                continue;
            };
            let counters = periods
                .entry(derive(date, granularity))
                .or_insert_with(|| vec![SentimentCounter::default(); selected.len()]);
            for (counter, topic) in counters.iter_mut().zip(&selected) {
                if let Some(sentiment) = review.topics.get(*topic) {
                    counter.record(sentiment);
                }
            }
        }
    }

    debug!(
        "Aggregated {} reviews into {} {} periods for {} topics ({} without a date).",
        reviews.len(),
        periods.len(),
        granularity,
        selected.len(),
        skipped
    );

    TopicSentimentTable {
        granularity,
        topics: selected,
        periods,
    }
}

/// Number of reviews carrying any recognized label for `topic`.
pub fn count_topic_mentions(reviews: &[ReviewRecord], topic: Topic) -> usize {
    reviews
        .iter()
        .filter(|review| review.topics.get(topic).is_some())
        .count()
}
