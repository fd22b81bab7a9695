//! Incremental per-feed statistics.
//!
//! Feed tasks push decoded items in with [`Aggregator::append`] as each page
//! arrives. When a feed runs out of pages its task calls
//! [`Aggregator::finalize`] once, which removes the feed's working state and
//! turns it into a [`Report`]. A feed that fails is dropped with
//! [`Aggregator::discard`] so no state outlives its feed.
//!
//! State lives in a sharded [`DashMap`], so appends for different feeds rarely
//! contend; appends for the same feed come from a single task in page order.
use crate::feed::Item;
use crate::util::{sanitize_line, truncate_to_width};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;

/// Widest a title is allowed to print in a report.
const REPORT_TITLE_WIDTH: usize = 100;

/// Final summary of one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub feed: String,
    pub top_author: String,
    pub top_author_count: u64,
    pub top_item_title: String,
    pub top_item_score: u64,
    /// Items aggregated across all pages
    pub item_count: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Author and title come straight from the API and may carry escape sequences
        let title = sanitize_line(&self.top_item_title);
        writeln!(f, "Totals for \"{}\" ({} posts)", self.feed, self.item_count)?;
        writeln!(f, "Top user:     {}", sanitize_line(&self.top_author))?;
        writeln!(f, "Post count:   {}", self.top_author_count)?;
        writeln!(f, "-=-=-=-=-=-=")?;
        writeln!(f, "Top post:     {}", truncate_to_width(&title, REPORT_TITLE_WIDTH))?;
        write!(f, "Upvote count: {}", self.top_item_score)
    }
}

/// Running value for one author or title.
///
/// `reached_at` is the sequence number of the item that last changed `value`,
/// which breaks ties in favour of whoever got to the tied value first.
#[derive(Debug, Clone, Copy)]
struct Tally {
    value: u64,
    reached_at: u64,
}

#[derive(Debug, Default)]
struct FeedAggregate {
    items: Vec<Item>,
    author_counts: HashMap<String, Tally>,
    score_by_title: HashMap<String, Tally>,
    seq: u64,
}

impl FeedAggregate {
    fn extend(&mut self, items: Vec<Item>) {
        for item in &items {
            self.seq += 1;
            bump(&mut self.author_counts, &item.author, 1, self.seq);
            bump(&mut self.score_by_title, &item.title, item.score, self.seq);
        }
        self.items.extend(items);
    }

    fn report(&self, feed: &str) -> Option<Report> {
        if self.items.is_empty() {
            return None;
        }
        let (top_author, author) = leader(&self.author_counts)?;
        let (top_item_title, item) = leader(&self.score_by_title)?;

        Some(Report {
            feed: feed.to_string(),
            top_author: top_author.to_string(),
            top_author_count: author.value,
            top_item_title: top_item_title.to_string(),
            top_item_score: item.value,
            item_count: self.items.len(),
        })
    }
}

fn bump(tallies: &mut HashMap<String, Tally>, key: &str, delta: u64, seq: u64) {
    match tallies.get_mut(key) {
        Some(tally) => {
            // A zero delta leaves the value where it was, and so the time it got there
            if delta > 0 {
                tally.value = tally.value.saturating_add(delta);
                tally.reached_at = seq;
            }
        }
        None => {
            tallies.insert(
                key.to_owned(),
                Tally {
                    value: delta,
                    reached_at: seq,
                },
            );
        }
    }
}

/// Highest value; among equal values, the one that reached it first.
fn leader(tallies: &HashMap<String, Tally>) -> Option<(&str, Tally)> {
    tallies
        .iter()
        .min_by(|(_, a), (_, b)| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.reached_at.cmp(&b.reached_at))
        })
        .map(|(key, tally)| (key.as_str(), *tally))
}

/// Thread-safe store of every active feed's running statistics.
#[derive(Debug, Default)]
pub struct Aggregator {
    feeds: DashMap<String, FeedAggregate>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page of items to `feed`, creating its aggregate on first use.
    pub fn append(&self, feed: &str, items: Vec<Item>) {
        if let Some(mut aggregate) = self.feeds.get_mut(feed) {
            aggregate.extend(items);
            return;
        }
        self.feeds
            .entry(feed.to_owned())
            .or_default()
            .extend(items);
    }

    /// Remove `feed`'s aggregate and summarise it.
    ///
    /// Returns `None` when the feed never received an item (or was never
    /// appended to). Either way the feed's state is gone afterwards.
    pub fn finalize(&self, feed: &str) -> Option<Report> {
        let (_, aggregate) = self.feeds.remove(feed)?;
        let report = aggregate.report(feed);
        tracing::debug!(
            feed = %feed,
            items = aggregate.items.len(),
            reported = report.is_some(),
            "Feed aggregate finalized"
        );
        report
    }

    /// Drop `feed`'s aggregate without reporting. Returns whether one existed.
    pub fn discard(&self, feed: &str) -> bool {
        self.feeds.remove(feed).is_some()
    }

    /// Whether `feed` currently has working state.
    pub fn contains(&self, feed: &str) -> bool {
        self.feeds.contains_key(feed)
    }

    /// Number of feeds with working state.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
