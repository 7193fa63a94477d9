//! Spam tally engine
//!
//! Lists every message under a label, resolves each one to a calendar date
//! and counts the dates that fall inside the trailing window.

mod progress;
mod resolve;

pub use progress::{NoProgress, Progress};
pub use resolve::{
    BATCH_SIZE, BatchResolver, DateHeaderResolver, DateResolver, InternalDateResolver,
};

use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::BTreeMap;

use crate::gmail::MessageSource;
use crate::gmail::api::MessageRef;

/// Gmail's system label for spam
pub const SPAM_LABEL: &str = "SPAM";

/// How many days back from today a message may be and still be counted
pub const WINDOW_DAYS: i64 = 31;

/// Messages per calendar date
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DailyCounts {
    counts: BTreeMap<NaiveDate, usize>,
}

impl DailyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more message on `date`
    pub fn increment(&mut self, date: NaiveDate) {
        *self.counts.entry(date).or_insert(0) += 1;
    }

    /// Count for `date` (0 if none)
    pub fn get(&self, date: NaiveDate) -> usize {
        self.counts.get(&date).copied().unwrap_or(0)
    }

    /// Number of distinct dates with at least one message
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total messages across all dates
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Dates and counts in ascending date order
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, usize)> + '_ {
        self.counts.iter().map(|(date, count)| (*date, *count))
    }
}

/// Why a tally could not be completed
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// A listing call failed; nothing was resolved
    #[error("Failed to list messages: {0:#}")]
    Listing(anyhow::Error),
    /// Fetching a message (or a whole batch) failed
    #[error("Failed to resolve message dates: {0:#}")]
    Resolution(anyhow::Error),
}

/// Whether `date` is counted for a run on `today`
///
/// Compares calendar dates, so with a 31-day window the oldest counted date
/// is `today - 31`: up to 32 distinct dates can appear. Future dates are
/// never counted.
pub fn within_window(today: NaiveDate, date: NaiveDate) -> bool {
    let age = (today - date).num_days();
    (0..=WINDOW_DAYS).contains(&age)
}

/// Count `dates` that fall within the window ending on `today`
pub fn aggregate(today: NaiveDate, dates: impl IntoIterator<Item = NaiveDate>) -> DailyCounts {
    let mut counts = DailyCounts::new();
    for date in dates {
        if within_window(today, date) {
            counts.increment(date);
        }
    }
    counts
}

/// Follow page tokens until every reference under `label` is collected
pub fn list_all_references(source: &dyn MessageSource, label: &str) -> Result<Vec<MessageRef>> {
    let mut all_messages: Vec<MessageRef> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let response = source.list_messages(label, page_token.as_deref())?;

        if let Some(messages) = response.messages {
            all_messages.extend(messages);
        }
        debug!("Listed {} {} messages so far", all_messages.len(), label);

        match response.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(all_messages)
}

/// Tally messages under `label` by date for a run on `today`
///
/// Listing completes before any message is resolved. Any listing or
/// resolution error aborts the run; no partial table is returned.
///
/// # Arguments
/// * `source` - Where messages are listed and fetched from
/// * `resolver` - Strategy turning message references into dates
/// * `label` - Label to tally (normally [`SPAM_LABEL`])
/// * `today` - Run date, captured once by the caller
/// * `progress` - Notified once per resolved message
pub fn tally(
    source: &dyn MessageSource,
    resolver: &dyn DateResolver,
    label: &str,
    today: NaiveDate,
    progress: &mut dyn Progress,
) -> Result<DailyCounts, TallyError> {
    let references = list_all_references(source, label).map_err(TallyError::Listing)?;

    if references.is_empty() {
        info!("No messages under label {}", label);
        return Ok(DailyCounts::new());
    }
    info!("Resolving dates for {} messages", references.len());

    let dates = resolver
        .resolve_dates(source, &references, progress)
        .map_err(TallyError::Resolution)?;
    progress.finish(references.len());

    let counts = aggregate(today, dates.into_values());
    debug!(
        "{} of {} messages fall within {} days of {}",
        counts.total(),
        references.len(),
        WINDOW_DAYS,
        today
    );
    Ok(counts)
}
