//! Strategies for turning message references into calendar dates
//!
//! All strategies share one contract: given the listed references, return
//! the date of each message that could be dated. They differ only in how
//! many round-trips they make and which timestamp they trust.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, TimeZone};
use log::{debug, warn};
use std::collections::HashMap;

use super::Progress;
use crate::gmail::api::{GmailMessage, MessageRef};
use crate::gmail::{
    MessageFormat, MessageSource, date_header, internal_date_to_date, parse_date_header,
};
use crate::models::MessageId;

/// Most sub-requests sent in one batch round-trip
pub const BATCH_SIZE: usize = 50;

/// Resolves each referenced message to the date it should be counted on
pub trait DateResolver {
    /// Resolve `references` to dates
    ///
    /// Messages that cannot be dated but are not errors (e.g. an unparseable
    /// header) are left out of the map. `progress` is ticked once per message.
    fn resolve_dates(
        &self,
        source: &dyn MessageSource,
        references: &[MessageRef],
        progress: &mut dyn Progress,
    ) -> Result<HashMap<MessageId, NaiveDate>>;
}

/// One get per message, dated by Gmail's `internalDate`
#[derive(Debug, Clone)]
pub struct InternalDateResolver<Tz: TimeZone = Local> {
    tz: Tz,
}

impl InternalDateResolver<Local> {
    /// Date messages in the machine's local timezone
    pub fn new() -> Self {
        Self { tz: Local }
    }
}

impl Default for InternalDateResolver<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> InternalDateResolver<Tz> {
    pub fn with_timezone(tz: Tz) -> Self {
        Self { tz }
    }
}

impl<Tz: TimeZone> DateResolver for InternalDateResolver<Tz> {
    fn resolve_dates(
        &self,
        source: &dyn MessageSource,
        references: &[MessageRef],
        progress: &mut dyn Progress,
    ) -> Result<HashMap<MessageId, NaiveDate>> {
        let mut dates = HashMap::with_capacity(references.len());

        for reference in references {
            progress.tick();
            let id = reference.message_id();
            let message = source.get_message(&id, MessageFormat::Minimal)?;
            let date = internal_date_to_date(&message, &self.tz)?;
            dates.insert(id, date);
        }

        Ok(dates)
    }
}

/// Grouped gets of at most `batch_size` messages, dated by `internalDate`
///
/// A message whose sub-request fails is skipped with a warning; only a
/// failure of the batch round-trip itself aborts resolution.
#[derive(Debug, Clone)]
pub struct BatchResolver<Tz: TimeZone = Local> {
    tz: Tz,
    batch_size: usize,
}

impl BatchResolver<Local> {
    /// Batches of [`BATCH_SIZE`] in the machine's local timezone
    pub fn new() -> Self {
        Self::with_timezone(Local)
    }
}

impl Default for BatchResolver<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> BatchResolver<Tz> {
    pub fn with_timezone(tz: Tz) -> Self {
        Self {
            tz,
            batch_size: BATCH_SIZE,
        }
    }

    /// Override the group size (clamped to 1..=[`BATCH_SIZE`])
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, BATCH_SIZE);
        self
    }
}

impl<Tz: TimeZone> DateResolver for BatchResolver<Tz> {
    fn resolve_dates(
        &self,
        source: &dyn MessageSource,
        references: &[MessageRef],
        progress: &mut dyn Progress,
    ) -> Result<HashMap<MessageId, NaiveDate>> {
        let mut dates = HashMap::with_capacity(references.len());

        for chunk in references.chunks(self.batch_size) {
            let ids: Vec<MessageId> = chunk.iter().map(MessageRef::message_id).collect();
            let mut on_result = |id: &MessageId, result: Result<GmailMessage>| {
                progress.tick();
                match result.and_then(|message| internal_date_to_date(&message, &self.tz)) {
                    Ok(date) => {
                        dates.insert(id.clone(), date);
                    }
                    Err(e) => warn!("Skipping message {} in batch: {:#}", id, e),
                }
            };
            source.batch_get_messages(&ids, MessageFormat::Minimal, &mut on_result)?;
            debug!("Resolved batch of {} messages", ids.len());
        }

        Ok(dates)
    }
}

/// One metadata get per message, dated by the sender's `Date` header
///
/// The header's zone offset is discarded, so dates are the sender's
/// wall-clock dates rather than local ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateHeaderResolver;

impl DateHeaderResolver {
    pub fn new() -> Self {
        Self
    }
}

impl DateResolver for DateHeaderResolver {
    fn resolve_dates(
        &self,
        source: &dyn MessageSource,
        references: &[MessageRef],
        progress: &mut dyn Progress,
    ) -> Result<HashMap<MessageId, NaiveDate>> {
        let mut dates = HashMap::with_capacity(references.len());

        for reference in references {
            progress.tick();
            let id = reference.message_id();
            let message = source
                .get_message(&id, MessageFormat::DateHeader)
                .with_context(|| format!("Failed to fetch Date header for {}", id))?;

            match date_header(&message).and_then(parse_date_header) {
                Some(received) => {
                    dates.insert(id, received.date());
                }
                None => warn!(
                    "Skipping message {}: unparseable Date header {:?}",
                    id,
                    date_header(&message)
                ),
            }
        }

        Ok(dates)
    }
}
