//! Gmail API response normalization
//!
//! Converts Gmail API messages to the calendar date they were received on.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Weekday};

use super::api::{GmailMessage, MessagePayload};

/// Layout of a `Date` header once the weekday and zone tokens are removed
const DATE_HEADER_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Convert a message's `internalDate` (epoch milliseconds) to a calendar date in `tz`
pub fn internal_date_to_date<Tz: TimeZone>(message: &GmailMessage, tz: &Tz) -> Result<NaiveDate> {
    let raw = message
        .internal_date
        .as_deref()
        .with_context(|| format!("Message {} has no internalDate", message.id))?;

    let millis: i64 = raw
        .parse()
        .with_context(|| format!("Invalid internalDate {:?} on message {}", raw, message.id))?;

    let received_at = tz
        .timestamp_millis_opt(millis)
        .single()
        .with_context(|| format!("internalDate {} out of range on message {}", millis, message.id))?;

    Ok(received_at.date_naive())
}

/// Extract the `Date` header value from a message, if it was requested and present
pub fn date_header(message: &GmailMessage) -> Option<&str> {
    message
        .payload
        .as_ref()
        .and_then(|payload| extract_header(payload, "Date"))
}

/// Extract a header value by name
fn extract_header<'a>(payload: &'a MessagePayload, name: &str) -> Option<&'a str> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.as_str())
        } else {
            None
        }
    })
}

/// Parse a `Date` header as a naive local date-time.
///
/// Accepts `"<weekday>, <day> <month> <year> <h>:<m>:<s> <tz>"` and
/// `"<day> <month> <year> <h>:<m>:<s> <tz>"`. The zone token (and any
/// trailing `(comment)`) is dropped rather than applied, so the result is
/// the sender's wall-clock time. The weekday must be a weekday name but is
/// not checked against the date, since spam often gets it wrong.
pub fn parse_date_header(value: &str) -> Option<NaiveDateTime> {
    let value = strip_comment(value.trim());

    let (without_zone, _zone) = value.rsplit_once(char::is_whitespace)?;

    let without_weekday = match without_zone.split_once(',') {
        Some((weekday, rest)) => {
            weekday.trim().parse::<Weekday>().ok()?;
            rest
        }
        None => without_zone,
    };

    NaiveDateTime::parse_from_str(without_weekday.trim(), DATE_HEADER_FORMAT).ok()
}

/// Remove a trailing `(comment)` such as `(UTC)` or `(PDT)`
fn strip_comment(value: &str) -> &str {
    match value.strip_suffix(')').and_then(|v| v.rfind('(').map(|i| &v[..i])) {
        Some(rest) => rest.trim_end(),
        None => value,
    }
}
