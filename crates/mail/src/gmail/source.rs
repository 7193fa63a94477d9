//! Message source abstraction
//!
//! The tally engine only needs three remote operations: a paginated
//! listing, a single get, and a batched get. [`GmailClient`](super::GmailClient)
//! implements them over HTTP; tests implement them in memory.

use anyhow::Result;

use super::api::{GmailMessage, ListMessagesResponse};
use crate::models::MessageId;

/// Detail level requested when fetching a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// IDs, labels and `internalDate` only
    Minimal,
    /// Minimal fields plus the `Date` header
    DateHeader,
}

impl MessageFormat {
    /// Query string fragment selecting this format
    pub fn query(self) -> &'static str {
        match self {
            MessageFormat::Minimal => "format=minimal",
            MessageFormat::DateHeader => "format=metadata&metadataHeaders=Date",
        }
    }
}

/// Remote operations needed to tally messages
pub trait MessageSource {
    /// Fetch one page of message references carrying `label`
    fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse>;

    /// Fetch a single message
    fn get_message(&self, id: &MessageId, format: MessageFormat) -> Result<GmailMessage>;

    /// Fetch a group of messages in one round-trip
    ///
    /// `on_result` is invoked exactly once per id, before this call returns.
    /// An `Err` from this method means the batch as a whole failed; per-message
    /// failures are delivered through the callback instead.
    fn batch_get_messages(
        &self,
        ids: &[MessageId],
        format: MessageFormat,
        on_result: &mut dyn FnMut(&MessageId, Result<GmailMessage>),
    ) -> Result<()>;
}
