//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 credential provider (load, refresh, interactive login)
//! - Gmail API client for listing and fetching messages, singly or batched
//! - Response normalization to calendar dates

mod auth;
mod batch;
mod client;
mod normalize;
mod source;

pub use auth::{Credential, GmailAuth, load_credential, save_credential};
pub use batch::{BatchPart, build_batch_body, parse_batch_response};
pub use client::GmailClient;
pub use normalize::{date_header, internal_date_to_date, parse_date_header};
pub use source::{MessageFormat, MessageSource};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    use crate::models::MessageId;

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
    }

    impl MessageRef {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                thread_id: None,
            }
        }

        pub fn message_id(&self) -> MessageId {
            MessageId::new(&self.id)
        }
    }

    /// Message from Gmail API
    ///
    /// Which fields are present depends on the requested format: `minimal`
    /// carries `internalDate`, `metadata` adds the requested headers.
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        /// Receipt time in epoch milliseconds, sent as a decimal string
        pub internal_date: Option<String>,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }
}
