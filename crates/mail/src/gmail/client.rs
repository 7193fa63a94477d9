//! Gmail API HTTP client
//!
//! Provides methods for listing and fetching messages from the Gmail API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result, anyhow};
use log::debug;

use super::api::{GmailMessage, ListMessagesResponse};
use super::auth::Credential;
use super::batch::{boundary_from_content_type, build_batch_body, parse_batch_response};
use super::source::{MessageFormat, MessageSource};
use crate::models::MessageId;

/// Gmail API client bound to one access token
pub struct GmailClient {
    access_token: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Gmail batch endpoint
    const BATCH_URL: &'static str = "https://gmail.googleapis.com/batch/gmail/v1";

    /// Boundary separating parts of outgoing batch requests
    const BATCH_BOUNDARY: &'static str = "spamcount_batch_boundary";

    /// Largest page the listing call accepts
    const MAX_PAGE_SIZE: usize = 500;

    /// Create a new Gmail client from a raw access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// Create a new Gmail client from an obtained credential
    pub fn from_credential(credential: &Credential) -> Self {
        Self::new(credential.access_token())
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// List message IDs carrying `label`
    ///
    /// # Arguments
    /// * `label` - Label ID to filter on (e.g. `SPAM`)
    /// * `page_token` - Optional page token for pagination
    pub fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let mut url = format!(
            "{}/users/me/messages?labelIds={}&maxResults={}",
            Self::BASE_URL,
            urlencoding::encode(label),
            Self::MAX_PAGE_SIZE
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let mut response = ureq::get(&url)
            .header("Authorization", &self.authorization())
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    /// Get message details by ID
    ///
    /// # Arguments
    /// * `id` - The message ID to fetch
    /// * `format` - How much of the message to return
    pub fn get_message(&self, id: &MessageId, format: MessageFormat) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?{}",
            Self::BASE_URL,
            urlencoding::encode(id.as_str()),
            format.query()
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &self.authorization())
            .call()
            .with_context(|| format!("Failed to send get message request for {}", id))?;

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse message response for {}", id))?;

        Ok(message)
    }

    /// Get several messages in one batch round-trip
    ///
    /// Returns one result per requested id, in request order. A missing or
    /// non-2xx sub-response becomes an `Err` for that id only.
    pub fn get_messages_batch(
        &self,
        ids: &[MessageId],
        format: MessageFormat,
    ) -> Result<Vec<Result<GmailMessage>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = build_batch_body(Self::BATCH_BOUNDARY, ids, format);

        let mut response = ureq::post(Self::BATCH_URL)
            .header("Authorization", &self.authorization())
            .header(
                "Content-Type",
                &format!("multipart/mixed; boundary={}", Self::BATCH_BOUNDARY),
            )
            .send(body)
            .context("Failed to send batch request")?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let boundary = boundary_from_content_type(&content_type)
            .with_context(|| format!("Batch response has no boundary: {:?}", content_type))?
            .to_string();

        let text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read batch response body")?;

        let mut results: Vec<Option<Result<GmailMessage>>> = ids.iter().map(|_| None).collect();

        for part in parse_batch_response(&boundary, &text) {
            let Some(index) = part.index.filter(|i| *i < ids.len()) else {
                debug!("Ignoring batch part without a known Content-ID");
                continue;
            };

            let result = if part.is_success() {
                serde_json::from_str::<GmailMessage>(&part.body)
                    .with_context(|| format!("Failed to parse message response for {}", ids[index]))
            } else {
                Err(anyhow!(
                    "HTTP {} for message {}: {}",
                    part.status,
                    ids[index],
                    part.body
                ))
            };
            results[index] = Some(result);
        }

        Ok(results
            .into_iter()
            .zip(ids)
            .map(|(result, id)| {
                result.unwrap_or_else(|| Err(anyhow!("No response received for message {}", id)))
            })
            .collect())
    }
}

impl MessageSource for GmailClient {
    fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        GmailClient::list_messages(self, label, page_token)
    }

    fn get_message(&self, id: &MessageId, format: MessageFormat) -> Result<GmailMessage> {
        GmailClient::get_message(self, id, format)
    }

    fn batch_get_messages(
        &self,
        ids: &[MessageId],
        format: MessageFormat,
        on_result: &mut dyn FnMut(&MessageId, Result<GmailMessage>),
    ) -> Result<()> {
        let results = self.get_messages_batch(ids, format)?;
        debug!("Batch of {} messages returned", results.len());

        for (id, result) in ids.iter().zip(results) {
            on_result(id, result);
        }
        Ok(())
    }
}
