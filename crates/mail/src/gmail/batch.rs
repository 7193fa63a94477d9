//! Gmail batch request encoding
//!
//! A batch is a single `multipart/mixed` POST whose parts are embedded HTTP
//! requests. The response mirrors it: one embedded HTTP response per part,
//! tagged with `Content-ID: <response-item-N>` for request part `<item-N>`.

use super::source::MessageFormat;
use crate::models::MessageId;

/// One embedded HTTP response from a batch reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPart {
    /// Index of the request this answers, recovered from its Content-ID
    pub index: Option<usize>,
    /// HTTP status of the embedded response
    pub status: u16,
    /// Embedded response body (JSON for Gmail)
    pub body: String,
}

impl BatchPart {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Build the multipart body fetching each message in `ids` with `format`
pub fn build_batch_body(boundary: &str, ids: &[MessageId], format: MessageFormat) -> String {
    let mut body = String::new();

    for (i, id) in ids.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <item-{}>\r\n\r\n", i));
        body.push_str(&format!(
            "GET /gmail/v1/users/me/messages/{}?{}\r\n\r\n",
            urlencoding::encode(id.as_str()),
            format.query()
        ));
    }

    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

/// Extract the boundary parameter from a `multipart/mixed` Content-Type
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Split a batch reply into its embedded responses
///
/// Parts that are not parseable HTTP responses are dropped; the caller
/// treats any request without a matching part as failed.
pub fn parse_batch_response(boundary: &str, text: &str) -> Vec<BatchPart> {
    let text = text.replace("\r\n", "\n");
    let delimiter = format!("--{}", boundary);

    text.split(delimiter.as_str())
        .skip(1)
        .filter(|part| !part.starts_with("--"))
        .filter_map(parse_part)
        .collect()
}

fn parse_part(part: &str) -> Option<BatchPart> {
    let (outer_headers, inner) = part.trim_start_matches('\n').split_once("\n\n")?;

    let index = outer_headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-id") {
            item_index(value.trim())
        } else {
            None
        }
    });

    let inner = inner.trim_start_matches('\n');
    let (head, body) = inner.split_once("\n\n").unwrap_or((inner, ""));
    let status = head
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()?;

    Some(BatchPart {
        index,
        status,
        body: body.trim().to_string(),
    })
}

/// Map `<response-item-N>` (or `<item-N>`) back to `N`
fn item_index(content_id: &str) -> Option<usize> {
    let id = content_id.trim_start_matches('<').trim_end_matches('>');
    let id = id.strip_prefix("response-").unwrap_or(id);
    id.strip_prefix("item-")?.parse().ok()
}
