//! Mail crate - Business logic for counting Gmail spam
//!
//! This crate provides platform-independent functionality including:
//! - OAuth2 credential provider with on-disk persistence
//! - Gmail API client (paginated listing, single and batched gets)
//! - Normalization of message timestamps to calendar dates
//! - The spam tally engine and its pluggable date resolution strategies
//!
//! This crate has no console or UI dependencies; the `spamcount` binary
//! owns printing and progress display.

pub mod config;
pub mod gmail;
pub mod models;
pub mod tally;

pub use self::config::GmailCredentials;
pub use gmail::{
    Credential, GmailAuth, GmailClient, MessageFormat, MessageSource, load_credential,
    save_credential,
};
pub use models::MessageId;
pub use tally::{
    BatchResolver, DailyCounts, DateHeaderResolver, DateResolver, InternalDateResolver,
    NoProgress, Progress, SPAM_LABEL, TallyError, WINDOW_DAYS, aggregate, list_all_references,
    tally, within_window,
};
