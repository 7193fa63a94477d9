//! Integration tests for the mail crate
//!
//! These tests drive the tally engine end to end against an in-memory
//! message source standing in for the Gmail API.

use anyhow::{Result, bail};
use chrono::{NaiveDate, TimeZone, Utc};
use mail::gmail::api::{GmailMessage, Header, ListMessagesResponse, MessagePayload, MessageRef};
use mail::{
    BatchResolver, DateHeaderResolver, DateResolver, InternalDateResolver, MessageFormat,
    MessageId, MessageSource, NoProgress, Progress, SPAM_LABEL, TallyError, WINDOW_DAYS,
    list_all_references, tally,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// What the fake server knows about one message
#[derive(Clone, Default)]
struct StoredMessage {
    internal_date: Option<i64>,
    date_header: Option<String>,
}

/// In-memory stand-in for the Gmail API
#[derive(Default)]
struct FakeSource {
    pages: Vec<Vec<String>>,
    messages: HashMap<String, StoredMessage>,
    fail_listing_page: Option<usize>,
    failing_gets: HashSet<String>,
    /// Batch round-trips fail as a whole
    fail_batches: bool,
    /// Remote calls in the order they were made
    calls: RefCell<Vec<String>>,
    batch_sizes: RefCell<Vec<usize>>,
}

impl FakeSource {
    /// One page per inner vector, each message received at noon UTC on its date
    fn with_pages(pages: Vec<Vec<(&str, NaiveDate)>>) -> Self {
        let mut source = FakeSource::default();
        for page in pages {
            let mut ids = Vec::new();
            for (id, date) in page {
                ids.push(id.to_string());
                source.messages.insert(
                    id.to_string(),
                    StoredMessage {
                        internal_date: Some(noon_utc_millis(date)),
                        date_header: Some(date.format("%a, %-d %b %Y 12:00:00 +0000").to_string()),
                    },
                );
            }
            source.pages.push(ids);
        }
        source
    }

    fn single_page(messages: Vec<(&str, NaiveDate)>) -> Self {
        Self::with_pages(vec![messages])
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn build_message(&self, id: &MessageId, format: MessageFormat) -> Result<GmailMessage> {
        if self.failing_gets.contains(id.as_str()) {
            bail!("HTTP 500 for message {}", id);
        }
        let Some(stored) = self.messages.get(id.as_str()) else {
            bail!("HTTP 404 for message {}", id);
        };

        let payload = match format {
            MessageFormat::Minimal => None,
            MessageFormat::DateHeader => Some(MessagePayload {
                headers: stored.date_header.as_ref().map(|value| {
                    vec![Header {
                        name: "Date".to_string(),
                        value: value.clone(),
                    }]
                }),
                mime_type: None,
            }),
        };

        Ok(GmailMessage {
            id: id.as_str().to_string(),
            internal_date: stored.internal_date.map(|ms| ms.to_string()),
            payload,
            ..Default::default()
        })
    }
}

impl MessageSource for FakeSource {
    fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        assert_eq!(label, SPAM_LABEL);
        let index = match page_token {
            None => 0,
            Some(token) => token.trim_start_matches("page-").parse()?,
        };
        self.calls.borrow_mut().push(format!("list:{}", index));

        if self.fail_listing_page == Some(index) {
            bail!("Failed to send list messages request: connection reset");
        }

        let ids = self.pages.get(index).cloned().unwrap_or_default();
        Ok(ListMessagesResponse {
            messages: if ids.is_empty() {
                None
            } else {
                Some(ids.into_iter().map(MessageRef::new).collect())
            },
            next_page_token: if index + 1 < self.pages.len() {
                Some(format!("page-{}", index + 1))
            } else {
                None
            },
            result_size_estimate: None,
        })
    }

    fn get_message(&self, id: &MessageId, format: MessageFormat) -> Result<GmailMessage> {
        self.calls.borrow_mut().push(format!("get:{}", id));
        self.build_message(id, format)
    }

    fn batch_get_messages(
        &self,
        ids: &[MessageId],
        format: MessageFormat,
        on_result: &mut dyn FnMut(&MessageId, Result<GmailMessage>),
    ) -> Result<()> {
        self.calls.borrow_mut().push(format!("batch:{}", ids.len()));
        self.batch_sizes.borrow_mut().push(ids.len());
        if self.fail_batches {
            bail!("Failed to send batch request: connection reset");
        }
        for id in ids {
            on_result(id, self.build_message(id, format));
        }
        Ok(())
    }
}

/// Counts progress notifications
#[derive(Default)]
struct CountingProgress {
    ticks: usize,
    finished: Option<usize>,
}

impl Progress for CountingProgress {
    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn finish(&mut self, processed: usize) {
        self.finished = Some(processed);
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn noon_utc_millis(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
        .timestamp_millis()
}

fn resolvers() -> Vec<(&'static str, Box<dyn DateResolver>)> {
    vec![
        ("internal", Box::new(InternalDateResolver::with_timezone(Utc))),
        ("batch", Box::new(BatchResolver::with_timezone(Utc))),
        ("header", Box::new(DateHeaderResolver::new())),
    ]
}

#[test]
fn test_end_to_end_every_strategy() {
    let today = date(2024, 1, 31);

    for (name, resolver) in resolvers() {
        let source = FakeSource::single_page(vec![
            ("a", date(2024, 1, 5)),
            ("b", date(2024, 1, 5)),
            ("c", date(2024, 1, 15)),
        ]);

        let counts = tally(&source, resolver.as_ref(), SPAM_LABEL, today, &mut NoProgress)
            .unwrap_or_else(|e| panic!("{} strategy failed: {}", name, e));

        assert_eq!(
            counts.iter().collect::<Vec<_>>(),
            vec![(date(2024, 1, 5), 2), (date(2024, 1, 15), 1)],
            "{} strategy",
            name
        );
    }
}

#[test]
fn test_empty_listing_is_empty_table() {
    let source = FakeSource::default();
    let resolver = InternalDateResolver::with_timezone(Utc);
    let mut progress = CountingProgress::default();

    let counts = tally(&source, &resolver, SPAM_LABEL, date(2024, 1, 31), &mut progress).unwrap();

    assert!(counts.is_empty());
    assert_eq!(source.calls(), vec!["list:0"]);
    assert_eq!(progress.ticks, 0);
}

#[test]
fn test_listing_error_aborts_without_resolving() {
    let mut source = FakeSource::with_pages(vec![
        vec![("a", date(2024, 1, 5))],
        vec![("b", date(2024, 1, 6))],
        vec![("c", date(2024, 1, 7))],
    ]);
    source.fail_listing_page = Some(1);
    let resolver = InternalDateResolver::with_timezone(Utc);

    let result = tally(&source, &resolver, SPAM_LABEL, date(2024, 1, 31), &mut NoProgress);

    match result {
        Err(TallyError::Listing(e)) => assert!(e.to_string().contains("connection reset")),
        other => panic!("expected listing error, got {:?}", other),
    }
    assert_eq!(source.calls(), vec!["list:0", "list:1"]);
}

#[test]
fn test_pagination_collects_all_pages_before_resolving() {
    let source = FakeSource::with_pages(vec![
        vec![("a", date(2024, 1, 1)), ("b", date(2024, 1, 2))],
        vec![("c", date(2024, 1, 3)), ("d", date(2024, 1, 4))],
        vec![("e", date(2024, 1, 5)), ("f", date(2024, 1, 6))],
    ]);

    let references = list_all_references(&source, SPAM_LABEL).unwrap();
    let ids: Vec<&str> = references.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);

    source.calls.borrow_mut().clear();
    let resolver = InternalDateResolver::with_timezone(Utc);
    let counts = tally(&source, &resolver, SPAM_LABEL, date(2024, 1, 31), &mut NoProgress).unwrap();
    assert_eq!(counts.total(), 6);

    let calls = source.calls();
    assert_eq!(calls.len(), 9);
    assert_eq!(&calls[..3], &["list:0", "list:1", "list:2"]);
    assert!(calls[3..].iter().all(|c| c.starts_with("get:")));
}

#[test]
fn test_counts_stable_under_permutation() {
    let today = date(2024, 1, 31);
    let messages = vec![
        ("a", date(2024, 1, 3)),
        ("b", date(2024, 1, 9)),
        ("c", date(2024, 1, 3)),
        ("d", date(2024, 1, 30)),
        ("e", date(2023, 11, 2)),
        ("f", date(2024, 1, 9)),
    ];
    let mut reversed = messages.clone();
    reversed.reverse();
    let mut rotated = messages.clone();
    rotated.rotate_left(2);

    let resolver = BatchResolver::with_timezone(Utc).batch_size(4);
    let run = |messages: Vec<(&str, NaiveDate)>| {
        let source = FakeSource::single_page(messages);
        tally(&source, &resolver, SPAM_LABEL, today, &mut NoProgress).unwrap()
    };

    let baseline = run(messages);
    assert_eq!(baseline, run(reversed));
    assert_eq!(baseline, run(rotated));
    assert_eq!(baseline.total(), 5);
}

#[test]
fn test_every_counted_date_is_within_window() {
    let today = date(2024, 3, 1);
    let messages: Vec<(String, NaiveDate)> = (-5i64..60)
        .map(|back| (format!("m{}", back), today - chrono::Duration::days(back)))
        .collect();
    let source = FakeSource::single_page(
        messages
            .iter()
            .map(|(id, d)| (id.as_str(), *d))
            .collect(),
    );
    let resolver = InternalDateResolver::with_timezone(Utc);

    let counts = tally(&source, &resolver, SPAM_LABEL, today, &mut NoProgress).unwrap();

    assert_eq!(counts.len(), (WINDOW_DAYS + 1) as usize);
    for (day, count) in counts.iter() {
        let age = (today - day).num_days();
        assert!((0..=WINDOW_DAYS).contains(&age), "{} is {} days old", day, age);
        assert_eq!(count, 1);
    }
}

#[test]
fn test_header_strategy_skips_unparseable_dates() {
    let mut source = FakeSource::single_page(vec![
        ("good", date(2023, 10, 20)),
        ("offset", date(2023, 10, 21)),
        ("bad", date(2023, 10, 22)),
        ("missing", date(2023, 10, 22)),
    ]);
    source.messages.get_mut("good").unwrap().date_header =
        Some("Fri, 20 Oct 2023 15:01:23 -0700".to_string());
    source.messages.get_mut("offset").unwrap().date_header =
        Some("21 Oct 2023 00:48:13 +0200".to_string());
    source.messages.get_mut("bad").unwrap().date_header = Some("garbage".to_string());
    source.messages.get_mut("missing").unwrap().date_header = None;
    let mut progress = CountingProgress::default();

    let counts = tally(
        &source,
        &DateHeaderResolver::new(),
        SPAM_LABEL,
        date(2023, 10, 31),
        &mut progress,
    )
    .unwrap();

    assert_eq!(
        counts.iter().collect::<Vec<_>>(),
        vec![(date(2023, 10, 20), 1), (date(2023, 10, 21), 1)]
    );
    assert_eq!(progress.ticks, 4);
    assert_eq!(progress.finished, Some(4));
}

#[test]
fn test_header_strategy_get_failure_is_fatal() {
    let mut source = FakeSource::single_page(vec![
        ("a", date(2024, 1, 5)),
        ("b", date(2024, 1, 6)),
    ]);
    source.failing_gets.insert("a".to_string());

    let result = tally(
        &source,
        &DateHeaderResolver::new(),
        SPAM_LABEL,
        date(2024, 1, 31),
        &mut NoProgress,
    );

    assert!(matches!(result, Err(TallyError::Resolution(_))));
}

#[test]
fn test_batch_of_fifty_invokes_fifty_callbacks() {
    let today = date(2024, 1, 31);
    let ids: Vec<String> = (0..50).map(|i| format!("m{:02}", i)).collect();
    let source = FakeSource::single_page(
        ids.iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), date(2024, 1, 1 + (i % 30) as u32)))
            .collect(),
    );
    let references: Vec<MessageRef> = ids.iter().map(MessageRef::new).collect();
    let mut progress = CountingProgress::default();

    let dates = BatchResolver::with_timezone(Utc)
        .resolve_dates(&source, &references, &mut progress)
        .unwrap();

    assert_eq!(progress.ticks, 50);
    assert_eq!(dates.len(), 50);
    assert_eq!(*source.batch_sizes.borrow(), vec![50]);

    let counts = mail::aggregate(today, dates.into_values());
    assert_eq!(counts.total(), 50);
}

#[test]
fn test_batches_are_capped_at_fifty() {
    let messages: Vec<(String, NaiveDate)> = (0..120)
        .map(|i| (format!("m{}", i), date(2024, 1, 20)))
        .collect();
    let source = FakeSource::single_page(
        messages
            .iter()
            .map(|(id, d)| (id.as_str(), *d))
            .collect(),
    );

    let counts = tally(
        &source,
        &BatchResolver::with_timezone(Utc),
        SPAM_LABEL,
        date(2024, 1, 31),
        &mut NoProgress,
    )
    .unwrap();

    assert_eq!(counts.get(date(2024, 1, 20)), 120);
    assert_eq!(*source.batch_sizes.borrow(), vec![50, 50, 20]);
}

#[test]
fn test_batch_sub_request_failure_skips_only_that_message() {
    let mut source = FakeSource::single_page(vec![
        ("a", date(2024, 1, 5)),
        ("b", date(2024, 1, 6)),
        ("c", date(2024, 1, 7)),
        ("d", date(2024, 1, 8)),
    ]);
    source.failing_gets.insert("b".to_string());
    let mut progress = CountingProgress::default();

    let counts = tally(
        &source,
        &BatchResolver::with_timezone(Utc).batch_size(3),
        SPAM_LABEL,
        date(2024, 1, 31),
        &mut progress,
    )
    .unwrap();

    assert_eq!(
        counts.iter().collect::<Vec<_>>(),
        vec![
            (date(2024, 1, 5), 1),
            (date(2024, 1, 7), 1),
            (date(2024, 1, 8), 1),
        ]
    );
    assert_eq!(counts.get(date(2024, 1, 6)), 0);
    // Both batches were sent and every sub-request was reported
    assert_eq!(progress.ticks, 4);
    assert_eq!(*source.batch_sizes.borrow(), vec![3, 1]);
}

#[test]
fn test_batch_round_trip_failure_is_fatal() {
    let mut source = FakeSource::single_page(vec![
        ("a", date(2024, 1, 5)),
        ("b", date(2024, 1, 6)),
        ("c", date(2024, 1, 7)),
        ("d", date(2024, 1, 8)),
    ]);
    source.fail_batches = true;
    let mut progress = CountingProgress::default();

    let result = tally(
        &source,
        &BatchResolver::with_timezone(Utc).batch_size(3),
        SPAM_LABEL,
        date(2024, 1, 31),
        &mut progress,
    );

    match result {
        Err(TallyError::Resolution(e)) => assert!(format!("{:#}", e).contains("connection reset")),
        other => panic!("expected resolution error, got {:?}", other),
    }
    assert_eq!(progress.ticks, 0);
    assert_eq!(*source.batch_sizes.borrow(), vec![3]);
}

#[test]
fn test_internal_date_strategy_requires_internal_date() {
    let mut source = FakeSource::single_page(vec![("a", date(2024, 1, 5))]);
    source.messages.get_mut("a").unwrap().internal_date = None;

    let result = tally(
        &source,
        &InternalDateResolver::with_timezone(Utc),
        SPAM_LABEL,
        date(2024, 1, 31),
        &mut NoProgress,
    );

    assert!(matches!(result, Err(TallyError::Resolution(_))));
}
