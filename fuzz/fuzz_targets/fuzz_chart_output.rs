#![no_main]

//! Fuzz target for chart rendering.
//!
//! Feeds arbitrary titles, numbers and timestamps through normalization,
//! derivation and HTML output. Catches panics from odd timestamps and
//! checks that every drawable issue ends up as exactly one bar, whatever
//! markup its title contains.

use arbitrary::Arbitrary;
use chrono::{DateTime, Duration, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use ghantt::chart::{to_html, Chart};
use ghantt::derive::derive_all;
use ghantt::models::{IssueState, RawIssue};

#[derive(Arbitrary, Debug)]
struct FuzzIssue {
    number: u16,
    title: String,
    closed: bool,
    /// Minutes before the fixed "now" the issue was created
    created_minutes_ago: i32,
    /// Minutes between creation and close; may be negative
    open_minutes: i32,
    pull_request: bool,
}

fuzz_target!(|input: Vec<FuzzIssue>| {
    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let issues: Vec<RawIssue> = input
        .iter()
        .take(200)
        .map(|f| {
            let created_at = now - Duration::minutes(f.created_minutes_ago as i64);
            RawIssue {
                number: f.number as u64,
                title: f.title.clone(),
                state: if f.closed {
                    IssueState::Closed
                } else {
                    IssueState::Open
                },
                assignee: None,
                created_at,
                updated_at: created_at,
                closed_at: f
                    .closed
                    .then(|| created_at + Duration::minutes(f.open_minutes as i64)),
                pull_request: f
                    .pull_request
                    .then(|| serde_json::json!({ "html_url": f.title.clone() })),
                extra: serde_json::Map::new(),
            }
        })
        .collect();

    let marks = derive_all(&issues, now);
    let count = marks.len();
    let html = to_html(&Chart::new("fuzz/fuzz", marks));

    assert_eq!(html.matches("<rect class=\"issue\"").count(), count);
});
