//! Turns cached issues into render-ready marks.

use chrono::{DateTime, Utc};

use crate::models::{IssueRecord, IssueState, RawIssue};

/// Open issues get redder with age.
pub const OPEN_COLORS: [&str; 5] = ["#FF7940", "#FF4C00", "#BF5B30", "#A63100", "#993322"];
pub const CLOSED_COLOR: &str = "#60D4AE";

/// Open issues older than this all share the last color.
pub const AGE_WINDOW_DAYS: f64 = 360.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawableIssue {
    pub number: u64,
    pub state: IssueState,
    /// Center of the bar, in days relative to now.
    pub position_x: f64,
    pub position_y: f64,
    /// Bar length; same as the issue's duration in days.
    pub width: f64,
    pub color: &'static str,
    pub title: String,
    pub tooltip_text: String,
    pub pull_request_url: Option<String>,
}

/// Palette index for an open issue that has been open `duration_days`.
pub fn open_bucket(duration_days: f64, palette_len: usize) -> usize {
    if palette_len == 0 {
        return 0;
    }
    let days = duration_days.clamp(0.0, AGE_WINDOW_DAYS);
    let bucket = (days * palette_len as f64 / AGE_WINDOW_DAYS - 1.0).floor();
    (bucket.max(0.0) as usize).min(palette_len - 1)
}

/// Smallest open duration, in days, that lands in `bucket`.
pub fn bucket_start_days(bucket: usize, palette_len: usize) -> f64 {
    if bucket == 0 {
        return 0.0;
    }
    (bucket + 1) as f64 * AGE_WINDOW_DAYS / palette_len as f64
}

pub fn assign_color(record: &IssueRecord, now: DateTime<Utc>) -> &'static str {
    match record.state {
        IssueState::Open => OPEN_COLORS[open_bucket(record.duration_days(now), OPEN_COLORS.len())],
        IssueState::Closed => CLOSED_COLOR,
    }
}

pub fn derive(record: &IssueRecord, now: DateTime<Utc>) -> DrawableIssue {
    let duration = record.duration_days(now);
    let age = record.age_days(now);

    DrawableIssue {
        number: record.number,
        state: record.state,
        position_x: age + duration / 2.0,
        position_y: record.number as f64,
        width: duration,
        color: assign_color(record, now),
        title: record.title.clone(),
        tooltip_text: format!("{} days ago", age.abs().round() as i64),
        pull_request_url: record.pull_request_url.clone(),
    }
}

/// Derive every cached issue against one `now`.
///
/// Records that fail normalization are skipped with a warning.
pub fn derive_all(issues: &[RawIssue], now: DateTime<Utc>) -> Vec<DrawableIssue> {
    issues
        .iter()
        .filter_map(|raw| match IssueRecord::try_from(raw) {
            Ok(record) => Some(derive(&record, now)),
            Err(e) => {
                tracing::warn!("skipping issue: {}", e);
                None
            }
        })
        .collect()
}
