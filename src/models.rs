use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueState::Open => f.write_str("open"),
            IssueState::Closed => f.write_str("closed"),
        }
    }
}

/// An issue exactly as the tracker returned it.
///
/// Fields the tracker sends that are not modelled here are kept in `extra`
/// so the record round-trips through the cache unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    #[serde(default)]
    pub assignee: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Records the chart refuses to draw.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IssueError {
    #[error("issue number must be positive")]
    InvalidNumber,
    #[error("issue #{number} closed at {closed_at} before it was created at {created_at}")]
    ClosedBeforeCreated {
        number: u64,
        created_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    },
    #[error("issue #{number} is closed but has no closed_at timestamp")]
    MissingClosedAt { number: u64 },
}

/// Normalized view of a [`RawIssue`], built fresh for every render.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pull_request_url: Option<String>,
}

impl TryFrom<&RawIssue> for IssueRecord {
    type Error = IssueError;

    fn try_from(raw: &RawIssue) -> Result<Self, Self::Error> {
        if raw.number == 0 {
            return Err(IssueError::InvalidNumber);
        }

        // A reopened issue can still carry the timestamp of its last close.
        let closed_at = match raw.state {
            IssueState::Open => None,
            IssueState::Closed => {
                let closed_at = raw.closed_at.ok_or(IssueError::MissingClosedAt {
                    number: raw.number,
                })?;
                if closed_at < raw.created_at {
                    return Err(IssueError::ClosedBeforeCreated {
                        number: raw.number,
                        created_at: raw.created_at,
                        closed_at,
                    });
                }
                Some(closed_at)
            }
        };

        Ok(IssueRecord {
            number: raw.number,
            title: raw.title.clone(),
            state: raw.state,
            assignee: raw
                .assignee
                .as_ref()
                .and_then(|a| a.get("login"))
                .and_then(Value::as_str)
                .map(String::from),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at,
            pull_request_url: raw
                .pull_request
                .as_ref()
                .map(|pr| pull_request_link(pr, raw.number)),
        })
    }
}

impl IssueRecord {
    /// How long the issue has been (or was) open, in fractional days.
    pub fn duration_days(&self, now: DateTime<Utc>) -> f64 {
        let end = self.closed_at.unwrap_or(now);
        fractional_days(end - self.created_at).max(0.0)
    }

    /// Offset from `now` back to creation, in fractional days. Negative for
    /// anything created in the past.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        fractional_days(self.created_at - now)
    }
}

fn pull_request_link(pr: &Value, number: u64) -> String {
    ["html_url", "url"]
        .iter()
        .filter_map(|key| pr.get(key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("pull/{}", number))
}

pub fn fractional_days(delta: Duration) -> f64 {
    delta.num_milliseconds() as f64 / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn raw(value: Value) -> RawIssue {
        serde_json::from_value(value).unwrap()
    }

    fn closed_issue(days_open: i64) -> RawIssue {
        let created = t0();
        let closed = created + Duration::days(days_open);
        raw(json!({
            "number": 7,
            "title": "Crash on startup",
            "state": "closed",
            "assignee": {"login": "octocat", "id": 1},
            "created_at": created,
            "updated_at": closed,
            "closed_at": closed,
        }))
    }

    #[test]
    fn test_parse_github_issue() {
        let issue = raw(json!({
            "number": 42,
            "title": "Add support for arrays",
            "state": "open",
            "assignee": null,
            "created_at": "2014-03-01T12:00:00Z",
            "updated_at": "2014-03-02T12:00:00Z",
            "closed_at": null,
            "comments": 3,
            "labels": [{"name": "bug"}],
        }));
        assert_eq!(issue.number, 42);
        assert_eq!(issue.state, IssueState::Open);
        assert!(!issue.is_pull_request());
        assert_eq!(issue.extra.get("comments"), Some(&json!(3)));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let issue = raw(json!({
            "number": 1,
            "title": "x",
            "state": "open",
            "created_at": "2014-03-01T12:00:00Z",
            "updated_at": "2014-03-01T12:00:00Z",
            "milestone": {"title": "0.13"},
        }));
        let back: RawIssue = serde_json::from_str(&serde_json::to_string(&issue).unwrap()).unwrap();
        assert_eq!(back, issue);
        assert_eq!(back.extra["milestone"]["title"], "0.13");
    }

    #[test]
    fn test_missing_created_at_is_a_parse_error() {
        let result: Result<RawIssue, _> = serde_json::from_value(json!({
            "number": 1,
            "title": "x",
            "state": "open",
            "updated_at": "2014-03-01T12:00:00Z",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_from_closed_issue() {
        let record = IssueRecord::try_from(&closed_issue(5)).unwrap();
        assert_eq!(record.state, IssueState::Closed);
        assert_eq!(record.assignee.as_deref(), Some("octocat"));
        assert_eq!(record.closed_at, Some(t0() + Duration::days(5)));
        assert_eq!(record.pull_request_url, None);
    }

    #[test]
    fn test_pull_request_url() {
        let mut issue = closed_issue(1);
        issue.pull_request = Some(json!({"html_url": "https://github.com/numba/numba/pull/7"}));
        let record = IssueRecord::try_from(&issue).unwrap();
        assert_eq!(
            record.pull_request_url.as_deref(),
            Some("https://github.com/numba/numba/pull/7")
        );

        issue.pull_request = Some(json!({}));
        let record = IssueRecord::try_from(&issue).unwrap();
        assert_eq!(record.pull_request_url.as_deref(), Some("pull/7"));
    }

    #[test]
    fn test_reopened_issue_drops_closed_at() {
        let mut issue = closed_issue(3);
        issue.state = IssueState::Open;
        let record = IssueRecord::try_from(&issue).unwrap();
        assert_eq!(record.closed_at, None);
    }

    #[test]
    fn test_closed_before_created_is_rejected() {
        let mut issue = closed_issue(0);
        issue.closed_at = Some(t0() - Duration::hours(1));
        assert!(matches!(
            IssueRecord::try_from(&issue),
            Err(IssueError::ClosedBeforeCreated { number: 7, .. })
        ));
    }

    #[test]
    fn test_closed_without_timestamp_is_rejected() {
        let mut issue = closed_issue(2);
        issue.closed_at = None;
        assert_eq!(
            IssueRecord::try_from(&issue),
            Err(IssueError::MissingClosedAt { number: 7 })
        );
    }

    #[test]
    fn test_zero_number_is_rejected() {
        let mut issue = closed_issue(2);
        issue.number = 0;
        assert_eq!(IssueRecord::try_from(&issue), Err(IssueError::InvalidNumber));
    }

    #[test]
    fn test_age_days_is_negative_offset() {
        let mut issue = closed_issue(2);
        issue.state = IssueState::Open;
        let record = IssueRecord::try_from(&issue).unwrap();
        let now = t0() + Duration::hours(36);
        assert!((record.age_days(now) + 1.5).abs() < 1e-9);
        assert!((record.duration_days(now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_open_duration_never_negative() {
        let mut issue = closed_issue(2);
        issue.state = IssueState::Open;
        let record = IssueRecord::try_from(&issue).unwrap();
        assert_eq!(record.duration_days(t0() - Duration::days(1)), 0.0);
    }

    proptest! {
        #[test]
        fn prop_closed_duration_ignores_now(minutes in 0i64..2_000_000, offset in -1000i64..1000) {
            let mut issue = closed_issue(0);
            issue.closed_at = Some(t0() + Duration::minutes(minutes));
            let record = IssueRecord::try_from(&issue).unwrap();
            let expected = minutes as f64 / (24.0 * 60.0);
            let now = t0() + Duration::days(offset);
            prop_assert!((record.duration_days(now) - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_open_duration_tracks_now(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            let mut issue = closed_issue(0);
            issue.state = IssueState::Open;
            let record = IssueRecord::try_from(&issue).unwrap();
            let (early, late) = (a.min(b), a.max(b));
            let d_early = record.duration_days(t0() + Duration::minutes(early));
            let d_late = record.duration_days(t0() + Duration::minutes(late));
            prop_assert!((d_late - late as f64 / (24.0 * 60.0)).abs() < 1e-9);
            prop_assert!(d_early <= d_late);
        }
    }
}
