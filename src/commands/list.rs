use anyhow::Result;
use chrono::{DateTime, Utc};

use ghantt::config::Config;
use ghantt::db;
use ghantt::models::{IssueRecord, IssueState, RawIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Status {
    All,
    Open,
    Closed,
}

impl Status {
    fn state(self) -> Option<IssueState> {
        match self {
            Status::All => None,
            Status::Open => Some(IssueState::Open),
            Status::Closed => Some(IssueState::Closed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Kind {
    All,
    Issues,
    Pulls,
}

pub fn run(config: &Config, status: Status, kind: Kind) -> Result<()> {
    let path = config.cache_path();
    let issues = db::load_collection(&path)?;
    let selected = filter(&issues, status.state(), kind);

    if let Some(at) = db::last_synced_at(&path)? {
        println!("Last synced {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if selected.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    let now = Utc::now();
    for issue in selected {
        println!("{}", format_row(issue, now));
    }

    Ok(())
}

fn filter(issues: &[RawIssue], state: Option<IssueState>, kind: Kind) -> Vec<&RawIssue> {
    let mut selected: Vec<&RawIssue> = issues
        .iter()
        .filter(|i| state.map_or(true, |s| i.state == s))
        .filter(|i| match kind {
            Kind::All => true,
            Kind::Issues => !i.is_pull_request(),
            Kind::Pulls => i.is_pull_request(),
        })
        .collect();
    selected.sort_by(|a, b| b.number.cmp(&a.number));
    selected
}

fn format_row(issue: &RawIssue, now: DateTime<Utc>) -> String {
    let state_display = format!("[{}]", issue.state);
    let kind = if issue.is_pull_request() { "PR" } else { "" };
    let (days, assignee) = match IssueRecord::try_from(issue) {
        Ok(record) => (
            format!("{:.0}d", record.duration_days(now)),
            record.assignee.map(|login| format!(" @{}", login)),
        ),
        Err(_) => ("?".to_string(), None),
    };
    format!(
        "#{:<5} {:8} {:2} {:<50} {:>6} {}{}",
        issue.number,
        state_display,
        kind,
        truncate(&issue.title, 50),
        days,
        issue.created_at.format("%Y-%m-%d"),
        assignee.unwrap_or_default()
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
