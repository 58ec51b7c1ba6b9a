use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use ghantt::config::Config;
use ghantt::db;
use ghantt::derive::{self, DrawableIssue};
use ghantt::models::{IssueState, RawIssue};

const EXPORT_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Markdown,
}

#[derive(Serialize, Deserialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub repository: String,
    pub issues: Vec<RawIssue>,
}

pub fn run(config: &Config, format: Format, output_path: Option<&str>) -> Result<()> {
    let issues = db::load_collection(&config.cache_path())?;
    let count = issues.len();

    let content = match format {
        Format::Json => to_json(config, issues)?,
        Format::Markdown => to_markdown(config, &issues, Utc::now()),
    };

    match output_path {
        Some(path) => {
            fs::write(path, content).context("Failed to write export file")?;
            eprintln!("Exported {} issues to {}", count, path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", content)?;
        }
    }
    Ok(())
}

fn to_json(config: &Config, issues: Vec<RawIssue>) -> Result<String> {
    let data = ExportData {
        version: EXPORT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        repository: config.repository(),
        issues,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

fn to_markdown(config: &Config, issues: &[RawIssue], now: DateTime<Utc>) -> String {
    let mut marks = derive::derive_all(issues, now);
    marks.sort_by(|a, b| b.number.cmp(&a.number));

    let mut md = String::new();
    md.push_str(&format!("# {} issues\n\n", config.repository()));
    md.push_str(&format!(
        "Exported: {}\n\n",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let open: Vec<_> = marks.iter().filter(|m| m.state == IssueState::Open).collect();
    let closed: Vec<_> = marks.iter().filter(|m| m.state == IssueState::Closed).collect();

    if !open.is_empty() {
        md.push_str("## Open\n\n");
        for mark in &open {
            write_issue_md(&mut md, mark);
        }
        md.push('\n');
    }

    if !closed.is_empty() {
        md.push_str("## Closed\n\n");
        for mark in &closed {
            write_issue_md(&mut md, mark);
        }
        md.push('\n');
    }

    md
}

fn write_issue_md(md: &mut String, mark: &DrawableIssue) {
    let checkbox = match mark.state {
        IssueState::Closed => "[x]",
        IssueState::Open => "[ ]",
    };
    let link = match &mark.pull_request_url {
        Some(url) => format!(" ([PR]({}))", url),
        None => String::new(),
    };
    md.push_str(&format!(
        "- {} #{}: {}{} - open {:.1} days, created {}\n",
        checkbox, mark.number, mark.title, link, mark.width, mark.tooltip_text
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ghantt::db::Database;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup_config() -> (Config, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut config = Config::new("numba", "numba");
        config.data_dir = dir.path().to_path_buf();
        (config, dir)
    }

    fn issues() -> Vec<RawIssue> {
        vec![
            serde_json::from_value(json!({
                "number": 10,
                "title": "Segfault in nopython mode",
                "state": "open",
                "created_at": "2014-01-01T00:00:00Z",
                "updated_at": "2014-01-01T00:00:00Z",
                "labels": [{"name": "bug"}],
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "number": 11,
                "title": "Fix segfault",
                "state": "closed",
                "created_at": "2014-01-02T00:00:00Z",
                "updated_at": "2014-01-04T00:00:00Z",
                "closed_at": "2014-01-04T00:00:00Z",
                "pull_request": {"html_url": "https://github.com/numba/numba/pull/11"},
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_run_json_to_file() {
        let (config, dir) = setup_config();
        Database::open(&config.cache_path())
            .unwrap()
            .replace_issues(&issues())
            .unwrap();

        let output_path = dir.path().join("export.json");
        run(&config, Format::Json, Some(output_path.to_str().unwrap())).unwrap();

        let content = fs::read_to_string(&output_path).unwrap();
        let data: ExportData = serde_json::from_str(&content).unwrap();
        assert_eq!(data.version, 1);
        assert_eq!(data.repository, "numba/numba");
        assert_eq!(data.issues, issues());
        assert_eq!(data.issues[0].extra["labels"][0]["name"], "bug");
    }

    #[test]
    fn test_run_json_without_cache() {
        let (config, dir) = setup_config();
        let output_path = dir.path().join("export.json");
        run(&config, Format::Json, Some(output_path.to_str().unwrap())).unwrap();
        let data: ExportData =
            serde_json::from_str(&fs::read_to_string(&output_path).unwrap()).unwrap();
        assert!(data.issues.is_empty());
    }

    #[test]
    fn test_markdown_groups_by_state() {
        let (config, _dir) = setup_config();
        let now = Utc.with_ymd_and_hms(2014, 1, 11, 0, 0, 0).unwrap();
        let md = to_markdown(&config, &issues(), now);

        assert!(md.starts_with("# numba/numba issues"));
        let open_at = md.find("## Open").unwrap();
        let closed_at = md.find("## Closed").unwrap();
        assert!(open_at < closed_at);
        assert!(md.contains("- [ ] #10: Segfault in nopython mode - open 10.0 days, created 10 days ago"));
        assert!(md.contains("- [x] #11: Fix segfault ([PR](https://github.com/numba/numba/pull/11)) - open 2.0 days"));
    }

    #[test]
    fn test_markdown_empty() {
        let (config, _dir) = setup_config();
        let md = to_markdown(&config, &[], Utc::now());
        assert!(!md.contains("## Open"));
        assert!(!md.contains("## Closed"));
    }
}
