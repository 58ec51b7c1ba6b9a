use anyhow::Result;
use chrono::{DateTime, Utc};

use ghantt::chart::{Chart, ChartBackend};
use ghantt::config::Config;
use ghantt::db;
use ghantt::derive;

/// Build the chart for the cached issues as of `now`.
pub fn build_chart(config: &Config, now: DateTime<Utc>) -> Result<Chart> {
    let issues = db::load_collection(&config.cache_path())?;
    let marks = derive::derive_all(&issues, now);

    let skipped = issues.len() - marks.len();
    if skipped > 0 {
        eprintln!("Warning: skipped {} issue(s) with inconsistent timestamps", skipped);
    }

    Ok(Chart::new(&config.repository(), marks))
}

pub fn run(config: &Config, backend: &dyn ChartBackend) -> Result<Chart> {
    println!("Graphing...");
    let chart = build_chart(config, Utc::now())?;
    backend.render(&chart)?;
    Ok(chart)
}
