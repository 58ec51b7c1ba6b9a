use anyhow::Result;

use ghantt::config::Config;
use ghantt::sync::{self, SyncReport};
use ghantt::tracker::IssueSource;

pub fn run(config: &Config, source: &dyn IssueSource) -> Result<SyncReport> {
    println!("Fetching {}...", config.repository());

    let report = sync::sync(&config.cache_path(), source, config.watermark_field)?;

    match report.watermark {
        Some(since) => println!("Downloaded issues since {}", since.format("%Y-%m-%dT%H:%M:%SZ")),
        None => println!("Downloaded all issues"),
    }

    if report.written {
        println!(
            "Fetched {} ({} new, {} updated, {} unchanged), {} cached",
            report.fetched, report.added, report.replaced, report.unchanged, report.total
        );
    } else {
        println!("Nothing new, {} cached", report.total);
    }

    Ok(report)
}
