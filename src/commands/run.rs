use anyhow::Result;

use ghantt::chart::ChartBackend;
use ghantt::config::Config;
use ghantt::tracker::IssueSource;

use super::{fetch, graph};

/// Sync the cache, then chart it. A failed render keeps the synced cache.
pub fn run(config: &Config, source: &dyn IssueSource, backend: &dyn ChartBackend) -> Result<()> {
    fetch::run(config, source)?;
    let chart = graph::run(config, backend)?;
    println!("Charted {} issues", chart.marks.len());
    Ok(())
}
