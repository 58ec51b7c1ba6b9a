//! Incremental fetch-and-merge of the issue cache.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::WatermarkField;
use crate::db::{self, Database};
use crate::models::RawIssue;
use crate::tracker::IssueSource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    /// Fetched records identical to the cached copy.
    pub unchanged: usize,
}

impl MergeOutcome {
    /// Whether the collection differs from before the merge.
    pub fn changed(&self) -> bool {
        self.added + self.replaced > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub watermark: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub added: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub total: usize,
    /// False when nothing new or changed came back and the cache file was
    /// left alone.
    pub written: bool,
}

/// Newest value of `field` in the collection; `None` means fetch everything.
pub fn watermark(issues: &[RawIssue], field: WatermarkField) -> Option<DateTime<Utc>> {
    issues.iter().map(|i| field.of(i)).max()
}

/// Fold `batch` into `collection` keyed by issue number.
///
/// A record whose number is already present replaces that entry wholesale,
/// in place, unless it is identical. Anything else is appended in batch
/// order.
pub fn merge(collection: &mut Vec<RawIssue>, batch: Vec<RawIssue>) -> MergeOutcome {
    let mut index: HashMap<u64, usize> = collection
        .iter()
        .enumerate()
        .map(|(pos, issue)| (issue.number, pos))
        .collect();
    let mut outcome = MergeOutcome::default();

    for issue in batch {
        match index.get(&issue.number) {
            Some(&pos) if collection[pos] == issue => outcome.unchanged += 1,
            Some(&pos) => {
                collection[pos] = issue;
                outcome.replaced += 1;
            }
            None => {
                index.insert(issue.number, collection.len());
                collection.push(issue);
                outcome.added += 1;
            }
        }
    }

    outcome
}

/// Bring the cache at `cache_path` up to date from `source`.
///
/// The whole batch is pulled before anything is written, so a tracker
/// failure leaves the cache as it was.
pub fn sync(
    cache_path: &Path,
    source: &dyn IssueSource,
    field: WatermarkField,
) -> Result<SyncReport> {
    let mut collection = db::load_collection(cache_path)?;
    let since = watermark(&collection, field);

    match since {
        Some(since) => tracing::info!(%since, cached = collection.len(), "incremental fetch"),
        None => tracing::info!("full fetch"),
    }

    let batch = source
        .fetch_issues(since)?
        .collect::<Result<Vec<RawIssue>>>()?;
    let fetched = batch.len();

    let outcome = merge(&mut collection, batch);

    if !outcome.changed() {
        tracing::info!(fetched, "nothing new");
        return Ok(SyncReport {
            watermark: since,
            fetched,
            added: 0,
            replaced: 0,
            unchanged: outcome.unchanged,
            total: collection.len(),
            written: false,
        });
    }

    if let Some(parent) = cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory {}", parent.display())
            })?;
        }
    }
    let mut db = Database::open(cache_path)?;
    db.replace_issues(&collection)?;
    db.set_last_synced(Utc::now())?;

    tracing::info!(
        fetched,
        added = outcome.added,
        replaced = outcome.replaced,
        unchanged = outcome.unchanged,
        total = collection.len(),
        "cache updated"
    );

    Ok(SyncReport {
        watermark: since,
        fetched,
        added: outcome.added,
        replaced: outcome.replaced,
        unchanged: outcome.unchanged,
        total: collection.len(),
        written: true,
    })
}
