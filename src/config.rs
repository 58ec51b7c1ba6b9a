use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::models::RawIssue;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Which timestamp of the cached records bounds the next incremental fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WatermarkField {
    /// Newest `created_at` in the cache. Issues that were only updated after
    /// the last sync may be missed.
    #[default]
    Created,
    /// Newest `updated_at` in the cache.
    Updated,
}

impl WatermarkField {
    pub fn of(self, issue: &RawIssue) -> DateTime<Utc> {
        match self {
            WatermarkField::Created => issue.created_at,
            WatermarkField::Updated => issue.updated_at,
        }
    }
}

/// Everything a run needs to know about the repository it is looking at.
#[derive(Debug, Clone)]
pub struct Config {
    pub owner: String,
    pub repo: String,
    /// Account used when asking for credentials interactively.
    pub login_user: Option<String>,
    /// Directory holding the cache and the rendered chart.
    pub data_dir: PathBuf,
    pub api_url: String,
    pub watermark_field: WatermarkField,
}

impl Config {
    pub fn new(owner: &str, repo: &str) -> Self {
        Config {
            owner: owner.to_string(),
            repo: repo.to_string(),
            login_user: None,
            data_dir: PathBuf::from("."),
            api_url: DEFAULT_API_URL.to_string(),
            watermark_field: WatermarkField::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("owner", &self.owner), ("repo", &self.repo)] {
            if value.trim().is_empty() {
                bail!("Repository {} must not be empty", name);
            }
            if value.contains(['/', '\\']) || value == "." || value == ".." {
                bail!("Invalid repository {} '{}'", name, value);
            }
        }
        Ok(())
    }

    /// `owner/repo`, as shown on GitHub.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn file_stem(&self) -> String {
        format!("{}.{}", self.owner, self.repo)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.file_stem()))
    }

    pub fn chart_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.html", self.file_stem()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_follow_repository() {
        let mut config = Config::new("numba", "llvmlite");
        config.data_dir = PathBuf::from("/tmp/ghantt");
        assert_eq!(config.repository(), "numba/llvmlite");
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/ghantt/numba.llvmlite.db"));
        assert_eq!(config.chart_path(), PathBuf::from("/tmp/ghantt/numba.llvmlite.html"));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(Config::new("numba", "numba").validate().is_ok());
        assert!(Config::new("", "numba").validate().is_err());
        assert!(Config::new("numba", "  ").validate().is_err());
        assert!(Config::new("numba/numba", "x").validate().is_err());
        assert!(Config::new("numba", "..").validate().is_err());
    }

    #[test]
    fn test_default_watermark_is_created_at() {
        assert_eq!(Config::new("a", "b").watermark_field, WatermarkField::Created);
    }
}
