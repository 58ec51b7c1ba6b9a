//! Gantt-style history of a GitHub repository's issues.
//!
//! [`sync`] keeps a local cache of every issue up to date; [`derive`] and
//! [`chart`] turn that cache into one bar per issue, colored by state and
//! age.

pub mod chart;
pub mod config;
pub mod db;
pub mod derive;
pub mod models;
pub mod sync;
pub mod tracker;
