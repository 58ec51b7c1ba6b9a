pub mod export;
pub mod fetch;
pub mod graph;
pub mod list;
pub mod run;
