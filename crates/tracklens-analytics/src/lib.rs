//! Tracked entity analytics query engine.
//!
//! A request is a set of string-encoded parameters (`dimension`, `filter`,
//! `headers`, `asc`, `desc`, paging and scope parameters). The engine turns
//! them into a [`planner::QueryPlan`], fetches the entities it needs through
//! the `tracklens-storage` traits, filters, sorts and pages the rows, and
//! assembles a [`grid::Grid`] with headers, stringified rows, row context and
//! a metadata dictionary.

pub mod config;
pub mod csv;
pub mod engine;
pub mod error;
pub mod filter;
pub mod format;
pub mod grid;
pub mod id_scheme;
pub mod instances;
pub mod metadata;
pub mod orgunit;
pub mod pager;
pub mod params;
pub mod parser;
pub mod period;
pub mod planner;
mod project;
pub mod resolve;
pub mod row;
pub mod sort;

pub use config::AnalyticsConfig;
pub use engine::AnalyticsEngine;
pub use error::QueryError;
pub use grid::{Grid, GridHeader};
pub use pager::PagerKind;
pub use params::QueryParams;
