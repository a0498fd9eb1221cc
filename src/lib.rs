//! perfcounters - Windows performance-counter acquisition library.
//!
//! This library provides the core functionality used by:
//! - `perfdump` - command-line scraper printing snapshots as JSON
//! - exporters embedding [`collector::Collector`] directly

pub mod collector;
pub mod config;
pub mod model;
pub mod util;
