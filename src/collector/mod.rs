//! Windows performance-counter acquisition.
//!
//! Two backends read the same counters and normalize them through one
//! counter-type table; the [`Collector`] façade hides which one is in use.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Collector (one per object)                    │
//! │    drops aggregates, maps "" to NO_INSTANCE, filters        │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  PerflibCollector   │   │        PdhCollector         │  │
//! │  │  - parse_perf_data  │   │  - one query, N handles     │  │
//! │  │  - NameTable        │   │  - probe-then-fetch         │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! │             └─────── counter_type ────────┘                 │
//! │                   classify / normalize                      │
//! │  ┌──────────▼──────────┐   ┌──────────────▼──────────────┐  │
//! │  │ PerfDataSource      │   │         PdhApi              │  │
//! │  │ (trait)             │   │         (trait)             │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! └─────────────┼─────────────────────────────┼─────────────────┘
//!        ┌──────┴───────┐              ┌──────┴───────┐
//!  ┌─────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐
//!  │ Registry   │ │ MockPerf   │ │ SystemPdh  │ │ MockPdh    │
//!  │ Source     │ │ Source     │ │ (pdh.dll)  │ │ (Testing)  │
//!  │ (Windows)  │ │ (Testing)  │ │ (Windows)  │ │            │
//!  └────────────┘ └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Windows)
//!
//! ```ignore
//! use perfcounters::collector::{Backend, CollectorFactory};
//!
//! let factory = CollectorFactory::system()?;
//! let mut collector = factory.new_collector(Backend::Perflib, "Processor", &[], &[])?;
//! let snapshot = collector.collect()?;
//! ```
//!
//! ## Testing (with MockPdh)
//!
//! ```
//! use std::sync::Arc;
//! use perfcounters::collector::{Backend, CollectorFactory, MockPdh};
//!
//! let factory = CollectorFactory::new().with_pdh(Arc::new(MockPdh::typical_system()));
//! let mut collector = factory
//!     .new_collector(Backend::Pdh, "System", &[], &["Processes".to_string()])
//!     .unwrap();
//! let snapshot = collector.collect().unwrap();
//! assert!(!snapshot.is_empty());
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod counter_type;
mod error;
pub mod instance;
pub mod mock;
pub mod pdh;
pub mod perflib;
mod scrape;
pub mod traits;

pub use collector::{Backend, Collector, CollectorFactory};
pub use error::{CollectError, DecodeError, ObjectError};
pub use mock::{MockPdh, MockPerfSource};
pub use scrape::{ScrapeReport, scrape};
pub use traits::{CounterBackend, PerfDataSource};
