//! Seams between the collectors and the operating system.
//!
//! `PerfDataSource` lets the perflib backend read from the live registry on
//! Windows or from an in-memory fake in tests and on other platforms.
//! `CounterBackend` is what the [`Collector`](super::Collector) façade drives.

use std::io;

use crate::model::{CounterInfo, Sample};

use super::error::CollectError;

/// Raw access to the registry performance export.
pub trait PerfDataSource: Send + Sync {
    /// Returns the performance-data block for the given object indices.
    ///
    /// An empty slice requests every registered object (`"Global"`).
    fn query(&self, indices: &[u32]) -> io::Result<Vec<u8>>;

    /// Returns the English counter name table as a REG_MULTI_SZ payload.
    fn counter_names(&self) -> io::Result<Vec<u8>>;
}

/// One acquisition backend bound to a single performance object.
pub trait CounterBackend: Send {
    /// Fetches one generation of normalized samples.
    ///
    /// Duplicate instance names are already disambiguated; aggregate rows
    /// and empty names are left to the façade.
    fn fetch(&mut self) -> Result<Vec<Sample>, CollectError>;

    /// Metadata of the counters seen so far.
    fn counter_info(&self) -> Vec<CounterInfo>;

    /// Releases OS resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), CollectError>;
}
