//! Backend A: the binary registry performance export.
//!
//! One `RegQueryValueExW` call returns every requested object as a single
//! `PERF_DATA_BLOCK`; [`parser`] decodes it without any query handle and
//! [`NameTable`] turns title indices into names.

mod collector;
pub mod names;
pub mod parser;
#[cfg(windows)]
pub mod registry;

pub use collector::PerflibCollector;
pub use names::NameTable;
pub use parser::{PerfDataBlock, PerfInstance, PerfObject, parse_perf_data};
#[cfg(windows)]
pub use registry::{RegistrySource, system_name_table};
