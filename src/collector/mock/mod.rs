//! In-memory OS stand-ins for testing.
//!
//! `MockPerfSource` replaces the registry export, `MockPdh` the query API,
//! and `PerfDataBuilder` encodes the binary buffers the former serves.
//! Always compiled so collectors can be exercised on any platform.

mod pdh;
mod perfdata;
mod scenarios;
mod source;

pub use pdh::{MockPdh, split_counter_path};
pub use perfdata::{ObjectSpec, PerfDataBuilder, encode_name_table};
pub use scenarios::typical_names;
pub use source::MockPerfSource;
