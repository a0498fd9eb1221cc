//! Backend B: the PDH query-handle API.
//!
//! ```text
//! PdhCollector ──► dyn PdhApi ──┬─► SystemPdh (pdh.dll, Windows only)
//!                               └─► MockPdh   (scripted, tests)
//! ```
//!
//! The collector owns one query and one counter handle per
//! `\Object(Instance)\Counter` path. Raw arrays are read with the
//! probe-then-fetch protocol, see [`PdhApi::probe_raw_array`].

mod api;
mod collector;
#[cfg(windows)]
mod ffi;
pub mod layout;
mod status;

pub use api::{ArraySize, CounterHandle, PdhApi, PdhCounterInfo, QueryHandle, RawCounterItem};
pub use collector::{PdhCollector, counter_path};
#[cfg(windows)]
pub use ffi::SystemPdh;
pub use status::PdhStatus;
