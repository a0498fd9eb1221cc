//! Utility modules for perfcounters.

mod wide;

pub use wide::{decode_utf16le, encode_utf16le_nul, split_multi_sz, to_wide_nul};
