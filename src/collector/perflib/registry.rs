//! Live registry source (`HKEY_PERFORMANCE_DATA`).
//!
//! The only unsafe code of the perflib backend lives here: two advapi32
//! calls writing into buffers we own and size ourselves.

use std::io;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::collector::traits::PerfDataSource;
use crate::util::to_wide_nul;

use super::names::NameTable;

type Hkey = isize;

// Predefined keys are sign-extended 32-bit values.
const HKEY_PERFORMANCE_DATA: Hkey = 0x8000_0004_u32 as i32 as isize;
const HKEY_PERFORMANCE_TEXT: Hkey = 0x8000_0050_u32 as i32 as isize;

const ERROR_SUCCESS: i32 = 0;
const ERROR_MORE_DATA: i32 = 234;

const INITIAL_BUFFER: usize = 64 * 1024;
const MAX_BUFFER: usize = 64 * 1024 * 1024;

#[link(name = "advapi32")]
unsafe extern "system" {
    fn RegQueryValueExW(
        hkey: Hkey,
        value_name: *const u16,
        reserved: *mut u32,
        value_type: *mut u32,
        data: *mut u8,
        data_len: *mut u32,
    ) -> i32;
    fn RegCloseKey(hkey: Hkey) -> i32;
}

/// Reads `value` from a predefined performance key, growing the buffer on
/// `ERROR_MORE_DATA`.
fn query_value(hkey: Hkey, value: &str) -> io::Result<Vec<u8>> {
    let name = to_wide_nul(value);
    let mut buf = vec![0u8; INITIAL_BUFFER];
    loop {
        let mut len = buf.len() as u32;
        // SAFETY: `name` is NUL-terminated, `buf` is valid for `len` bytes and
        // both outlive the call.
        let status = unsafe {
            RegQueryValueExW(
                hkey,
                name.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                buf.as_mut_ptr(),
                &mut len,
            )
        };
        match status {
            ERROR_SUCCESS => {
                buf.truncate(len as usize);
                return Ok(buf);
            }
            ERROR_MORE_DATA if buf.len() < MAX_BUFFER => {
                let next = (buf.len() * 2).min(MAX_BUFFER);
                debug!(value, size = next, "growing performance data buffer");
                buf.resize(next, 0);
            }
            code => return Err(io::Error::from_raw_os_error(code)),
        }
    }
}

/// Performance data straight from the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistrySource;

impl RegistrySource {
    pub fn new() -> Self {
        Self
    }
}

impl PerfDataSource for RegistrySource {
    fn query(&self, indices: &[u32]) -> io::Result<Vec<u8>> {
        let value = if indices.is_empty() {
            "Global".to_string()
        } else {
            indices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        let result = query_value(HKEY_PERFORMANCE_DATA, &value);
        // The key stays open (and locks the provider DLLs) until closed.
        // SAFETY: closing a predefined key has no preconditions.
        unsafe {
            RegCloseKey(HKEY_PERFORMANCE_DATA);
        }
        result
    }

    fn counter_names(&self) -> io::Result<Vec<u8>> {
        query_value(HKEY_PERFORMANCE_TEXT, "Counter")
    }
}

static SYSTEM_NAMES: OnceLock<Arc<NameTable>> = OnceLock::new();

/// The process-wide name table of the live registry, built on first use.
pub fn system_name_table() -> io::Result<Arc<NameTable>> {
    if let Some(table) = SYSTEM_NAMES.get() {
        return Ok(Arc::clone(table));
    }
    let table = Arc::new(NameTable::from_multi_sz(
        &RegistrySource::new().counter_names()?,
    ));
    debug!(entries = table.len(), "loaded counter name table");
    Ok(Arc::clone(SYSTEM_NAMES.get_or_init(|| table)))
}
