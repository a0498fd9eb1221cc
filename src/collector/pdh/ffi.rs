//! `pdh.dll` bindings.
//!
//! All unsafe code of the query backend lives here. Buffers are allocated
//! as `Vec<u64>` so PDH sees 8-byte aligned memory, then copied to bytes
//! and decoded by [`layout`](super::layout) without dereferencing any
//! pointer PDH wrote.

use std::mem::size_of;

use tracing::debug;

use crate::util::to_wide_nul;

use super::api::{ArraySize, CounterHandle, PdhApi, PdhCounterInfo, QueryHandle, RawCounterItem};
use super::layout::{decode_counter_info, decode_raw_items};
use super::status::PdhStatus;

#[link(name = "pdh")]
unsafe extern "system" {
    fn PdhOpenQueryW(data_source: *const u16, user_data: usize, query: *mut isize) -> u32;
    fn PdhAddEnglishCounterW(
        query: isize,
        full_path: *const u16,
        user_data: usize,
        counter: *mut isize,
    ) -> u32;
    fn PdhCollectQueryData(query: isize) -> u32;
    fn PdhGetRawCounterArrayW(
        counter: isize,
        buffer_size: *mut u32,
        item_count: *mut u32,
        items: *mut u8,
    ) -> u32;
    fn PdhGetCounterInfoW(
        counter: isize,
        retrieve_explain_text: u8,
        buffer_size: *mut u32,
        info: *mut u8,
    ) -> u32;
    fn PdhGetCounterTimeBase(counter: isize, time_base: *mut i64) -> u32;
    fn PdhCloseQuery(query: isize) -> u32;
}

fn check(status: u32) -> Result<(), PdhStatus> {
    let status = PdhStatus(status);
    if status.is_success() {
        Ok(())
    } else {
        Err(status)
    }
}

/// Zeroed, 8-byte aligned buffer of at least `bytes` bytes.
fn aligned_buffer(bytes: u32) -> Vec<u64> {
    vec![0u64; (bytes as usize).div_ceil(size_of::<u64>()).max(1)]
}

/// Copies the first `bytes` bytes of `buf` out as a byte vector.
fn to_bytes(buf: &[u64], bytes: u32) -> Vec<u8> {
    let mut out: Vec<u8> = buf.iter().flat_map(|word| word.to_ne_bytes()).collect();
    out.truncate(bytes as usize);
    out
}

/// The live PDH library.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPdh;

impl SystemPdh {
    pub fn new() -> Self {
        Self
    }
}

impl PdhApi for SystemPdh {
    fn open_query(&self) -> Result<QueryHandle, PdhStatus> {
        let mut query = 0isize;
        // SAFETY: a null data source selects real-time data; `query` is a
        // valid out pointer.
        check(unsafe { PdhOpenQueryW(std::ptr::null(), 0, &mut query) })?;
        Ok(QueryHandle(query))
    }

    fn add_english_counter(
        &self,
        query: QueryHandle,
        path: &str,
    ) -> Result<CounterHandle, PdhStatus> {
        let wide = to_wide_nul(path);
        let mut counter = 0isize;
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        check(unsafe { PdhAddEnglishCounterW(query.0, wide.as_ptr(), 0, &mut counter) })?;
        Ok(CounterHandle(counter))
    }

    fn collect_query_data(&self, query: QueryHandle) -> Result<(), PdhStatus> {
        // SAFETY: plain handle argument.
        check(unsafe { PdhCollectQueryData(query.0) })
    }

    fn counter_info(&self, counter: CounterHandle) -> Result<PdhCounterInfo, PdhStatus> {
        let mut size = 0u32;
        // SAFETY: a null buffer with zero size only reports the needed size.
        let status = PdhStatus(unsafe {
            PdhGetCounterInfoW(counter.0, 1, &mut size, std::ptr::null_mut())
        });
        if !status.is_more_data() && !status.is_success() {
            return Err(status);
        }

        let mut buf = aligned_buffer(size);
        // SAFETY: `buf` holds at least `size` bytes and outlives the call.
        check(unsafe {
            PdhGetCounterInfoW(counter.0, 1, &mut size, buf.as_mut_ptr().cast())
        })?;
        let base = buf.as_ptr() as usize;
        decode_counter_info(&to_bytes(&buf, size), base).map_err(|err| {
            debug!(error = %err, "malformed counter info buffer");
            PdhStatus::INVALID_DATA
        })
    }

    fn counter_time_base(&self, counter: CounterHandle) -> Result<i64, PdhStatus> {
        let mut time_base = 0i64;
        // SAFETY: `time_base` is a valid out pointer.
        check(unsafe { PdhGetCounterTimeBase(counter.0, &mut time_base) })?;
        Ok(time_base)
    }

    fn probe_raw_array(&self, counter: CounterHandle) -> Result<ArraySize, PdhStatus> {
        let mut bytes = 0u32;
        let mut items = 0u32;
        // SAFETY: a null buffer with zero size only reports the needed size.
        let status = PdhStatus(unsafe {
            PdhGetRawCounterArrayW(counter.0, &mut bytes, &mut items, std::ptr::null_mut())
        });
        if status.is_more_data() || status.is_success() {
            Ok(ArraySize { bytes, items })
        } else {
            Err(status)
        }
    }

    fn fetch_raw_array(
        &self,
        counter: CounterHandle,
        size: ArraySize,
    ) -> Result<Vec<RawCounterItem>, PdhStatus> {
        let mut buf = aligned_buffer(size.bytes);
        let mut bytes = size.bytes;
        let mut items = size.items;
        // SAFETY: `buf` holds at least `bytes` bytes and outlives the call.
        check(unsafe {
            PdhGetRawCounterArrayW(counter.0, &mut bytes, &mut items, buf.as_mut_ptr().cast())
        })?;
        let base = buf.as_ptr() as usize;
        decode_raw_items(&to_bytes(&buf, bytes), base, items).map_err(|err| {
            debug!(error = %err, "malformed raw counter array");
            PdhStatus::INVALID_DATA
        })
    }

    fn close_query(&self, query: QueryHandle) -> Result<(), PdhStatus> {
        // SAFETY: the handle came from `open_query` and is closed once.
        check(unsafe { PdhCloseQuery(query.0) })
    }
}
