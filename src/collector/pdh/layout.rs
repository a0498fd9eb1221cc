//! Decoding of the caller-owned buffers PDH fills in.
//!
//! PDH writes structures holding pointers back into the same buffer (item
//! names, explain text). Instead of dereferencing them, each pointer is
//! turned into an offset relative to the buffer's base address and read
//! through [`ByteReader`], so a bogus pointer is a [`DecodeError`].
//!
//! ```text
//! PDH_RAW_COUNTER_ITEM_W (48 bytes on both pointer widths)
//!   0  szName (pointer)   8  CStatus   12 TimeStamp (FILETIME)
//!   24 FirstValue         32 SecondValue         40 MultiCount
//! ```

use std::mem::size_of;

use crate::collector::error::DecodeError;
use crate::collector::perflib::parser::ByteReader;

use super::api::{PdhCounterInfo, RawCounterItem};
use super::status::PdhStatus;

pub const RAW_ITEM_SIZE: usize = 48;

const ITEM_STATUS: usize = 8;
const ITEM_FIRST_VALUE: usize = 24;
const ITEM_SECOND_VALUE: usize = 32;

const INFO_TYPE: usize = 4;

/// Offset of `szExplainText` in `PDH_COUNTER_INFO_W`.
pub const INFO_EXPLAIN_TEXT: usize = if size_of::<usize>() == 8 { 96 } else { 60 };

fn read_ptr(reader: &ByteReader<'_>, offset: usize) -> Result<usize, DecodeError> {
    if size_of::<usize>() == 8 {
        reader.u64(offset).map(|p| p as usize)
    } else {
        reader.u32(offset).map(|p| p as usize)
    }
}

/// Reads the NUL-terminated wide string `ptr` points at inside `buf`.
///
/// A null pointer is an empty string.
fn read_string(reader: &ByteReader<'_>, base: usize, ptr: usize) -> Result<String, DecodeError> {
    if ptr == 0 {
        return Ok(String::new());
    }
    let out_of_bounds = DecodeError::OutOfBounds {
        offset: ptr.wrapping_sub(base),
        len: 2,
        available: reader.len(),
    };
    let offset = ptr.checked_sub(base).ok_or(out_of_bounds.clone())?;
    if offset >= reader.len() {
        return Err(out_of_bounds);
    }
    reader.utf16(offset, reader.len() - offset)
}

/// Decodes `count` raw counter items from a buffer that lived at `base`.
pub fn decode_raw_items(
    buf: &[u8],
    base: usize,
    count: u32,
) -> Result<Vec<RawCounterItem>, DecodeError> {
    let reader = ByteReader::new(buf);
    let mut items = Vec::with_capacity((count as usize).min(buf.len() / RAW_ITEM_SIZE));
    for i in 0..count as usize {
        let at = i * RAW_ITEM_SIZE;
        let name_ptr = read_ptr(&reader, at)?;
        items.push(RawCounterItem {
            name: read_string(&reader, base, name_ptr)?,
            status: PdhStatus(reader.u32(at + ITEM_STATUS)?),
            first_value: reader.i64(at + ITEM_FIRST_VALUE)?,
            second_value: reader.i64(at + ITEM_SECOND_VALUE)?,
        });
    }
    Ok(items)
}

/// Decodes the type code and explain text of a `PDH_COUNTER_INFO_W`.
pub fn decode_counter_info(buf: &[u8], base: usize) -> Result<PdhCounterInfo, DecodeError> {
    let reader = ByteReader::new(buf);
    let explain_ptr = read_ptr(&reader, INFO_EXPLAIN_TEXT)?;
    Ok(PdhCounterInfo {
        counter_type: reader.u32(INFO_TYPE)?,
        explain: read_string(&reader, base, explain_ptr)?,
    })
}
