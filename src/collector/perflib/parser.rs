//! Decoder for the binary performance-data block exported under
//! `HKEY_PERFORMANCE_DATA`.
//!
//! Layout (little-endian, offsets relative to the start of each structure):
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ PERF_DATA_BLOCK (HeaderLength bytes)                     │
//! │   0  Signature "PERF" (UTF-16)   20 TotalByteLength      │
//! │   24 HeaderLength                28 NumObjectTypes       │
//! │   56 PerfTime  64 PerfFreq  72 PerfTime100nSec           │
//! │   80 SystemNameLength            84 SystemNameOffset     │
//! ├──────────────────────────────────────────────────────────┤
//! │ PERF_OBJECT_TYPE (repeated NumObjectTypes times)         │
//! │   0 TotalByteLength  4 DefinitionLength  8 HeaderLength  │
//! │   12 ObjectNameTitleIndex  32 NumCounters                │
//! │   40 NumInstances (-1 = none)  56 PerfFreq               │
//! │   ├ PERF_COUNTER_DEFINITION × NumCounters (at Header)    │
//! │   └ PERF_INSTANCE_DEFINITION + name + PERF_COUNTER_BLOCK │
//! │     × NumInstances (at DefinitionLength)                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every read goes through [`ByteReader`], so malformed input produces a
//! [`DecodeError`] naming the offending offset instead of a panic.

use crate::collector::counter_type::{has_inline_second_value, is_base_value};
use crate::collector::error::DecodeError;
use crate::util::decode_utf16le;

pub const DATA_BLOCK_HEADER_SIZE: usize = 88;
pub const OBJECT_HEADER_SIZE: usize = 64;
pub const COUNTER_DEFINITION_SIZE: usize = 40;
pub const INSTANCE_DEFINITION_SIZE: usize = 24;
pub const PERF_NO_INSTANCES: i32 = -1;

const SIGNATURE: &str = "PERF";

/// Bounds-checked little-endian reads over a byte slice.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let out_of_bounds = DecodeError::OutOfBounds {
            offset,
            len,
            available: self.buf.len(),
        };
        let end = offset.checked_add(len).ok_or(out_of_bounds.clone())?;
        self.buf.get(offset..end).ok_or(out_of_bounds)
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, DecodeError> {
        self.array(offset).map(u32::from_le_bytes)
    }

    pub fn i32(&self, offset: usize) -> Result<i32, DecodeError> {
        self.array(offset).map(i32::from_le_bytes)
    }

    pub fn u64(&self, offset: usize) -> Result<u64, DecodeError> {
        self.array(offset).map(u64::from_le_bytes)
    }

    pub fn i64(&self, offset: usize) -> Result<i64, DecodeError> {
        self.array(offset).map(i64::from_le_bytes)
    }

    /// UTF-16LE string of `byte_len` bytes, cut at the first NUL.
    pub fn utf16(&self, offset: usize, byte_len: usize) -> Result<String, DecodeError> {
        self.bytes(offset, byte_len).map(decode_utf16le)
    }
}

fn advance(base: usize, by: u32) -> Result<usize, DecodeError> {
    base.checked_add(by as usize)
        .ok_or(DecodeError::OutOfBounds {
            offset: base,
            len: by as usize,
            available: usize::MAX,
        })
}

/// Decoded `PERF_DATA_BLOCK`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfDataBlock {
    pub version: u32,
    pub revision: u32,
    pub perf_time: i64,
    pub perf_freq: i64,
    pub perf_time_100ns: i64,
    pub system_name: String,
    pub objects: Vec<PerfObject>,
}

impl PerfDataBlock {
    /// First object whose name index is one of `indices`.
    pub fn find_object(&self, indices: &[u32]) -> Option<&PerfObject> {
        self.objects
            .iter()
            .find(|obj| indices.contains(&obj.name_index))
    }
}

/// Decoded `PERF_OBJECT_TYPE` with its counters and instances.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfObject {
    pub name_index: u32,
    pub help_index: u32,
    pub detail_level: u32,
    pub default_counter: i32,
    pub code_page: u32,
    pub perf_time: i64,
    pub perf_freq: i64,
    /// `false` for objects without an instance dimension (`NumInstances == -1`).
    pub has_instances: bool,
    pub counters: Vec<CounterDefinition>,
    /// For objects without instances, a single entry with an empty name.
    pub instances: Vec<PerfInstance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDefinition {
    pub name_index: u32,
    pub help_index: u32,
    pub default_scale: i32,
    pub detail_level: u32,
    pub counter_type: u32,
    pub size: u32,
    pub offset: u32,
}

impl CounterDefinition {
    pub fn is_base_value(&self) -> bool {
        is_base_value(self.counter_type)
    }
}

/// One raw reading; `second` is the base value or the inline second sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawValue {
    pub first: i64,
    pub second: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerfInstance {
    pub name: String,
    pub unique_id: i32,
    pub parent_object_index: u32,
    pub parent_instance: u32,
    /// Indexed like [`PerfObject::counters`]; `None` for unsupported sizes.
    pub values: Vec<Option<RawValue>>,
}

/// Parses a complete performance-data buffer.
pub fn parse_perf_data(buf: &[u8]) -> Result<PerfDataBlock, DecodeError> {
    let r = ByteReader::new(buf);

    let signature = r.utf16(0, 8)?;
    if signature != SIGNATURE {
        return Err(DecodeError::BadSignature(signature));
    }

    let total_len = r.u32(20)? as usize;
    // The registry often hands back a buffer larger than the block itself.
    let r = ByteReader::new(r.bytes(0, total_len)?);

    let header_len = r.u32(24)?;
    if (header_len as usize) < DATA_BLOCK_HEADER_SIZE {
        return Err(DecodeError::BadLength {
            what: "data block header",
            offset: 0,
            length: header_len,
        });
    }
    let num_objects = r.u32(28)?;
    let system_name_len = r.u32(80)? as usize;
    let system_name_offset = r.u32(84)? as usize;
    let system_name = if system_name_len == 0 {
        String::new()
    } else {
        r.utf16(system_name_offset, system_name_len)?
    };

    let mut objects = Vec::new();
    let mut offset = header_len as usize;
    for _ in 0..num_objects {
        let (object, total) = parse_object(&r, offset)?;
        objects.push(object);
        offset = advance(offset, total)?;
    }

    Ok(PerfDataBlock {
        version: r.u32(12)?,
        revision: r.u32(16)?,
        perf_time: r.i64(56)?,
        perf_freq: r.i64(64)?,
        perf_time_100ns: r.i64(72)?,
        system_name,
        objects,
    })
}

/// Parses one object at `base`; returns it with its `TotalByteLength`.
fn parse_object(r: &ByteReader<'_>, base: usize) -> Result<(PerfObject, u32), DecodeError> {
    let total_len = r.u32(base)?;
    if (total_len as usize) < OBJECT_HEADER_SIZE {
        return Err(DecodeError::BadLength {
            what: "object",
            offset: base,
            length: total_len,
        });
    }
    let definition_len = r.u32(base + 4)?;
    let header_len = r.u32(base + 8)?;
    let num_counters = r.u32(base + 32)?;
    let num_instances = r.i32(base + 40)?;

    let mut counters = Vec::new();
    let mut def_offset = advance(base, header_len)?;
    for _ in 0..num_counters {
        let byte_len = r.u32(def_offset)?;
        if (byte_len as usize) < COUNTER_DEFINITION_SIZE {
            return Err(DecodeError::BadLength {
                what: "counter definition",
                offset: def_offset,
                length: byte_len,
            });
        }
        counters.push(CounterDefinition {
            name_index: r.u32(def_offset + 4)?,
            help_index: r.u32(def_offset + 12)?,
            default_scale: r.i32(def_offset + 20)?,
            detail_level: r.u32(def_offset + 24)?,
            counter_type: r.u32(def_offset + 28)?,
            size: r.u32(def_offset + 32)?,
            offset: r.u32(def_offset + 36)?,
        });
        def_offset = advance(def_offset, byte_len)?;
    }

    let first_instance = advance(base, definition_len)?;
    let instances = match num_instances {
        PERF_NO_INSTANCES => {
            let (values, _) = read_counter_block(r, first_instance, &counters)?;
            vec![PerfInstance {
                name: String::new(),
                unique_id: -1,
                parent_object_index: 0,
                parent_instance: 0,
                values,
            }]
        }
        n if n < 0 => {
            return Err(DecodeError::BadInstanceCount {
                offset: base,
                count: n,
            });
        }
        n => {
            // The count is untrusted; bounds checks end the loop early.
            let mut instances = Vec::new();
            let mut offset = first_instance;
            for _ in 0..n {
                let (instance, next) = parse_instance(r, offset, &counters)?;
                instances.push(instance);
                offset = next;
            }
            instances
        }
    };

    let object = PerfObject {
        name_index: r.u32(base + 12)?,
        help_index: r.u32(base + 20)?,
        detail_level: r.u32(base + 28)?,
        default_counter: r.i32(base + 36)?,
        code_page: r.u32(base + 44)?,
        perf_time: r.i64(base + 48)?,
        perf_freq: r.i64(base + 56)?,
        has_instances: num_instances != PERF_NO_INSTANCES,
        counters,
        instances,
    };
    Ok((object, total_len))
}

/// Parses an instance definition and its counter block.
///
/// Returns the instance and the offset of the next one.
fn parse_instance(
    r: &ByteReader<'_>,
    base: usize,
    counters: &[CounterDefinition],
) -> Result<(PerfInstance, usize), DecodeError> {
    let byte_len = r.u32(base)?;
    if (byte_len as usize) < INSTANCE_DEFINITION_SIZE {
        return Err(DecodeError::BadLength {
            what: "instance definition",
            offset: base,
            length: byte_len,
        });
    }
    let name_offset = r.u32(base + 16)?;
    let name_len = r.u32(base + 20)? as usize;
    let name = r.utf16(advance(base, name_offset)?, name_len)?;

    let block = advance(base, byte_len)?;
    let (values, block_len) = read_counter_block(r, block, counters)?;

    let instance = PerfInstance {
        name,
        parent_object_index: r.u32(base + 4)?,
        parent_instance: r.u32(base + 8)?,
        unique_id: r.i32(base + 12)?,
        values,
    };
    Ok((instance, advance(block, block_len)?))
}

/// Reads every counter value from the `PERF_COUNTER_BLOCK` at `block`.
fn read_counter_block(
    r: &ByteReader<'_>,
    block: usize,
    counters: &[CounterDefinition],
) -> Result<(Vec<Option<RawValue>>, u32), DecodeError> {
    let block_len = r.u32(block)?;
    if block_len < 4 {
        return Err(DecodeError::BadLength {
            what: "counter block",
            offset: block,
            length: block_len,
        });
    }
    let data = ByteReader::new(r.bytes(block, block_len as usize)?);

    let mut values = Vec::with_capacity(counters.len());
    for def in counters {
        let offset = def.offset as usize;
        let first = match def.size {
            4 => Some(i64::from(data.u32(offset)?)),
            8 => Some(data.u64(offset)? as i64),
            _ => None,
        };
        let second = if has_inline_second_value(def.counter_type) && def.size == 8 {
            data.u64(offset + 8)? as i64
        } else {
            0
        };
        values.push(first.map(|first| RawValue { first, second }));
    }

    // A ratio counter's denominator is the base definition right after it.
    for i in 0..counters.len().saturating_sub(1) {
        if counters[i].is_base_value() || !counters[i + 1].is_base_value() {
            continue;
        }
        if let (Some(value), Some(base)) = (values[i], values[i + 1]) {
            values[i] = Some(RawValue {
                first: value.first,
                second: base.first,
            });
        }
    }

    Ok((values, block_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::counter_type::*;
    use crate::collector::mock::{ObjectSpec, PerfDataBuilder};
    use proptest::prelude::*;

    fn sample_buffer() -> Vec<u8> {
        PerfDataBuilder::new()
            .system_name("HOST01")
            .object(
                ObjectSpec::new(230)
                    .frequency(10_000_000)
                    .counter(6, PERF_100NSEC_TIMER, 8)
                    .counter(180, PERF_COUNTER_RAWCOUNT, 4)
                    .counter(684, PERF_ELAPSED_TIME, 8)
                    .instance("chrome", &[20_000_000, 42, 7])
                    .instance("Überwachung", &[1, 2, 3])
                    .instance("日本語", &[4, 5, 6]),
            )
            .build()
    }

    #[test]
    fn test_parse_header() {
        let block = parse_perf_data(&sample_buffer()).unwrap();
        assert_eq!(block.system_name, "HOST01");
        assert_eq!(block.version, 1);
        assert_eq!(block.objects.len(), 1);
    }

    #[test]
    fn test_parse_instances_and_values() {
        let block = parse_perf_data(&sample_buffer()).unwrap();
        let obj = &block.objects[0];
        assert_eq!(obj.name_index, 230);
        assert_eq!(obj.perf_freq, 10_000_000);
        assert!(obj.has_instances);

        let types: Vec<(u32, u32)> = obj
            .counters
            .iter()
            .map(|c| (c.name_index, c.counter_type))
            .collect();
        assert_eq!(
            types,
            vec![
                (6, PERF_100NSEC_TIMER),
                (180, PERF_COUNTER_RAWCOUNT),
                (684, PERF_ELAPSED_TIME)
            ]
        );

        let names: Vec<&str> = obj.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["chrome", "Überwachung", "日本語"]);

        let firsts: Vec<i64> = obj.instances[0]
            .values
            .iter()
            .map(|v| v.unwrap().first)
            .collect();
        assert_eq!(firsts, vec![20_000_000, 42, 7]);
        assert_eq!(obj.instances[2].values[1].unwrap().first, 5);
    }

    #[test]
    fn test_parse_object_without_instances() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(2)
                    .counter(248, PERF_COUNTER_RAWCOUNT, 4)
                    .no_instances(&[123]),
            )
            .build();
        let block = parse_perf_data(&buf).unwrap();
        let obj = &block.objects[0];
        assert!(!obj.has_instances);
        assert_eq!(obj.instances.len(), 1);
        assert_eq!(obj.instances[0].name, "");
        assert_eq!(obj.instances[0].values[0].unwrap().first, 123);
    }

    #[test]
    fn test_parse_object_with_zero_instances() {
        let buf = PerfDataBuilder::new()
            .object(ObjectSpec::new(1500).counter(1502, PERF_COUNTER_COUNTER, 8))
            .build();
        let block = parse_perf_data(&buf).unwrap();
        assert!(block.objects[0].has_instances);
        assert!(block.objects[0].instances.is_empty());
    }

    #[test]
    fn test_parse_multiple_objects() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(2)
                    .counter(248, PERF_COUNTER_RAWCOUNT, 4)
                    .no_instances(&[1]),
            )
            .object(
                ObjectSpec::new(238)
                    .counter(6, PERF_100NSEC_TIMER_INV, 8)
                    .instance("0", &[5])
                    .instance("_Total", &[5]),
            )
            .build();
        let block = parse_perf_data(&buf).unwrap();
        assert_eq!(block.objects.len(), 2);
        assert_eq!(block.find_object(&[238]).unwrap().instances.len(), 2);
        assert!(block.find_object(&[999]).is_none());
    }

    #[test]
    fn test_base_counter_becomes_second_value() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(510)
                    .counter(512, PERF_RAW_FRACTION, 4)
                    .counter(514, PERF_RAW_BASE, 4)
                    .instance("C:", &[25, 100]),
            )
            .build();
        let block = parse_perf_data(&buf).unwrap();
        let values = &block.objects[0].instances[0].values;
        assert_eq!(values[0], Some(RawValue { first: 25, second: 100 }));
        assert_eq!(values[1], Some(RawValue { first: 100, second: 0 }));
    }

    #[test]
    fn test_average_bulk_reads_inline_second_value() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(234)
                    .counter(1400, PERF_AVERAGE_BULK, 8)
                    .instance_pairs("disk0", &[(4096, 8)]),
            )
            .build();
        let block = parse_perf_data(&buf).unwrap();
        assert_eq!(
            block.objects[0].instances[0].values[0],
            Some(RawValue { first: 4096, second: 8 })
        );
    }

    #[test]
    fn test_unsupported_counter_size_is_none() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(300)
                    .counter(302, PERF_COUNTER_TEXT, 0)
                    .counter(304, PERF_COUNTER_RAWCOUNT, 4)
                    .instance("a", &[0, 9]),
            )
            .build();
        let block = parse_perf_data(&buf).unwrap();
        let values = &block.objects[0].instances[0].values;
        assert_eq!(values[0], None);
        assert_eq!(values[1].unwrap().first, 9);
    }

    #[test]
    fn test_bad_signature() {
        let mut buf = sample_buffer();
        buf[0] = b'X';
        assert!(matches!(
            parse_perf_data(&buf),
            Err(DecodeError::BadSignature(_))
        ));
    }

    #[test]
    fn test_empty_buffer_is_error() {
        assert!(matches!(
            parse_perf_data(&[]),
            Err(DecodeError::OutOfBounds { offset: 0, .. })
        ));
    }

    #[test]
    fn test_total_length_beyond_buffer() {
        let mut buf = sample_buffer();
        buf.truncate(buf.len() - 1);
        let err = parse_perf_data(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { offset: 0, .. }));
    }

    #[test]
    fn test_trailing_slack_is_ignored() {
        let mut buf = sample_buffer();
        buf.extend(std::iter::repeat_n(0xAA, 512));
        assert_eq!(parse_perf_data(&buf).unwrap().objects.len(), 1);
    }

    #[test]
    fn test_zero_length_object_is_rejected() {
        let mut buf = sample_buffer();
        let object_start = DATA_BLOCK_HEADER_SIZE + 16;
        buf[object_start..object_start + 4].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            parse_perf_data(&buf),
            Err(DecodeError::BadLength { what: "object", .. })
        ));
    }

    #[test]
    fn test_huge_instance_count_is_out_of_bounds() {
        let mut buf = PerfDataBuilder::new()
            .object(ObjectSpec::new(1500).counter(1502, PERF_COUNTER_COUNTER, 8))
            .build();
        let object_start = u32::from_le_bytes(buf[24..28].try_into().unwrap()) as usize;
        buf[object_start + 40..object_start + 44].copy_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            parse_perf_data(&buf),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_counter_offset_outside_block() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(1)
                    .raw_counter(CounterDefinition {
                        name_index: 2,
                        help_index: 3,
                        default_scale: 0,
                        detail_level: 100,
                        counter_type: PERF_COUNTER_RAWCOUNT,
                        size: 4,
                        offset: 4096,
                    })
                    .no_instances(&[1]),
            )
            .build();
        let err = parse_perf_data(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { offset: 4096, .. }));
    }

    proptest! {
        #[test]
        fn test_truncated_input_never_panics(cut in 0usize..2048) {
            let buf = sample_buffer();
            let cut = cut.min(buf.len());
            let mut truncated = buf[..cut].to_vec();
            // Keep the declared total length so inner reads are exercised.
            if truncated.len() >= 24 {
                truncated[20..24].copy_from_slice(&(cut as u32).to_le_bytes());
            }
            let _ = parse_perf_data(&truncated);
        }

        #[test]
        fn test_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = parse_perf_data(&bytes);
        }
    }
}
