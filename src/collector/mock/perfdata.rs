//! Encoder for synthetic performance-data buffers.
//!
//! Produces the same layout [`parse_perf_data`](crate::collector::perflib::parse_perf_data)
//! reads, so collectors can be exercised without a live registry.

use crate::collector::counter_type::has_inline_second_value;
use crate::collector::perflib::parser::{
    COUNTER_DEFINITION_SIZE, CounterDefinition, DATA_BLOCK_HEADER_SIZE, INSTANCE_DEFINITION_SIZE,
    OBJECT_HEADER_SIZE, PERF_NO_INSTANCES,
};
use crate::util::encode_utf16le_nul;

/// Size of the counter block header (`ByteLength` padded to 8 bytes).
const COUNTER_BLOCK_HEADER: usize = 8;

fn pad8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[derive(Debug, Clone)]
struct CounterSpec {
    def: CounterDefinition,
    /// Laid out by the builder (`false` for [`ObjectSpec::raw_counter`]).
    auto_layout: bool,
}

#[derive(Debug, Clone)]
struct InstanceSpec {
    name: String,
    values: Vec<(u64, u64)>,
}

/// One performance object to encode.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    name_index: u32,
    frequency: i64,
    counters: Vec<CounterSpec>,
    instances: Vec<InstanceSpec>,
    /// Values of the single counter block when the object has no instances.
    no_instance_values: Option<Vec<(u64, u64)>>,
}

impl ObjectSpec {
    pub fn new(name_index: u32) -> Self {
        Self {
            name_index,
            frequency: 0,
            counters: Vec::new(),
            instances: Vec::new(),
            no_instance_values: None,
        }
    }

    pub fn frequency(mut self, frequency: i64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Adds a counter; its offset inside the counter block is assigned on build.
    ///
    /// `size` is 4 or 8 for numeric counters; any other size gets no slot.
    pub fn counter(mut self, name_index: u32, counter_type: u32, size: u32) -> Self {
        self.counters.push(CounterSpec {
            def: CounterDefinition {
                name_index,
                help_index: name_index + 1,
                default_scale: 0,
                detail_level: 100,
                counter_type,
                size,
                offset: 0,
            },
            auto_layout: true,
        });
        self
    }

    /// Adds a definition verbatim (offset included) without reserving a slot.
    pub fn raw_counter(mut self, def: CounterDefinition) -> Self {
        self.counters.push(CounterSpec {
            def,
            auto_layout: false,
        });
        self
    }

    /// Adds an instance with one value per counter.
    pub fn instance(self, name: &str, values: &[u64]) -> Self {
        let pairs: Vec<(u64, u64)> = values.iter().map(|&v| (v, 0)).collect();
        self.instance_pairs(name, &pairs)
    }

    /// Adds an instance with explicit inline second values.
    pub fn instance_pairs(mut self, name: &str, values: &[(u64, u64)]) -> Self {
        self.instances.push(InstanceSpec {
            name: name.to_string(),
            values: values.to_vec(),
        });
        self
    }

    /// Marks the object as having no instance dimension.
    pub fn no_instances(mut self, values: &[u64]) -> Self {
        self.no_instance_values = Some(values.iter().map(|&v| (v, 0)).collect());
        self
    }

    fn slot_width(def: &CounterDefinition) -> usize {
        match def.size {
            4 | 8 if has_inline_second_value(def.counter_type) => 16,
            4 | 8 => 8,
            _ => 0,
        }
    }

    /// Assigns block offsets; returns the laid-out definitions and block length.
    fn layout(&self) -> (Vec<CounterDefinition>, usize) {
        let mut offset = COUNTER_BLOCK_HEADER;
        let defs = self
            .counters
            .iter()
            .map(|spec| {
                let mut def = spec.def;
                if spec.auto_layout {
                    def.offset = offset as u32;
                    offset += Self::slot_width(&def);
                }
                def
            })
            .collect();
        (defs, offset)
    }

    fn encode_block(defs: &[CounterDefinition], block_len: usize, values: &[(u64, u64)]) -> Vec<u8> {
        let mut block = vec![0u8; block_len];
        put_u32(&mut block, 0, block_len as u32);
        for (def, &(first, second)) in defs.iter().zip(values) {
            let offset = def.offset as usize;
            if offset + def.size as usize > block_len {
                continue;
            }
            match def.size {
                4 => put_u32(&mut block, offset, first as u32),
                8 => put_u64(&mut block, offset, first),
                _ => continue,
            }
            if has_inline_second_value(def.counter_type) && def.size == 8 {
                put_u64(&mut block, offset + 8, second);
            }
        }
        block
    }

    fn encode(&self) -> Vec<u8> {
        let (defs, block_len) = self.layout();
        let definition_len = OBJECT_HEADER_SIZE + defs.len() * COUNTER_DEFINITION_SIZE;

        let mut body = Vec::new();
        let num_instances = match &self.no_instance_values {
            Some(values) => {
                body.extend(Self::encode_block(&defs, block_len, values));
                PERF_NO_INSTANCES
            }
            None => {
                for instance in &self.instances {
                    let name = encode_utf16le_nul(&instance.name);
                    let byte_len = INSTANCE_DEFINITION_SIZE + pad8(name.len());
                    let mut header = vec![0u8; byte_len];
                    put_u32(&mut header, 0, byte_len as u32);
                    put_i32(&mut header, 12, -1);
                    put_u32(&mut header, 16, INSTANCE_DEFINITION_SIZE as u32);
                    put_u32(&mut header, 20, name.len() as u32);
                    header[INSTANCE_DEFINITION_SIZE..INSTANCE_DEFINITION_SIZE + name.len()]
                        .copy_from_slice(&name);
                    body.extend(header);
                    body.extend(Self::encode_block(&defs, block_len, &instance.values));
                }
                self.instances.len() as i32
            }
        };

        let total_len = definition_len + body.len();
        let mut out = vec![0u8; definition_len];
        put_u32(&mut out, 0, total_len as u32);
        put_u32(&mut out, 4, definition_len as u32);
        put_u32(&mut out, 8, OBJECT_HEADER_SIZE as u32);
        put_u32(&mut out, 12, self.name_index);
        put_u32(&mut out, 20, self.name_index + 1);
        put_u32(&mut out, 28, 100);
        put_u32(&mut out, 32, defs.len() as u32);
        put_i32(&mut out, 36, -1);
        put_i32(&mut out, 40, num_instances);
        put_i64(&mut out, 48, 0);
        put_i64(&mut out, 56, self.frequency);

        for (i, def) in defs.iter().enumerate() {
            let at = OBJECT_HEADER_SIZE + i * COUNTER_DEFINITION_SIZE;
            put_u32(&mut out, at, COUNTER_DEFINITION_SIZE as u32);
            put_u32(&mut out, at + 4, def.name_index);
            put_u32(&mut out, at + 12, def.help_index);
            put_i32(&mut out, at + 20, def.default_scale);
            put_u32(&mut out, at + 24, def.detail_level);
            put_u32(&mut out, at + 28, def.counter_type);
            put_u32(&mut out, at + 32, def.size);
            put_u32(&mut out, at + 36, def.offset);
        }
        out.extend(body);
        out
    }
}

/// Builds a complete `PERF_DATA_BLOCK` buffer.
#[derive(Debug, Clone, Default)]
pub struct PerfDataBuilder {
    system_name: String,
    objects: Vec<ObjectSpec>,
}

impl PerfDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_name(mut self, name: &str) -> Self {
        self.system_name = name.to_string();
        self
    }

    pub fn object(mut self, object: ObjectSpec) -> Self {
        self.objects.push(object);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let name = if self.system_name.is_empty() {
            Vec::new()
        } else {
            encode_utf16le_nul(&self.system_name)
        };
        let header_len = DATA_BLOCK_HEADER_SIZE + pad8(name.len());

        let objects: Vec<Vec<u8>> = self.objects.iter().map(ObjectSpec::encode).collect();
        let total_len = header_len + objects.iter().map(Vec::len).sum::<usize>();

        let mut out = vec![0u8; header_len];
        for (i, unit) in "PERF".encode_utf16().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        put_u32(&mut out, 8, 1);
        put_u32(&mut out, 12, 1);
        put_u32(&mut out, 16, 1);
        put_u32(&mut out, 20, total_len as u32);
        put_u32(&mut out, 24, header_len as u32);
        put_u32(&mut out, 28, objects.len() as u32);
        put_i32(&mut out, 32, -1);
        put_i64(&mut out, 64, 10_000_000);
        put_u32(&mut out, 80, name.len() as u32);
        put_u32(&mut out, 84, DATA_BLOCK_HEADER_SIZE as u32);
        out[DATA_BLOCK_HEADER_SIZE..DATA_BLOCK_HEADER_SIZE + name.len()].copy_from_slice(&name);

        for object in objects {
            out.extend(object);
        }
        out
    }
}

/// Encodes `(index, name)` pairs as the REG_MULTI_SZ counter name table.
pub fn encode_name_table(entries: &[(u32, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (index, name) in entries {
        out.extend(encode_utf16le_nul(&index.to_string()));
        out.extend(encode_utf16le_nul(name));
    }
    out.extend([0, 0]);
    out
}
