//! Counter name ↔ index table.
//!
//! The registry identifies objects and counters by numeric title index;
//! the English string table maps those indices to names. The table is
//! built once and never mutated, so one `Arc<NameTable>` can be shared by
//! every perflib collector in the process.

use std::collections::HashMap;

use tracing::trace;

use crate::util::split_multi_sz;

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<u32, String>,
    /// Names are not unique: the same title is reused by unrelated objects.
    indices: HashMap<String, Vec<u32>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from `(index, name)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (index, name) in pairs {
            table.insert(index, name.into());
        }
        table
    }

    /// Parses the REG_MULTI_SZ payload of alternating index/name strings.
    ///
    /// Entries whose index is not a number are skipped.
    pub fn from_multi_sz(data: &[u8]) -> Self {
        let strings = split_multi_sz(data);
        let mut table = Self::new();
        for pair in strings.chunks_exact(2) {
            match pair[0].trim().parse::<u32>() {
                Ok(index) => table.insert(index, pair[1].clone()),
                Err(_) => trace!(entry = %pair[0], "skipping non-numeric name table index"),
            }
        }
        table
    }

    fn insert(&mut self, index: u32, name: String) {
        let indices = self.indices.entry(name.clone()).or_default();
        if !indices.contains(&index) {
            indices.push(index);
        }
        self.names.insert(index, name);
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    /// Every index carrying `name`, in insertion order.
    pub fn indices(&self, name: &str) -> &[u32] {
        self.indices.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::encode_name_table;

    #[test]
    fn test_from_multi_sz() {
        let data = encode_name_table(&[
            (1, "1847"),
            (2, "System"),
            (6, "% Processor Time"),
            (238, "Processor"),
        ]);
        let table = NameTable::from_multi_sz(&data);
        assert_eq!(table.len(), 4);
        assert_eq!(table.name(238), Some("Processor"));
        assert_eq!(table.indices("% Processor Time"), &[6]);
        assert!(table.indices("Nope").is_empty());
    }

    #[test]
    fn test_duplicate_names_keep_all_indices() {
        let table = NameTable::from_pairs([(10, "Name"), (20, "Name"), (10, "Name")]);
        assert_eq!(table.indices("Name"), &[10, 20]);
        assert_eq!(table.name(20), Some("Name"));
    }

    #[test]
    fn test_skips_garbage_indices() {
        let mut data = crate::util::encode_utf16le_nul("abc");
        data.extend(crate::util::encode_utf16le_nul("Broken"));
        data.extend(encode_name_table(&[(4, "Memory")]));
        let table = NameTable::from_multi_sz(&data);
        assert_eq!(table.len(), 1);
        assert_eq!(table.name(4), Some("Memory"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let table = NameTable::from_pairs([(238, "Processor")]);
        assert!(table.contains_name("Processor"));
        assert!(!table.contains_name("processor"));
    }
}
