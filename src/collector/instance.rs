//! Instance-name policy shared by both backends.

use std::collections::{HashMap, HashSet};

use crate::model::NO_INSTANCE;

const AGGREGATE_SUFFIX: &str = "_Total";
const AGGREGATE_NAME: &str = "Total";

/// `true` for aggregate rows (`Total`, `_Total`, `<anything>_Total`).
pub fn is_aggregate(name: &str) -> bool {
    name == AGGREGATE_NAME || name.ends_with(AGGREGATE_SUFFIX)
}

/// Maps an empty instance name to [`NO_INSTANCE`].
pub fn instance_key(name: &str) -> &str {
    if name.is_empty() { NO_INSTANCE } else { name }
}

/// Strips a `#N` suffix added by [`InstanceNamer`].
pub fn base_name(name: &str) -> &str {
    match name.rsplit_once('#') {
        Some((base, n))
            if !base.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

/// Assigns unique names to instances sharing a display name.
///
/// The first occurrence keeps its name; the Nth later duplicate becomes
/// `name#N`, the convention the query API itself uses for process
/// instances. Order is the order in which names are fed in, so one namer
/// must be used per buffer generation.
#[derive(Debug, Default)]
pub struct InstanceNamer {
    seen: HashMap<String, usize>,
    assigned: HashSet<String>,
}

impl InstanceNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        let mut candidate = name.to_string();
        // A literal "name#1" instance may already hold a generated name.
        while self.assigned.contains(&candidate) {
            *count += 1;
            candidate = format!("{}#{}", name, count);
        }
        self.assigned.insert(candidate.clone());
        candidate
    }
}
