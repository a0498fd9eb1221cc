//! Value types shared by both acquisition backends and the collector façade.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Instance key used for objects without an instance dimension.
///
/// Fixed instead of the OS display string, which is locale dependent.
pub const NO_INSTANCE: &str = "------";

/// Exposition kind of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Monotonic, rate-like value (consumers derive rates from deltas).
    Counter,
    /// Point-in-time value.
    Gauge,
}

/// One normalized counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterValues {
    pub kind: Kind,
    /// Scaled value consumers read.
    pub first_value: f64,
    /// Paired raw sample (base/denominator, or the API's second value).
    pub second_value: f64,
}

impl CounterValues {
    pub fn new(kind: Kind, first_value: f64, second_value: f64) -> Self {
        Self {
            kind,
            first_value,
            second_value,
        }
    }
}

/// Readings from one `collect()` call: instance -> counter -> values.
///
/// Ordered maps keep JSON output and test assertions deterministic.
pub type Snapshot = BTreeMap<String, BTreeMap<String, CounterValues>>;

/// Static metadata of a counter, resolved once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterInfo {
    pub name: String,
    pub counter_type: u32,
    /// Explain text when the backend provides it (empty otherwise).
    pub description: String,
    /// Ticks per second used by elapsed-time counters (0 when unused).
    pub frequency: i64,
}

/// One normalized sample as produced by a backend, before façade filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub instance: String,
    pub counter: String,
    pub values: CounterValues,
}
