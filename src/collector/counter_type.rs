//! Counter type classification and value normalization.
//!
//! Every raw sample, whichever backend produced it, goes through
//! [`normalize`]. The type table is a single static slice so it can be
//! checked entry by entry against the published `winperf.h` list.

use crate::model::{CounterValues, Kind};

pub const PERF_COUNTER_RAWCOUNT_HEX: u32 = 0x0000_0000;
pub const PERF_COUNTER_LARGE_RAWCOUNT_HEX: u32 = 0x0000_0100;
pub const PERF_COUNTER_TEXT: u32 = 0x0000_0B00;
pub const PERF_COUNTER_RAWCOUNT: u32 = 0x0001_0000;
pub const PERF_COUNTER_LARGE_RAWCOUNT: u32 = 0x0001_0100;
pub const PERF_COUNTER_DELTA: u32 = 0x0040_0400;
pub const PERF_COUNTER_LARGE_DELTA: u32 = 0x0040_0500;
pub const PERF_SAMPLE_COUNTER: u32 = 0x0041_0400;
pub const PERF_COUNTER_QUEUELEN_TYPE: u32 = 0x0045_0400;
pub const PERF_COUNTER_LARGE_QUEUELEN_TYPE: u32 = 0x0045_0500;
pub const PERF_COUNTER_100NS_QUEUELEN_TYPE: u32 = 0x0055_0500;
pub const PERF_COUNTER_OBJ_TIME_QUEUELEN_TYPE: u32 = 0x0065_0500;
pub const PERF_COUNTER_COUNTER: u32 = 0x1041_0400;
pub const PERF_COUNTER_BULK_COUNT: u32 = 0x1041_0500;
pub const PERF_RAW_FRACTION: u32 = 0x2002_0400;
pub const PERF_LARGE_RAW_FRACTION: u32 = 0x2002_0500;
pub const PERF_COUNTER_TIMER: u32 = 0x2041_0500;
pub const PERF_PRECISION_SYSTEM_TIMER: u32 = 0x2047_0500;
pub const PERF_100NSEC_TIMER: u32 = 0x2051_0500;
pub const PERF_PRECISION_100NS_TIMER: u32 = 0x2057_0500;
pub const PERF_OBJ_TIME_TIMER: u32 = 0x2061_0500;
pub const PERF_PRECISION_OBJECT_TIMER: u32 = 0x2067_0500;
pub const PERF_SAMPLE_FRACTION: u32 = 0x20C2_0400;
pub const PERF_COUNTER_TIMER_INV: u32 = 0x2141_0500;
pub const PERF_100NSEC_TIMER_INV: u32 = 0x2151_0500;
pub const PERF_COUNTER_MULTI_TIMER: u32 = 0x2241_0500;
pub const PERF_100NSEC_MULTI_TIMER: u32 = 0x2251_0500;
pub const PERF_COUNTER_MULTI_TIMER_INV: u32 = 0x2341_0500;
pub const PERF_100NSEC_MULTI_TIMER_INV: u32 = 0x2351_0500;
pub const PERF_AVERAGE_TIMER: u32 = 0x3002_0400;
pub const PERF_ELAPSED_TIME: u32 = 0x3024_0500;
pub const PERF_COUNTER_NODATA: u32 = 0x4000_0200;
pub const PERF_AVERAGE_BULK: u32 = 0x4002_0500;
pub const PERF_SAMPLE_BASE: u32 = 0x4003_0401;
pub const PERF_AVERAGE_BASE: u32 = 0x4003_0402;
pub const PERF_RAW_BASE: u32 = 0x4003_0403;
pub const PERF_LARGE_RAW_BASE: u32 = 0x4003_0500;
pub const PERF_PRECISION_TIMESTAMP: u32 = PERF_LARGE_RAW_BASE;
pub const PERF_COUNTER_MULTI_BASE: u32 = 0x4203_0500;
pub const PERF_COUNTER_HISTOGRAM_TYPE: u32 = 0x8000_0000;

/// Windows FILETIME of the Unix epoch, in 100ns ticks.
pub const WINDOWS_EPOCH: i64 = 116_444_736_000_000_000;

/// 100ns ticks per second.
pub const TICKS_PER_SECOND: f64 = 1e7;

const COUNTER_SUBTYPE_MASK: u32 = 0x000F_0000;
const PERF_COUNTER_BASE: u32 = 0x0003_0000;
const PERF_TIMER_100NS: u32 = 0x0010_0000;

/// How a raw sample is turned into the exposed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalingRule {
    PassThrough,
    /// value × 1e-7
    HundredNsToSeconds,
    /// (value − [`WINDOWS_EPOCH`]) / frequency
    ElapsedTimeFromEpoch,
}

struct TypeEntry {
    code: u32,
    name: &'static str,
    kind: Kind,
    rule: ScalingRule,
}

const fn entry(code: u32, name: &'static str, kind: Kind, rule: ScalingRule) -> TypeEntry {
    TypeEntry {
        code,
        name,
        kind,
        rule,
    }
}

use Kind::{Counter, Gauge};
use ScalingRule::{ElapsedTimeFromEpoch, HundredNsToSeconds, PassThrough};

#[rustfmt::skip]
static COUNTER_TYPES: &[TypeEntry] = &[
    entry(PERF_COUNTER_RAWCOUNT_HEX, "PERF_COUNTER_RAWCOUNT_HEX", Gauge, PassThrough),
    entry(PERF_COUNTER_LARGE_RAWCOUNT_HEX, "PERF_COUNTER_LARGE_RAWCOUNT_HEX", Gauge, PassThrough),
    entry(PERF_COUNTER_TEXT, "PERF_COUNTER_TEXT", Gauge, PassThrough),
    entry(PERF_COUNTER_RAWCOUNT, "PERF_COUNTER_RAWCOUNT", Gauge, PassThrough),
    entry(PERF_COUNTER_LARGE_RAWCOUNT, "PERF_COUNTER_LARGE_RAWCOUNT", Gauge, PassThrough),
    entry(PERF_COUNTER_DELTA, "PERF_COUNTER_DELTA", Counter, PassThrough),
    entry(PERF_COUNTER_LARGE_DELTA, "PERF_COUNTER_LARGE_DELTA", Counter, PassThrough),
    entry(PERF_SAMPLE_COUNTER, "PERF_SAMPLE_COUNTER", Counter, PassThrough),
    entry(PERF_COUNTER_QUEUELEN_TYPE, "PERF_COUNTER_QUEUELEN_TYPE", Counter, PassThrough),
    entry(PERF_COUNTER_LARGE_QUEUELEN_TYPE, "PERF_COUNTER_LARGE_QUEUELEN_TYPE", Counter, PassThrough),
    entry(PERF_COUNTER_100NS_QUEUELEN_TYPE, "PERF_COUNTER_100NS_QUEUELEN_TYPE", Counter, PassThrough),
    entry(PERF_COUNTER_OBJ_TIME_QUEUELEN_TYPE, "PERF_COUNTER_OBJ_TIME_QUEUELEN_TYPE", Counter, PassThrough),
    entry(PERF_COUNTER_COUNTER, "PERF_COUNTER_COUNTER", Counter, PassThrough),
    entry(PERF_COUNTER_BULK_COUNT, "PERF_COUNTER_BULK_COUNT", Counter, PassThrough),
    entry(PERF_RAW_FRACTION, "PERF_RAW_FRACTION", Gauge, PassThrough),
    entry(PERF_LARGE_RAW_FRACTION, "PERF_LARGE_RAW_FRACTION", Gauge, PassThrough),
    entry(PERF_COUNTER_TIMER, "PERF_COUNTER_TIMER", Counter, PassThrough),
    entry(PERF_PRECISION_SYSTEM_TIMER, "PERF_PRECISION_SYSTEM_TIMER", Counter, PassThrough),
    entry(PERF_100NSEC_TIMER, "PERF_100NSEC_TIMER", Counter, HundredNsToSeconds),
    entry(PERF_PRECISION_100NS_TIMER, "PERF_PRECISION_100NS_TIMER", Counter, HundredNsToSeconds),
    entry(PERF_OBJ_TIME_TIMER, "PERF_OBJ_TIME_TIMER", Counter, PassThrough),
    entry(PERF_PRECISION_OBJECT_TIMER, "PERF_PRECISION_OBJECT_TIMER", Counter, PassThrough),
    entry(PERF_SAMPLE_FRACTION, "PERF_SAMPLE_FRACTION", Gauge, PassThrough),
    entry(PERF_COUNTER_TIMER_INV, "PERF_COUNTER_TIMER_INV", Counter, PassThrough),
    entry(PERF_100NSEC_TIMER_INV, "PERF_100NSEC_TIMER_INV", Counter, HundredNsToSeconds),
    entry(PERF_COUNTER_MULTI_TIMER, "PERF_COUNTER_MULTI_TIMER", Counter, PassThrough),
    entry(PERF_100NSEC_MULTI_TIMER, "PERF_100NSEC_MULTI_TIMER", Counter, HundredNsToSeconds),
    entry(PERF_COUNTER_MULTI_TIMER_INV, "PERF_COUNTER_MULTI_TIMER_INV", Counter, PassThrough),
    entry(PERF_100NSEC_MULTI_TIMER_INV, "PERF_100NSEC_MULTI_TIMER_INV", Counter, HundredNsToSeconds),
    entry(PERF_AVERAGE_TIMER, "PERF_AVERAGE_TIMER", Counter, PassThrough),
    entry(PERF_ELAPSED_TIME, "PERF_ELAPSED_TIME", Gauge, ElapsedTimeFromEpoch),
    entry(PERF_COUNTER_NODATA, "PERF_COUNTER_NODATA", Gauge, PassThrough),
    entry(PERF_AVERAGE_BULK, "PERF_AVERAGE_BULK", Counter, PassThrough),
    entry(PERF_SAMPLE_BASE, "PERF_SAMPLE_BASE", Gauge, PassThrough),
    entry(PERF_AVERAGE_BASE, "PERF_AVERAGE_BASE", Gauge, PassThrough),
    entry(PERF_RAW_BASE, "PERF_RAW_BASE", Gauge, PassThrough),
    entry(PERF_LARGE_RAW_BASE, "PERF_LARGE_RAW_BASE", Gauge, PassThrough),
    entry(PERF_COUNTER_MULTI_BASE, "PERF_COUNTER_MULTI_BASE", Gauge, PassThrough),
    entry(PERF_COUNTER_HISTOGRAM_TYPE, "PERF_COUNTER_HISTOGRAM_TYPE", Gauge, PassThrough),
];

fn lookup(code: u32) -> Option<&'static TypeEntry> {
    COUNTER_TYPES.iter().find(|e| e.code == code)
}

/// Returns the exposition kind and scaling rule for a counter type code.
///
/// Total over `u32`: unknown codes are `(Gauge, PassThrough)` so that new
/// OS counter types never break a collector.
pub fn classify(code: u32) -> (Kind, ScalingRule) {
    lookup(code).map_or((Gauge, PassThrough), |e| (e.kind, e.rule))
}

/// Symbolic `winperf.h` name of a known counter type.
pub fn type_name(code: u32) -> Option<&'static str> {
    lookup(code).map(|e| e.name)
}

/// Denominator counters that only make sense next to their ratio counter.
pub fn is_base_value(code: u32) -> bool {
    code & COUNTER_SUBTYPE_MASK == PERF_COUNTER_BASE
}

pub fn is_nanosecond_counter(code: u32) -> bool {
    code & PERF_TIMER_100NS != 0
}

/// Base counters are dropped from output unless they are also 100ns timers.
pub fn is_hidden(code: u32) -> bool {
    is_base_value(code) && !is_nanosecond_counter(code)
}

/// Types that store a second 8-byte sample right after the first.
pub fn has_inline_second_value(code: u32) -> bool {
    code == PERF_AVERAGE_BULK
}

/// Applies a scaling rule to one raw sample.
///
/// Returns `None` when the value cannot be computed (elapsed time with a
/// non-positive frequency); callers skip such items.
pub fn scale(rule: ScalingRule, raw: i64, frequency: i64) -> Option<f64> {
    match rule {
        ScalingRule::PassThrough => Some(raw as f64),
        // Dividing keeps whole-second tick counts exact.
        ScalingRule::HundredNsToSeconds => Some(raw as f64 / TICKS_PER_SECOND),
        ScalingRule::ElapsedTimeFromEpoch => {
            if frequency <= 0 {
                return None;
            }
            // Subtract in integer space: the epoch offset exceeds f64's exact range.
            let ticks = i128::from(raw) - i128::from(WINDOWS_EPOCH);
            Some(ticks as f64 / frequency as f64)
        }
    }
}

/// Classifies `code` and scales the first raw sample; the second sample is
/// passed through untouched.
pub fn normalize(
    code: u32,
    raw_first: i64,
    raw_second: i64,
    frequency: i64,
) -> Option<CounterValues> {
    let (kind, rule) = classify(code);
    let first = scale(rule, raw_first, frequency)?;
    Some(CounterValues::new(kind, first, raw_second as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_has_no_duplicate_codes() {
        let mut seen = HashSet::new();
        for e in COUNTER_TYPES {
            assert!(seen.insert(e.code), "duplicate entry for {}", e.name);
        }
        assert_eq!(COUNTER_TYPES.len(), 39);
    }

    #[test]
    fn test_classify_known_types() {
        assert_eq!(classify(PERF_COUNTER_COUNTER), (Counter, PassThrough));
        assert_eq!(classify(PERF_COUNTER_BULK_COUNT), (Counter, PassThrough));
        assert_eq!(classify(PERF_COUNTER_RAWCOUNT), (Gauge, PassThrough));
        assert_eq!(classify(PERF_LARGE_RAW_FRACTION), (Gauge, PassThrough));
        assert_eq!(classify(PERF_100NSEC_TIMER), (Counter, HundredNsToSeconds));
        assert_eq!(
            classify(PERF_PRECISION_100NS_TIMER),
            (Counter, HundredNsToSeconds)
        );
        assert_eq!(classify(PERF_ELAPSED_TIME), (Gauge, ElapsedTimeFromEpoch));
    }

    #[test]
    fn test_classify_unknown_defaults_to_gauge() {
        assert_eq!(classify(0xDEAD_BEEF), (Gauge, PassThrough));
        assert_eq!(type_name(0xDEAD_BEEF), None);
        assert_eq!(type_name(PERF_RAW_BASE), Some("PERF_RAW_BASE"));
    }

    #[test]
    fn test_base_value_flags() {
        for code in [
            PERF_SAMPLE_BASE,
            PERF_AVERAGE_BASE,
            PERF_RAW_BASE,
            PERF_LARGE_RAW_BASE,
            PERF_COUNTER_MULTI_BASE,
        ] {
            assert!(is_base_value(code), "{:#x}", code);
            assert!(is_hidden(code));
        }
        for code in [
            PERF_ELAPSED_TIME,
            PERF_PRECISION_100NS_TIMER,
            PERF_COUNTER_LARGE_QUEUELEN_TYPE,
            PERF_RAW_FRACTION,
        ] {
            assert!(!is_base_value(code), "{:#x}", code);
        }
        // A base-valued code carrying the 100ns timer bit stays visible.
        assert!(!is_hidden(PERF_LARGE_RAW_BASE | 0x0010_0000));
    }

    #[test]
    fn test_scale_100ns_timer() {
        let v = normalize(PERF_100NSEC_TIMER, 10_000_000, 0, 0).unwrap();
        assert_eq!(v.first_value, 1.0);
        assert_eq!(v.kind, Counter);
    }

    #[test]
    fn test_scale_elapsed_time() {
        let freq = 10_000_000;
        let v = normalize(PERF_ELAPSED_TIME, WINDOWS_EPOCH + freq * 5, 0, freq).unwrap();
        assert_eq!(v.first_value, 5.0);
        assert_eq!(v.kind, Gauge);
    }

    #[test]
    fn test_scale_elapsed_time_without_frequency() {
        assert_eq!(normalize(PERF_ELAPSED_TIME, WINDOWS_EPOCH, 0, 0), None);
        assert_eq!(normalize(PERF_ELAPSED_TIME, WINDOWS_EPOCH, 0, -1), None);
    }

    #[test]
    fn test_second_value_passes_through() {
        let v = normalize(PERF_RAW_FRACTION, 25, 100, 0).unwrap();
        assert_eq!(v.first_value, 25.0);
        assert_eq!(v.second_value, 100.0);
    }

    proptest! {
        #[test]
        fn test_classify_is_total_and_pure(code in any::<u32>()) {
            let first = classify(code);
            prop_assert_eq!(first, classify(code));
            if lookup(code).is_none() {
                prop_assert_eq!(first, (Gauge, PassThrough));
            }
        }

        #[test]
        fn test_pass_through_is_identity(code in any::<u32>(), raw in any::<i32>()) {
            prop_assume!(classify(code).1 == PassThrough);
            let v = normalize(code, i64::from(raw), 0, 0).unwrap();
            prop_assert_eq!(v.first_value, f64::from(raw));
        }
    }
}
