//! Pre-built mock systems for testing.
//!
//! Both backends get the same small machine: two logical processors plus
//! the `_Total` aggregate, the instance-less `System` object and a process
//! list with a duplicated `svchost`.

use crate::collector::counter_type::{
    PERF_100NSEC_TIMER, PERF_COUNTER_LARGE_RAWCOUNT, PERF_COUNTER_RAWCOUNT, PERF_ELAPSED_TIME,
    WINDOWS_EPOCH,
};
use crate::collector::pdh::{PdhStatus, RawCounterItem};

use super::pdh::MockPdh;
use super::perfdata::{ObjectSpec, PerfDataBuilder, encode_name_table};
use super::source::MockPerfSource;

pub const SYSTEM: u32 = 2;
pub const PROCESSOR_TIME: u32 = 6;
pub const WORKING_SET: u32 = 180;
pub const PROCESS: u32 = 230;
pub const PROCESSOR: u32 = 238;
pub const PROCESSES: u32 = 248;
pub const SYSTEM_UP_TIME: u32 = 674;

const FREQUENCY: i64 = 10_000_000;
/// Boot time, in seconds after the FILETIME epoch offset.
const UPTIME_SECONDS: i64 = 3_600;

/// Name table of the typical system.
pub fn typical_names() -> Vec<(u32, &'static str)> {
    vec![
        (SYSTEM, "System"),
        (PROCESSOR_TIME, "% Processor Time"),
        (WORKING_SET, "Working Set"),
        (PROCESS, "Process"),
        (PROCESSOR, "Processor"),
        (PROCESSES, "Processes"),
        (SYSTEM_UP_TIME, "System Up Time"),
    ]
}

fn typical_buffer(tick: u64) -> Vec<u8> {
    let uptime = (WINDOWS_EPOCH + UPTIME_SECONDS * FREQUENCY) as u64;
    PerfDataBuilder::new()
        .system_name("TESTHOST")
        .object(
            ObjectSpec::new(PROCESSOR)
                .frequency(FREQUENCY)
                .counter(PROCESSOR_TIME, PERF_100NSEC_TIMER, 8)
                .instance("0", &[10_000_000 * tick])
                .instance("1", &[20_000_000 * tick])
                .instance("_Total", &[30_000_000 * tick]),
        )
        .object(
            ObjectSpec::new(SYSTEM)
                .frequency(FREQUENCY)
                .counter(PROCESSES, PERF_COUNTER_RAWCOUNT, 4)
                .counter(SYSTEM_UP_TIME, PERF_ELAPSED_TIME, 8)
                .no_instances(&[120 + tick, uptime]),
        )
        .object(
            ObjectSpec::new(PROCESS)
                .frequency(FREQUENCY)
                .counter(PROCESSOR_TIME, PERF_100NSEC_TIMER, 8)
                .counter(WORKING_SET, PERF_COUNTER_LARGE_RAWCOUNT, 8)
                .instance("svchost", &[5_000_000 * tick, 4096])
                .instance("svchost", &[7_000_000 * tick, 8192])
                .instance("explorer", &[9_000_000 * tick, 65536])
                .instance("_Total", &[21_000_000 * tick, 77824]),
        )
        .build()
}

impl MockPerfSource {
    /// Registry export of the typical system; each query advances one tick.
    pub fn typical_system() -> Self {
        Self::new(
            encode_name_table(&typical_names()),
            vec![typical_buffer(1), typical_buffer(2)],
        )
    }
}

fn item(name: &str, first_value: i64) -> RawCounterItem {
    RawCounterItem {
        name: name.to_string(),
        status: PdhStatus::CSTATUS_VALID_DATA,
        first_value,
        second_value: 0,
    }
}

impl MockPdh {
    /// Query API view of the typical system.
    ///
    /// Generation N (1-based) carries the values of tick N, matching
    /// [`MockPerfSource::typical_system`].
    pub fn typical_system() -> Self {
        let pdh = Self::new();
        for (instance, per_tick) in [("0", 10_000_000), ("1", 20_000_000), ("_Total", 30_000_000)] {
            pdh.add_counter(
                &format!("\\Processor({})\\% Processor Time", instance),
                PERF_100NSEC_TIMER,
                &[per_tick, per_tick * 2],
            );
        }
        pdh.add_counter("\\System\\Processes", PERF_COUNTER_RAWCOUNT, &[121, 122]);
        pdh.add_counter(
            "\\System\\System Up Time",
            PERF_ELAPSED_TIME,
            &[WINDOWS_EPOCH + UPTIME_SECONDS * FREQUENCY],
        );
        pdh.set_explain(
            "\\System\\System Up Time",
            "Total time (in seconds) that the computer has been operational since it was last started.",
        );
        pdh.add_counter_items(
            "\\Process(svchost)\\Working Set",
            PERF_COUNTER_LARGE_RAWCOUNT,
            vec![vec![item("svchost", 4096), item("svchost", 8192)]],
        );
        pdh
    }
}
