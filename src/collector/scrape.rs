//! One pass over a set of collectors.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collector::collector::Collector;
use crate::collector::error::ObjectError;
use crate::model::Snapshot;

/// Outcome of [`scrape`].
#[derive(Debug, Default)]
pub struct ScrapeReport {
    /// Snapshot per object that collected successfully.
    pub snapshots: BTreeMap<String, Snapshot>,
    /// One error per object that failed.
    pub errors: Vec<ObjectError>,
    /// Time spent per object, failed ones included.
    pub timings: BTreeMap<String, Duration>,
    /// Total scrape time.
    pub total: Duration,
}

impl ScrapeReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Collects every collector once.
///
/// A failing object does not stop the others; its error is reported next
/// to the successful snapshots.
pub fn scrape(collectors: &mut [Collector]) -> ScrapeReport {
    let total_start = Instant::now();
    let mut report = ScrapeReport::default();

    for collector in collectors.iter_mut() {
        let start = Instant::now();
        let result = collector.collect();
        let elapsed = start.elapsed();
        report
            .timings
            .insert(collector.object().to_string(), elapsed);

        match result {
            Ok(snapshot) => {
                debug!(
                    object = collector.object(),
                    instances = snapshot.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "collected"
                );
                report
                    .snapshots
                    .insert(collector.object().to_string(), snapshot);
            }
            Err(err) => {
                warn!(error = %err, "collection failed");
                report.errors.push(err);
            }
        }
    }

    report.total = total_start.elapsed();
    report
}
