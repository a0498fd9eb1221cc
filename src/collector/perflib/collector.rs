//! Backend A: one registry query per scrape, decoded in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::collector::counter_type::{is_hidden, normalize};
use crate::collector::error::CollectError;
use crate::collector::instance::{InstanceNamer, is_aggregate};
use crate::collector::traits::{CounterBackend, PerfDataSource};
use crate::model::{CounterInfo, Sample};

use super::names::NameTable;
use super::parser::parse_perf_data;

/// Collects one performance object from the binary registry export.
///
/// Holds no OS handle: every [`fetch`](CounterBackend::fetch) is a
/// self-contained query of the object's indices.
pub struct PerflibCollector {
    source: Arc<dyn PerfDataSource>,
    names: Arc<NameTable>,
    object: String,
    object_indices: Vec<u32>,
    /// Metadata of every visible counter, refreshed from each buffer.
    info: BTreeMap<String, CounterInfo>,
}

impl PerflibCollector {
    /// Resolves `object` and `counters` against the name table.
    ///
    /// `"*"` in `counters` is accepted and matches every counter.
    pub fn new(
        source: Arc<dyn PerfDataSource>,
        names: Arc<NameTable>,
        object: &str,
        counters: &[String],
    ) -> Result<Self, CollectError> {
        let object_indices = names.indices(object).to_vec();
        if object_indices.is_empty() {
            return Err(CollectError::ObjectNotFound);
        }

        let missing: Vec<CollectError> = counters
            .iter()
            .filter(|c| c.as_str() != "*" && !names.contains_name(c))
            .map(|c| CollectError::CounterNotFound(c.clone()))
            .collect();
        if !missing.is_empty() {
            return Err(CollectError::from_many(missing));
        }

        Ok(Self {
            source,
            names,
            object: object.to_string(),
            object_indices,
            info: BTreeMap::new(),
        })
    }

    pub fn object(&self) -> &str {
        &self.object
    }
}

impl CounterBackend for PerflibCollector {
    fn fetch(&mut self) -> Result<Vec<Sample>, CollectError> {
        let buf = self.source.query(&self.object_indices)?;
        let block = parse_perf_data(&buf)?;
        let object = block
            .find_object(&self.object_indices)
            .ok_or(CollectError::ObjectNotFound)?;

        // Resolve visible counters once per buffer, not once per instance.
        let mut visible = Vec::new();
        for (idx, def) in object.counters.iter().enumerate() {
            if is_hidden(def.counter_type) {
                continue;
            }
            let Some(name) = self.names.name(def.name_index) else {
                trace!(index = def.name_index, "counter has no name, skipping");
                continue;
            };
            self.info.insert(
                name.to_string(),
                CounterInfo {
                    name: name.to_string(),
                    counter_type: def.counter_type,
                    description: String::new(),
                    frequency: object.perf_freq,
                },
            );
            visible.push((idx, name, def.counter_type));
        }

        let mut namer = InstanceNamer::new();
        let mut samples = Vec::with_capacity(object.instances.len() * visible.len());
        for instance in &object.instances {
            // Before naming, so a second `_Total` cannot become `_Total#1`.
            if is_aggregate(&instance.name) {
                continue;
            }
            let instance_name = namer.assign(&instance.name);
            for &(idx, counter, counter_type) in &visible {
                let Some(raw) = instance.values.get(idx).copied().flatten() else {
                    continue;
                };
                let Some(values) = normalize(counter_type, raw.first, raw.second, object.perf_freq)
                else {
                    trace!(counter, instance = %instance_name, "value not computable, skipping");
                    continue;
                };
                samples.push(Sample {
                    instance: instance_name.clone(),
                    counter: counter.to_string(),
                    values,
                });
            }
        }
        Ok(samples)
    }

    fn counter_info(&self) -> Vec<CounterInfo> {
        self.info.values().cloned().collect()
    }

    fn close(&mut self) -> Result<(), CollectError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::counter_type::*;
    use crate::collector::mock::{MockPerfSource, ObjectSpec, PerfDataBuilder};
    use crate::model::Kind;

    fn names() -> Arc<NameTable> {
        Arc::new(NameTable::from_pairs([
            (230, "Process"),
            (6, "% Processor Time"),
            (180, "Working Set"),
            (684, "Elapsed Time"),
            (512, "% Free Space"),
            (514, "% Free Space Base"),
            (510, "LogicalDisk"),
        ]))
    }

    fn source(buffers: Vec<Vec<u8>>) -> Arc<MockPerfSource> {
        Arc::new(MockPerfSource::new(Vec::new(), buffers))
    }

    fn process_buffer(cpu: u64) -> Vec<u8> {
        PerfDataBuilder::new()
            .object(
                ObjectSpec::new(230)
                    .frequency(10_000_000)
                    .counter(6, PERF_100NSEC_TIMER, 8)
                    .counter(180, PERF_COUNTER_LARGE_RAWCOUNT, 8)
                    .counter(684, PERF_ELAPSED_TIME, 8)
                    .instance("svchost", &[cpu, 100, (WINDOWS_EPOCH + 30_000_000) as u64])
                    .instance("svchost", &[cpu * 2, 200, (WINDOWS_EPOCH + 10_000_000) as u64]),
            )
            .build()
    }

    fn find<'a>(samples: &'a [Sample], instance: &str, counter: &str) -> Option<&'a Sample> {
        samples
            .iter()
            .find(|s| s.instance == instance && s.counter == counter)
    }

    #[test]
    fn test_unknown_object_rejected() {
        let err = PerflibCollector::new(source(vec![]), names(), "Nope", &[]).err();
        assert!(matches!(err, Some(CollectError::ObjectNotFound)));
    }

    #[test]
    fn test_unknown_counter_rejected() {
        let err = PerflibCollector::new(
            source(vec![]),
            names(),
            "Process",
            &["Working Set".into(), "Bogus".into()],
        )
        .err();
        assert!(matches!(err, Some(CollectError::CounterNotFound(c)) if c == "Bogus"));
    }

    #[test]
    fn test_fetch_normalizes_and_disambiguates() {
        let src = source(vec![process_buffer(50_000_000)]);
        let mut collector =
            PerflibCollector::new(src.clone(), names(), "Process", &["*".into()]).unwrap();
        let samples = collector.fetch().unwrap();
        assert_eq!(samples.len(), 6);

        let cpu = find(&samples, "svchost", "% Processor Time").unwrap();
        assert_eq!(cpu.values.first_value, 5.0);
        assert_eq!(cpu.values.kind, Kind::Counter);

        let cpu2 = find(&samples, "svchost#1", "% Processor Time").unwrap();
        assert_eq!(cpu2.values.first_value, 10.0);

        let elapsed = find(&samples, "svchost", "Elapsed Time").unwrap();
        assert_eq!(elapsed.values.first_value, 3.0);
        assert_eq!(elapsed.values.kind, Kind::Gauge);

        assert_eq!(src.queries(), vec![vec![230]]);
    }

    #[test]
    fn test_base_counters_hidden() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(510)
                    .counter(512, PERF_RAW_FRACTION, 4)
                    .counter(514, PERF_RAW_BASE, 4)
                    .instance("C:", &[25, 100]),
            )
            .build();
        let mut collector =
            PerflibCollector::new(source(vec![buf]), names(), "LogicalDisk", &[]).unwrap();
        let samples = collector.fetch().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].counter, "% Free Space");
        assert_eq!(samples[0].values.first_value, 25.0);
        assert_eq!(samples[0].values.second_value, 100.0);

        let info = collector.counter_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].counter_type, PERF_RAW_FRACTION);
    }

    #[test]
    fn test_object_missing_from_buffer() {
        let buf = PerfDataBuilder::new()
            .object(ObjectSpec::new(510).counter(512, PERF_RAW_FRACTION, 4))
            .build();
        let mut collector =
            PerflibCollector::new(source(vec![buf]), names(), "Process", &[]).unwrap();
        assert!(matches!(
            collector.fetch(),
            Err(CollectError::ObjectNotFound)
        ));
    }

    #[test]
    fn test_truncated_buffer_is_decode_error() {
        let mut buf = process_buffer(1);
        buf.truncate(200);
        buf[20..24].copy_from_slice(&200u32.to_le_bytes());
        let mut collector =
            PerflibCollector::new(source(vec![buf]), names(), "Process", &[]).unwrap();
        assert!(matches!(collector.fetch(), Err(CollectError::Decode(_))));
    }

    #[test]
    fn test_zero_instances_is_empty() {
        let buf = PerfDataBuilder::new()
            .object(ObjectSpec::new(230).counter(180, PERF_COUNTER_RAWCOUNT, 4))
            .build();
        let mut collector =
            PerflibCollector::new(source(vec![buf]), names(), "Process", &[]).unwrap();
        assert!(collector.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_repeated_aggregates_are_not_renamed() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(230)
                    .counter(180, PERF_COUNTER_RAWCOUNT, 4)
                    .instance("a", &[1])
                    .instance("_Total", &[2])
                    .instance("_Total", &[3])
                    .instance("Total", &[4])
                    .instance("Total", &[5]),
            )
            .build();
        let src = source(vec![]);
        src.push_buffer(buf);
        let mut collector = PerflibCollector::new(src, names(), "Process", &[]).unwrap();
        let samples = collector.fetch().unwrap();
        let instances: Vec<&str> = samples.iter().map(|s| s.instance.as_str()).collect();
        assert_eq!(instances, vec!["a"]);
    }

    #[test]
    fn test_elapsed_time_without_frequency_skipped() {
        let buf = PerfDataBuilder::new()
            .object(
                ObjectSpec::new(230)
                    .counter(684, PERF_ELAPSED_TIME, 8)
                    .counter(180, PERF_COUNTER_RAWCOUNT, 4)
                    .instance("idle", &[WINDOWS_EPOCH as u64, 1]),
            )
            .build();
        let mut collector =
            PerflibCollector::new(source(vec![buf]), names(), "Process", &[]).unwrap();
        let samples = collector.fetch().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].counter, "Working Set");
    }
}
