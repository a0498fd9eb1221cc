//! Collector façade over both acquisition backends.
//!
//! A [`Collector`] is bound to one performance object. It hides which
//! backend produced the samples and applies the instance policy every
//! consumer relies on: aggregate rows are dropped and empty instance names
//! become [`NO_INSTANCE`](crate::model::NO_INSTANCE).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collector::error::{CollectError, ObjectError};
use crate::collector::instance::{base_name, instance_key, is_aggregate};
use crate::collector::pdh::{PdhApi, PdhCollector};
use crate::collector::perflib::{NameTable, PerflibCollector};
use crate::collector::traits::{CounterBackend, PerfDataSource};
use crate::model::{CounterInfo, Sample, Snapshot};

const WILDCARD: &str = "*";

/// Acquisition backend of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Binary registry export, decoded in-process.
    Perflib,
    /// PDH query handles.
    Pdh,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Perflib => "perflib",
            Backend::Pdh => "pdh",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit name filter; `None` keeps everything.
fn name_filter(names: &[String]) -> Option<BTreeSet<String>> {
    if names.is_empty() || names.iter().any(|n| n == WILDCARD) {
        None
    } else {
        Some(names.iter().cloned().collect())
    }
}

/// Builds collectors for whichever backends are wired in.
#[derive(Default, Clone)]
pub struct CollectorFactory {
    perflib: Option<(Arc<dyn PerfDataSource>, Arc<NameTable>)>,
    pdh: Option<Arc<dyn PdhApi>>,
}

impl CollectorFactory {
    /// A factory with no backend; add them with the `with_*` methods.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_perflib(mut self, source: Arc<dyn PerfDataSource>, names: Arc<NameTable>) -> Self {
        self.perflib = Some((source, names));
        self
    }

    pub fn with_pdh(mut self, api: Arc<dyn PdhApi>) -> Self {
        self.pdh = Some(api);
        self
    }

    /// Both backends bound to the live OS.
    #[cfg(windows)]
    pub fn system() -> std::io::Result<Self> {
        use crate::collector::pdh::SystemPdh;
        use crate::collector::perflib::{RegistrySource, system_name_table};

        Ok(Self::new()
            .with_perflib(Arc::new(RegistrySource::new()), system_name_table()?)
            .with_pdh(Arc::new(SystemPdh::new())))
    }

    pub fn supports(&self, backend: Backend) -> bool {
        match backend {
            Backend::Perflib => self.perflib.is_some(),
            Backend::Pdh => self.pdh.is_some(),
        }
    }

    /// Creates a collector for `object`.
    ///
    /// For [`Backend::Perflib`], `instances` and `counters` filter the
    /// decoded rows (empty or `"*"` keeps all). For [`Backend::Pdh`] they
    /// name the exact paths to bind; wildcards are rejected.
    pub fn new_collector(
        &self,
        backend: Backend,
        object: &str,
        instances: &[String],
        counters: &[String],
    ) -> Result<Collector, ObjectError> {
        let attribute = |err: CollectError| ObjectError::new(object, err);
        let (inner, instance_filter, counter_filter) = match backend {
            Backend::Perflib => {
                let (source, names) = self
                    .perflib
                    .as_ref()
                    .ok_or(CollectError::BackendUnavailable("perflib"))
                    .map_err(attribute)?;
                let inner =
                    PerflibCollector::new(Arc::clone(source), Arc::clone(names), object, counters)
                        .map_err(attribute)?;
                let inner: Box<dyn CounterBackend> = Box::new(inner);
                (inner, name_filter(instances), name_filter(counters))
            }
            Backend::Pdh => {
                let api = self
                    .pdh
                    .as_ref()
                    .ok_or(CollectError::BackendUnavailable("pdh"))
                    .map_err(attribute)?;
                let inner = PdhCollector::open(Arc::clone(api), object, instances, counters)
                    .map_err(attribute)?;
                let inner: Box<dyn CounterBackend> = Box::new(inner);
                (inner, None, None)
            }
        };
        debug!(object, %backend, "created collector");
        Ok(Collector {
            object: object.to_string(),
            backend,
            inner,
            instance_filter,
            counter_filter,
        })
    }
}

/// Collects one performance object.
pub struct Collector {
    object: String,
    backend: Backend,
    inner: Box<dyn CounterBackend>,
    instance_filter: Option<BTreeSet<String>>,
    counter_filter: Option<BTreeSet<String>>,
}

impl Collector {
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn keep(&self, sample: &Sample) -> bool {
        if is_aggregate(base_name(&sample.instance)) {
            return false;
        }
        if let Some(counters) = &self.counter_filter {
            if !counters.contains(&sample.counter) {
                return false;
            }
        }
        match &self.instance_filter {
            Some(instances) => {
                let key = instance_key(&sample.instance);
                instances.contains(key) || instances.contains(base_name(key))
            }
            None => true,
        }
    }

    /// Reads one generation of values.
    pub fn collect(&mut self) -> Result<Snapshot, ObjectError> {
        let samples = self
            .inner
            .fetch()
            .map_err(|err| ObjectError::new(&self.object, err))?;

        let mut snapshot = Snapshot::new();
        for sample in samples {
            if !self.keep(&sample) {
                trace!(object = %self.object, instance = %sample.instance, counter = %sample.counter, "filtered");
                continue;
            }
            snapshot
                .entry(instance_key(&sample.instance).to_string())
                .or_default()
                .insert(sample.counter, sample.values);
        }
        Ok(snapshot)
    }

    /// Metadata of the counters this collector reports.
    pub fn counter_info(&self) -> Vec<CounterInfo> {
        self.inner
            .counter_info()
            .into_iter()
            .filter(|info| {
                self.counter_filter
                    .as_ref()
                    .is_none_or(|counters| counters.contains(&info.name))
            })
            .collect()
    }

    /// Releases the backend's OS resources.
    pub fn close(mut self) -> Result<(), ObjectError> {
        self.inner
            .close()
            .map_err(|err| ObjectError::new(&self.object, err))
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("object", &self.object)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::counter_type::PERF_COUNTER_RAWCOUNT;
    use crate::collector::mock::{MockPdh, MockPerfSource, ObjectSpec, PerfDataBuilder};
    use crate::model::{Kind, NO_INSTANCE};
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn perflib_factory() -> (CollectorFactory, Arc<MockPerfSource>) {
        let source = Arc::new(MockPerfSource::typical_system());
        let names = Arc::new(NameTable::from_multi_sz(&source.counter_names().unwrap()));
        let factory = CollectorFactory::new().with_perflib(source.clone(), names);
        (factory, source)
    }

    fn pdh_factory() -> (CollectorFactory, Arc<MockPdh>) {
        let api = Arc::new(MockPdh::typical_system());
        (CollectorFactory::new().with_pdh(api.clone()), api)
    }

    #[test]
    fn test_backend_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Backend::Pdh).unwrap(), "\"pdh\"");
        let backend: Backend = serde_json::from_str("\"perflib\"").unwrap();
        assert_eq!(backend, Backend::Perflib);
    }

    #[test]
    fn test_missing_backend_is_attributed() {
        let err = CollectorFactory::new()
            .new_collector(Backend::Pdh, "Processor", &[], &strings(&["% Processor Time"]))
            .unwrap_err();
        assert_eq!(err.object, "Processor");
        assert!(matches!(err.source, CollectError::BackendUnavailable("pdh")));
    }

    #[test]
    fn test_perflib_drops_aggregates() {
        let (factory, _) = perflib_factory();
        let mut collector = factory
            .new_collector(Backend::Perflib, "Processor", &[], &[])
            .unwrap();
        let snapshot = collector.collect().unwrap();
        let instances: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(instances, vec!["0", "1"]);
        assert_eq!(snapshot["1"]["% Processor Time"].first_value, 2.0);
        assert_eq!(snapshot["1"]["% Processor Time"].kind, Kind::Counter);
    }

    fn process_collector(instances: &[&str]) -> Collector {
        let mut object = ObjectSpec::new(230).counter(180, PERF_COUNTER_RAWCOUNT, 4);
        for (name, value) in instances.iter().zip(1u64..) {
            object = object.instance(name, &[value]);
        }
        let buf = PerfDataBuilder::new().object(object).build();
        let source = Arc::new(MockPerfSource::new(Vec::new(), vec![buf]));
        let names = Arc::new(NameTable::from_pairs([(230, "Process"), (180, "Working Set")]));
        CollectorFactory::new()
            .with_perflib(source, names)
            .new_collector(Backend::Perflib, "Process", &[], &[])
            .unwrap()
    }

    #[test]
    fn test_perflib_repeated_aggregates_dropped() {
        let mut collector = process_collector(&["a", "_Total", "_Total", "Total", "Total"]);
        let snapshot = collector.collect().unwrap();
        let instances: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(instances, vec!["a"]);
        assert_eq!(snapshot["a"]["Working Set"].first_value, 1.0);
    }

    proptest! {
        #[test]
        fn test_aggregates_never_emitted(
            instances in proptest::collection::vec(
                prop::sample::select(vec!["_Total", "Total", "X_Total", "a", "a#1", "b", "Totally"]),
                0..12,
            )
        ) {
            let mut collector = process_collector(&instances);
            let snapshot = collector.collect().unwrap();
            for key in snapshot.keys() {
                prop_assert!(!is_aggregate(base_name(key)), "aggregate emitted as {}", key);
            }
            let ordinary = instances
                .iter()
                .filter(|name| !is_aggregate(base_name(name)))
                .count();
            prop_assert_eq!(snapshot.len(), ordinary);
        }
    }

    #[test]
    fn test_perflib_no_instance_object_uses_sentinel() {
        let (factory, _) = perflib_factory();
        let mut collector = factory
            .new_collector(Backend::Perflib, "System", &[], &strings(&["*"]))
            .unwrap();
        let snapshot = collector.collect().unwrap();
        assert_eq!(snapshot.len(), 1);
        let row = &snapshot[NO_INSTANCE];
        assert_eq!(row["Processes"].first_value, 121.0);
        assert_eq!(row["System Up Time"].first_value, 3600.0);
    }

    #[test]
    fn test_perflib_filters_counters_and_instances() {
        let (factory, _) = perflib_factory();
        let mut collector = factory
            .new_collector(
                Backend::Perflib,
                "Process",
                &strings(&["svchost"]),
                &strings(&["Working Set"]),
            )
            .unwrap();
        let snapshot = collector.collect().unwrap();
        let instances: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(instances, vec!["svchost", "svchost#1"]);
        assert_eq!(snapshot["svchost#1"].len(), 1);
        assert_eq!(snapshot["svchost#1"]["Working Set"].first_value, 8192.0);

        let info = collector.counter_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].name, "Working Set");
    }

    #[test]
    fn test_perflib_unknown_object() {
        let (factory, _) = perflib_factory();
        let err = factory
            .new_collector(Backend::Perflib, "Nope", &[], &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Nope: object not found");
    }

    #[test]
    fn test_pdh_end_to_end_raw_count() {
        let api = Arc::new(MockPdh::new());
        api.add_counter("\\TestObject(Inst1)\\Count1", PERF_COUNTER_RAWCOUNT, &[5, 9]);
        let factory = CollectorFactory::new().with_pdh(api);

        let mut collector = factory
            .new_collector(
                Backend::Pdh,
                "TestObject",
                &strings(&["Inst1"]),
                &strings(&["Count1"]),
            )
            .unwrap();
        let snapshot = collector.collect().unwrap();
        let values = snapshot["Inst1"]["Count1"];
        assert_eq!(values.kind, Kind::Gauge);
        assert_eq!(values.first_value, 9.0);
    }

    #[test]
    fn test_pdh_drops_explicit_total() {
        let (factory, _) = pdh_factory();
        let mut collector = factory
            .new_collector(
                Backend::Pdh,
                "Processor",
                &strings(&["0", "1", "_Total"]),
                &strings(&["% Processor Time"]),
            )
            .unwrap();
        let snapshot = collector.collect().unwrap();
        assert!(!snapshot.contains_key("_Total"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["0"]["% Processor Time"].first_value, 2.0);
    }

    #[test]
    fn test_pdh_wildcard_rejected_before_open() {
        let (factory, api) = pdh_factory();
        let err = factory
            .new_collector(
                Backend::Pdh,
                "Processor",
                &strings(&["*"]),
                &strings(&["% Processor Time"]),
            )
            .unwrap_err();
        assert!(matches!(err.source, CollectError::WildcardInstance));
        assert_eq!(api.queries_opened(), 0);
    }

    #[test]
    fn test_pdh_counter_info_has_explain_text() {
        let (factory, _) = pdh_factory();
        let collector = factory
            .new_collector(Backend::Pdh, "System", &[], &strings(&["System Up Time"]))
            .unwrap();
        let info = collector.counter_info();
        assert_eq!(info.len(), 1);
        assert!(info[0].description.starts_with("Total time"));
    }

    #[test]
    fn test_close_releases_query() {
        let (factory, api) = pdh_factory();
        let collector = factory
            .new_collector(Backend::Pdh, "System", &[], &strings(&["Processes"]))
            .unwrap();
        assert_eq!(api.open_queries(), 1);
        collector.close().unwrap();
        assert_eq!(api.open_queries(), 0);
        assert_eq!(api.closes(), 1);
    }

    #[test]
    fn test_collect_error_names_object() {
        let source = Arc::new(MockPerfSource::new(Vec::new(), Vec::new()));
        let names = Arc::new(NameTable::from_pairs([(2, "System")]));
        let factory = CollectorFactory::new().with_perflib(source, names);
        let mut collector = factory
            .new_collector(Backend::Perflib, "System", &[], &[])
            .unwrap();
        let err = collector.collect().unwrap_err();
        assert_eq!(err.object, "System");
        assert!(matches!(err.source, CollectError::Io(_)));
    }
}
