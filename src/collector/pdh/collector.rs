//! Backend B: one PDH query per collector, one counter handle per path.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::collector::counter_type::{PERF_ELAPSED_TIME, normalize};
use crate::collector::error::CollectError;
use crate::collector::instance::{InstanceNamer, is_aggregate};
use crate::collector::traits::CounterBackend;
use crate::model::{CounterInfo, NO_INSTANCE, Sample};

use super::api::{CounterHandle, PdhApi, QueryHandle, RawCounterItem};
use super::status::PdhStatus;

const WILDCARD: &str = "*";

/// `\Object(Instance)\Counter`, or `\Object\Counter` for the no-instance
/// sentinel.
pub fn counter_path(object: &str, instance: &str, counter: &str) -> String {
    if instance == NO_INSTANCE {
        format!("\\{}\\{}", object, counter)
    } else {
        format!("\\{}({})\\{}", object, instance, counter)
    }
}

#[derive(Debug)]
struct BoundCounter {
    counter: String,
    instance: String,
    path: String,
    handle: CounterHandle,
}

/// Collects a fixed set of counter paths through the PDH query API.
///
/// Owns its query handle; it is closed by [`close`](CounterBackend::close)
/// or, failing that, on drop.
pub struct PdhCollector {
    api: Arc<dyn PdhApi>,
    object: String,
    query: Option<QueryHandle>,
    counters: Vec<BoundCounter>,
    info: BTreeMap<String, CounterInfo>,
}

impl PdhCollector {
    /// Opens a query and binds `counters × instances`.
    ///
    /// Wildcards are rejected before any handle is opened. An empty
    /// `instances` list addresses the object's single unnamed instance.
    pub fn open(
        api: Arc<dyn PdhApi>,
        object: &str,
        instances: &[String],
        counters: &[String],
    ) -> Result<Self, CollectError> {
        if instances.iter().any(|i| i == WILDCARD) {
            return Err(CollectError::WildcardInstance);
        }
        if counters.iter().any(|c| c == WILDCARD) {
            return Err(CollectError::WildcardCounter);
        }
        let instances = if instances.is_empty() {
            vec![NO_INSTANCE.to_string()]
        } else {
            instances.to_vec()
        };

        let query = api.open_query().map_err(|status| CollectError::Pdh {
            call: "PdhOpenQueryW",
            status,
        })?;
        let mut collector = Self {
            api,
            object: object.to_string(),
            query: Some(query),
            counters: Vec::with_capacity(counters.len() * instances.len()),
            info: BTreeMap::new(),
        };

        let mut errors = Vec::new();
        for counter in counters {
            for instance in &instances {
                if let Err(err) = collector.bind(query, counter, instance) {
                    errors.push(err);
                }
            }
        }
        if !errors.is_empty() {
            if let Err(err) = collector.close() {
                warn!(object, error = %err, "failed to close query after bind errors");
            }
            return Err(CollectError::from_many(errors));
        }

        // Rate counters need a prior sample before the first real read.
        if !collector.counters.is_empty() {
            collector
                .api
                .collect_query_data(query)
                .map_err(|status| CollectError::Pdh {
                    call: "PdhCollectQueryData",
                    status,
                })?;
        }
        debug!(
            object,
            handles = collector.counters.len(),
            "opened PDH query"
        );
        Ok(collector)
    }

    fn bind(&mut self, query: QueryHandle, counter: &str, instance: &str) -> Result<(), CollectError> {
        let path = counter_path(&self.object, instance, counter);
        let handle = self
            .api
            .add_english_counter(query, &path)
            .map_err(|status| CollectError::AddCounter {
                path: path.clone(),
                status,
            })?;
        if !self.info.contains_key(counter) {
            let info = self.describe(handle, counter, &path)?;
            self.info.insert(counter.to_string(), info);
        }
        self.counters.push(BoundCounter {
            counter: counter.to_string(),
            instance: instance.to_string(),
            path,
            handle,
        });
        Ok(())
    }

    fn describe(
        &self,
        handle: CounterHandle,
        counter: &str,
        path: &str,
    ) -> Result<CounterInfo, CollectError> {
        let to_error = |status: PdhStatus| CollectError::CounterInfo {
            path: path.to_string(),
            status,
        };
        let info = self.api.counter_info(handle).map_err(to_error)?;
        let frequency = if info.counter_type == PERF_ELAPSED_TIME {
            self.api.counter_time_base(handle).map_err(to_error)?
        } else {
            0
        };
        Ok(CounterInfo {
            name: counter.to_string(),
            counter_type: info.counter_type,
            description: info.explain,
            frequency,
        })
    }

    pub fn object(&self) -> &str {
        &self.object
    }
}

/// Two-stage read of one counter's raw array.
///
/// Probe for the size, then fetch with exactly that size. If the array
/// grew in between, re-probe once; growing again is a protocol violation.
fn probe_then_fetch(
    api: &dyn PdhApi,
    bound: &BoundCounter,
) -> Result<Vec<RawCounterItem>, CollectError> {
    let mut reprobed = false;
    loop {
        let size = match api.probe_raw_array(bound.handle) {
            Ok(size) => size,
            Err(status) if status.is_transient_item() => {
                trace!(path = %bound.path, %status, "no data for counter");
                return Ok(Vec::new());
            }
            Err(status) => {
                return Err(CollectError::Pdh {
                    call: "PdhGetRawCounterArrayW",
                    status,
                });
            }
        };
        if size.items == 0 {
            return Ok(Vec::new());
        }

        match api.fetch_raw_array(bound.handle, size) {
            Ok(items) => return Ok(items),
            Err(status) if status.is_more_data() && !reprobed => {
                debug!(path = %bound.path, bytes = size.bytes, "raw counter array grew, re-probing");
                reprobed = true;
            }
            Err(status) if status.is_more_data() => {
                return Err(CollectError::ProtocolViolation {
                    path: bound.path.clone(),
                });
            }
            Err(status) => {
                return Err(CollectError::Pdh {
                    call: "PdhGetRawCounterArrayW",
                    status,
                });
            }
        }
    }
}

impl CounterBackend for PdhCollector {
    fn fetch(&mut self) -> Result<Vec<Sample>, CollectError> {
        let query = self.query.ok_or(CollectError::Closed)?;
        self.api
            .collect_query_data(query)
            .map_err(|status| CollectError::Pdh {
                call: "PdhCollectQueryData",
                status,
            })?;

        let mut samples = Vec::with_capacity(self.counters.len());
        for bound in &self.counters {
            let Some(info) = self.info.get(&bound.counter) else {
                continue;
            };
            let items = probe_then_fetch(self.api.as_ref(), bound)?;

            let mut namer = InstanceNamer::new();
            for item in items {
                if !item.status.is_valid_item() {
                    if item.status.is_transient_item() {
                        trace!(path = %bound.path, item = %item.name, status = %item.status, "skipping item");
                    } else {
                        debug!(path = %bound.path, item = %item.name, status = %item.status, "skipping item with unexpected status");
                    }
                    continue;
                }
                let name = if item.name.is_empty() {
                    bound.instance.as_str()
                } else {
                    item.name.as_str()
                };
                if is_aggregate(name) {
                    continue;
                }
                let instance = namer.assign(name);
                let Some(values) = normalize(
                    info.counter_type,
                    item.first_value,
                    item.second_value,
                    info.frequency,
                ) else {
                    trace!(path = %bound.path, instance, "value not computable, skipping");
                    continue;
                };
                samples.push(Sample {
                    instance,
                    counter: bound.counter.clone(),
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
        let Some(query) = self.query.take() else {
            return Ok(());
        };
        self.counters.clear();
        self.api
            .close_query(query)
            .map_err(|status| CollectError::Pdh {
                call: "PdhCloseQuery",
                status,
            })
    }
}

impl Drop for PdhCollector {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(object = %self.object, error = %err, "failed to close PDH query");
        }
    }
}
