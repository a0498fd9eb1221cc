//! Scripted PDH implementation for testing the query backend without
//! Windows.
//!
//! Counters are scripted per full path as a list of generations. Each
//! `collect_query_data` on a query advances it to the next generation; the
//! last generation repeats. Handle usage is counted so tests can assert
//! that queries are opened and closed exactly as often as expected.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::collector::pdh::{
    ArraySize, CounterHandle, PdhApi, PdhCounterInfo, PdhStatus, QueryHandle, RawCounterItem,
    layout::RAW_ITEM_SIZE,
};

const DEFAULT_TIME_BASE: i64 = 10_000_000;

/// Splits `\Object(Instance)\Counter` into its parts.
///
/// Returns `None` for the instance of a `\Object\Counter` path.
pub fn split_counter_path(path: &str) -> Option<(&str, Option<&str>, &str)> {
    let rest = path.strip_prefix('\\')?;
    let (head, counter) = rest.rsplit_once('\\')?;
    match head.split_once('(') {
        Some((object, tail)) => {
            let instance = tail.strip_suffix(')')?;
            Some((object, Some(instance), counter))
        }
        None => Some((head, None, counter)),
    }
}

#[derive(Debug, Clone)]
struct Script {
    counter_type: u32,
    explain: String,
    time_base: i64,
    generations: Vec<Vec<RawCounterItem>>,
    /// Fetches that still report `PDH_MORE_DATA`.
    grow: u32,
}

#[derive(Debug, Default)]
struct State {
    scripts: BTreeMap<String, Script>,
    add_failures: BTreeMap<String, PdhStatus>,
    next_handle: isize,
    /// Open query -> number of collections so far.
    queries: BTreeMap<isize, usize>,
    /// Counter handle -> (owning query, path).
    counters: BTreeMap<isize, (isize, String)>,
    queries_opened: usize,
    closes: usize,
    probes: usize,
    fetches: usize,
    info_requests: usize,
}

impl State {
    fn handle(&mut self) -> isize {
        self.next_handle += 1;
        self.next_handle
    }

    /// Items the counter reports right now, or the status a probe sees.
    fn current(&self, counter: CounterHandle) -> Result<(&Script, &[RawCounterItem]), PdhStatus> {
        let (query, path) = self
            .counters
            .get(&counter.0)
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        let collected = *self.queries.get(query).ok_or(PdhStatus::INVALID_HANDLE)?;
        let script = self
            .scripts
            .get(path)
            .ok_or(PdhStatus::CSTATUS_NO_COUNTER)?;
        if collected == 0 {
            return Err(PdhStatus::NO_DATA);
        }
        let items = match script.generations.len() {
            0 => &[][..],
            len => &script.generations[(collected - 1).min(len - 1)][..],
        };
        Ok((script, items))
    }

    fn known_object(&self, object: &str) -> bool {
        self.scripts
            .keys()
            .filter_map(|path| split_counter_path(path))
            .any(|(o, _, _)| o == object)
    }
}

fn required_size(items: &[RawCounterItem]) -> ArraySize {
    let names: usize = items
        .iter()
        .map(|item| (item.name.encode_utf16().count() + 1) * 2)
        .sum();
    ArraySize {
        bytes: (items.len() * RAW_ITEM_SIZE + names) as u32,
        items: items.len() as u32,
    }
}

/// In-memory [`PdhApi`].
#[derive(Debug, Default)]
pub struct MockPdh {
    state: Mutex<State>,
}

impl MockPdh {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Scripts a single-valued counter: one valid item per generation,
    /// named after the path's instance.
    pub fn add_counter(&self, path: &str, counter_type: u32, samples: &[i64]) {
        let name = split_counter_path(path)
            .and_then(|(_, instance, _)| instance)
            .unwrap_or("")
            .to_string();
        let generations = samples
            .iter()
            .map(|&first_value| {
                vec![RawCounterItem {
                    name: name.clone(),
                    status: PdhStatus::CSTATUS_VALID_DATA,
                    first_value,
                    second_value: 0,
                }]
            })
            .collect();
        self.add_counter_items(path, counter_type, generations);
    }

    /// Scripts a counter with explicit item arrays per generation.
    pub fn add_counter_items(
        &self,
        path: &str,
        counter_type: u32,
        generations: Vec<Vec<RawCounterItem>>,
    ) {
        self.lock().scripts.insert(
            path.to_string(),
            Script {
                counter_type,
                explain: String::new(),
                time_base: DEFAULT_TIME_BASE,
                generations,
                grow: 0,
            },
        );
    }

    pub fn set_time_base(&self, path: &str, time_base: i64) {
        if let Some(script) = self.lock().scripts.get_mut(path) {
            script.time_base = time_base;
        }
    }

    pub fn set_explain(&self, path: &str, explain: &str) {
        if let Some(script) = self.lock().scripts.get_mut(path) {
            script.explain = explain.to_string();
        }
    }

    /// Makes binding `path` fail with `status`.
    pub fn fail_add(&self, path: &str, status: PdhStatus) {
        self.lock().add_failures.insert(path.to_string(), status);
    }

    /// Makes the next `times` fetches of `path` report that the array grew.
    pub fn grow_on_fetch(&self, path: &str, times: u32) {
        if let Some(script) = self.lock().scripts.get_mut(path) {
            script.grow = times;
        }
    }

    /// Queries opened over the mock's lifetime.
    pub fn queries_opened(&self) -> usize {
        self.lock().queries_opened
    }

    /// Queries currently open.
    pub fn open_queries(&self) -> usize {
        self.lock().queries.len()
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Counter handles bound to a still-open query.
    pub fn bound_counters(&self) -> usize {
        let state = self.lock();
        state
            .counters
            .values()
            .filter(|(query, _)| state.queries.contains_key(query))
            .count()
    }

    pub fn probes(&self) -> usize {
        self.lock().probes
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn info_requests(&self) -> usize {
        self.lock().info_requests
    }

    /// Paths bound so far, in binding order.
    pub fn bound_paths(&self) -> Vec<String> {
        self.lock()
            .counters
            .values()
            .map(|(_, path)| path.clone())
            .collect()
    }
}

impl PdhApi for MockPdh {
    fn open_query(&self) -> Result<QueryHandle, PdhStatus> {
        let mut state = self.lock();
        let handle = state.handle();
        state.queries.insert(handle, 0);
        state.queries_opened += 1;
        Ok(QueryHandle(handle))
    }

    fn add_english_counter(
        &self,
        query: QueryHandle,
        path: &str,
    ) -> Result<CounterHandle, PdhStatus> {
        let mut state = self.lock();
        if !state.queries.contains_key(&query.0) {
            return Err(PdhStatus::INVALID_HANDLE);
        }
        if let Some(&status) = state.add_failures.get(path) {
            return Err(status);
        }
        if !state.scripts.contains_key(path) {
            let (object, _, _) =
                split_counter_path(path).ok_or(PdhStatus::CSTATUS_BAD_COUNTERNAME)?;
            return Err(if state.known_object(object) {
                PdhStatus::CSTATUS_NO_COUNTER
            } else {
                PdhStatus::CSTATUS_NO_OBJECT
            });
        }
        let handle = state.handle();
        state.counters.insert(handle, (query.0, path.to_string()));
        Ok(CounterHandle(handle))
    }

    fn collect_query_data(&self, query: QueryHandle) -> Result<(), PdhStatus> {
        let mut state = self.lock();
        let collected = state
            .queries
            .get_mut(&query.0)
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        *collected += 1;
        Ok(())
    }

    fn counter_info(&self, counter: CounterHandle) -> Result<PdhCounterInfo, PdhStatus> {
        let mut state = self.lock();
        state.info_requests += 1;
        let (_, path) = state
            .counters
            .get(&counter.0)
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        let script = state
            .scripts
            .get(path)
            .ok_or(PdhStatus::CSTATUS_NO_COUNTER)?;
        Ok(PdhCounterInfo {
            counter_type: script.counter_type,
            explain: script.explain.clone(),
        })
    }

    fn counter_time_base(&self, counter: CounterHandle) -> Result<i64, PdhStatus> {
        let state = self.lock();
        let (_, path) = state
            .counters
            .get(&counter.0)
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        state
            .scripts
            .get(path)
            .map(|script| script.time_base)
            .ok_or(PdhStatus::CSTATUS_NO_COUNTER)
    }

    fn probe_raw_array(&self, counter: CounterHandle) -> Result<ArraySize, PdhStatus> {
        let mut state = self.lock();
        state.probes += 1;
        let (_, items) = state.current(counter)?;
        Ok(required_size(items))
    }

    fn fetch_raw_array(
        &self,
        counter: CounterHandle,
        size: ArraySize,
    ) -> Result<Vec<RawCounterItem>, PdhStatus> {
        let mut state = self.lock();
        state.fetches += 1;
        let path = state
            .counters
            .get(&counter.0)
            .map(|(_, path)| path.clone())
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        if let Some(script) = state.scripts.get_mut(&path) {
            if script.grow > 0 {
                script.grow -= 1;
                return Err(PdhStatus::MORE_DATA);
            }
        }
        let (_, items) = state.current(counter)?;
        if size.bytes < required_size(items).bytes {
            return Err(PdhStatus::MORE_DATA);
        }
        Ok(items.to_vec())
    }

    fn close_query(&self, query: QueryHandle) -> Result<(), PdhStatus> {
        let mut state = self.lock();
        state
            .queries
            .remove(&query.0)
            .ok_or(PdhStatus::INVALID_HANDLE)?;
        state.closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_counter_path() {
        assert_eq!(
            split_counter_path("\\Processor(_Total)\\% Processor Time"),
            Some(("Processor", Some("_Total"), "% Processor Time"))
        );
        assert_eq!(
            split_counter_path("\\Processor Information(0,1)\\% Idle Time"),
            Some(("Processor Information", Some("0,1"), "% Idle Time"))
        );
        assert_eq!(
            split_counter_path("\\System\\Processes"),
            Some(("System", None, "Processes"))
        );
        assert_eq!(split_counter_path("System\\Processes"), None);
    }

    #[test]
    fn test_probe_before_collect_is_no_data() {
        let pdh = MockPdh::new();
        pdh.add_counter("\\System\\Processes", 0x0001_0000, &[1]);
        let query = pdh.open_query().unwrap();
        let counter = pdh.add_english_counter(query, "\\System\\Processes").unwrap();
        assert_eq!(pdh.probe_raw_array(counter), Err(PdhStatus::NO_DATA));

        pdh.collect_query_data(query).unwrap();
        let size = pdh.probe_raw_array(counter).unwrap();
        assert_eq!(size.items, 1);
        assert_eq!(size.bytes as usize, RAW_ITEM_SIZE + 2);
    }

    #[test]
    fn test_undersized_fetch_reports_more_data() {
        let pdh = MockPdh::new();
        pdh.add_counter("\\System\\Processes", 0x0001_0000, &[1]);
        let query = pdh.open_query().unwrap();
        let counter = pdh.add_english_counter(query, "\\System\\Processes").unwrap();
        pdh.collect_query_data(query).unwrap();
        let size = ArraySize { bytes: 8, items: 1 };
        assert_eq!(pdh.fetch_raw_array(counter, size), Err(PdhStatus::MORE_DATA));
    }

    #[test]
    fn test_unknown_paths() {
        let pdh = MockPdh::new();
        pdh.add_counter("\\System\\Processes", 0x0001_0000, &[1]);
        let query = pdh.open_query().unwrap();
        assert_eq!(
            pdh.add_english_counter(query, "\\System\\Threads"),
            Err(PdhStatus::CSTATUS_NO_COUNTER)
        );
        assert_eq!(
            pdh.add_english_counter(query, "\\Nope\\Threads"),
            Err(PdhStatus::CSTATUS_NO_OBJECT)
        );
    }

    #[test]
    fn test_close_twice_is_invalid_handle() {
        let pdh = MockPdh::new();
        let query = pdh.open_query().unwrap();
        pdh.close_query(query).unwrap();
        assert_eq!(pdh.close_query(query), Err(PdhStatus::INVALID_HANDLE));
        assert_eq!(pdh.closes(), 1);
    }
}
