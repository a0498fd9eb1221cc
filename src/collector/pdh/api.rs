//! The checked boundary to the PDH query API.

use super::status::PdhStatus;

/// Opaque `PDH_HQUERY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub isize);

/// Opaque `PDH_HCOUNTER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterHandle(pub isize);

/// Metadata returned by `PdhGetCounterInfoW`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdhCounterInfo {
    pub counter_type: u32,
    pub explain: String,
}

/// Size reported by the probe stage of `PdhGetRawCounterArrayW`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArraySize {
    pub bytes: u32,
    pub items: u32,
}

/// One decoded `PDH_RAW_COUNTER_ITEM_W`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCounterItem {
    pub name: String,
    pub status: PdhStatus,
    pub first_value: i64,
    pub second_value: i64,
}

/// Query-handle API in the shape of the PDH function family.
///
/// Every method maps one OS call; status codes come back as
/// [`PdhStatus`] errors. The raw-array read is split into
/// [`probe_raw_array`](Self::probe_raw_array) and
/// [`fetch_raw_array`](Self::fetch_raw_array) so callers own the
/// two-stage sizing protocol.
pub trait PdhApi: Send + Sync {
    fn open_query(&self) -> Result<QueryHandle, PdhStatus>;

    fn add_english_counter(
        &self,
        query: QueryHandle,
        path: &str,
    ) -> Result<CounterHandle, PdhStatus>;

    fn collect_query_data(&self, query: QueryHandle) -> Result<(), PdhStatus>;

    fn counter_info(&self, counter: CounterHandle) -> Result<PdhCounterInfo, PdhStatus>;

    /// Ticks per second of an elapsed-time counter.
    fn counter_time_base(&self, counter: CounterHandle) -> Result<i64, PdhStatus>;

    /// Asks for the buffer size with zero capacity.
    ///
    /// `PDH_MORE_DATA` is the normal answer and is reported as `Ok`.
    fn probe_raw_array(&self, counter: CounterHandle) -> Result<ArraySize, PdhStatus>;

    /// Reads the array into a buffer of exactly `size`.
    ///
    /// Returns [`PdhStatus::MORE_DATA`] if the array grew since the probe.
    fn fetch_raw_array(
        &self,
        counter: CounterHandle,
        size: ArraySize,
    ) -> Result<Vec<RawCounterItem>, PdhStatus>;

    fn close_query(&self, query: QueryHandle) -> Result<(), PdhStatus>;
}
