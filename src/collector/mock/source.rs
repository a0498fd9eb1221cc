//! In-memory registry export for testing the perflib backend without
//! Windows.

use std::io;
use std::sync::Mutex;

use crate::collector::traits::PerfDataSource;

#[derive(Debug, Default)]
struct State {
    buffers: Vec<Vec<u8>>,
    served: usize,
    queries: Vec<Vec<u32>>,
}

/// Serves pre-built performance-data blocks in order.
///
/// Each query returns the next buffer; once exhausted, the last buffer is
/// served again. Every query's index list is recorded.
#[derive(Debug, Default)]
pub struct MockPerfSource {
    names: Vec<u8>,
    state: Mutex<State>,
}

impl MockPerfSource {
    /// `names` is the REG_MULTI_SZ name table returned by
    /// [`counter_names`](PerfDataSource::counter_names).
    pub fn new(names: Vec<u8>, buffers: Vec<Vec<u8>>) -> Self {
        Self {
            names,
            state: Mutex::new(State {
                buffers,
                ..State::default()
            }),
        }
    }

    /// Appends a buffer to serve after the current ones.
    pub fn push_buffer(&self, buffer: Vec<u8>) {
        self.lock().buffers.push(buffer);
    }

    /// Index lists of every query so far, oldest first.
    pub fn queries(&self) -> Vec<Vec<u32>> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PerfDataSource for MockPerfSource {
    fn query(&self, indices: &[u32]) -> io::Result<Vec<u8>> {
        let mut state = self.lock();
        state.queries.push(indices.to_vec());
        if state.buffers.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no performance data scripted",
            ));
        }
        let at = state.served.min(state.buffers.len() - 1);
        state.served += 1;
        Ok(state.buffers[at].clone())
    }

    fn counter_names(&self) -> io::Result<Vec<u8>> {
        Ok(self.names.clone())
    }
}
