//! Fixtures for tests of the snapshot transport.

use std::{
    collections::HashMap,
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::txlog::LogEntryReader;

/// Serves log entry payloads from a map; absent entries fail like a
/// compacted log.
#[derive(Default)]
pub struct InMemoryLogs {
    entries: Mutex<HashMap<(i64, i64), Vec<u8>>>,
    fetches: AtomicUsize,
}

impl InMemoryLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, region_id: i64, log_index: i64, payload: impl Into<Vec<u8>>) {
        self.entries.lock().insert((region_id, log_index), payload.into());
    }

    /// Number of times a log entry has been fetched.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl LogEntryReader for InMemoryLogs {
    fn read_log_entry(&self, region_id: i64, log_index: i64) -> io::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .get(&(region_id, log_index))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("log entry {log_index} of region {region_id} not found"),
                )
            })
    }
}

pub fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}
