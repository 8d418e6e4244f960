//! In-memory [`Engine`] implementation for tests.

use std::{
    collections::BTreeMap,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::RwLock;

use super::{ColumnFamily, Engine, ReadOptions, SnapshotIter, SstWrite};
use crate::frame;

type Cf = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Clone, Default)]
struct CfPair {
    data: Cf,
    meta: Cf,
}

impl CfPair {
    fn cf(&self, cf: ColumnFamily) -> &Cf {
        match cf {
            ColumnFamily::Data => &self.data,
            ColumnFamily::Meta => &self.meta,
        }
    }

    fn cf_mut(&mut self, cf: ColumnFamily) -> &mut Cf {
        match cf {
            ColumnFamily::Data => &mut self.data,
            ColumnFamily::Meta => &mut self.meta,
        }
    }
}

#[derive(Default)]
struct Inner {
    cfs: RwLock<CfPair>,
    live_snapshots: AtomicUsize,
}

/// In-memory stand-in for the rocks-style engine.
///
/// Snapshots freeze a copy of both column families, and the bulk-load format
/// is simply the wire framing, which keeps install results easy to inspect.
#[derive(Clone, Default)]
pub struct Memory(Arc<Inner>);

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, cf: ColumnFamily, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.0.cfs.write().cf_mut(cf).insert(key.into(), value.into());
    }

    /// Number of engine snapshots currently held alive.
    pub fn live_snapshots(&self) -> usize {
        self.0.live_snapshots.load(Ordering::SeqCst)
    }

    /// Read back a bulk-load file produced by [`MemSstWriter`].
    pub fn read_sst(path: &Path) -> io::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = std::fs::read(path)?;
        frame::decode(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// A frozen copy of both column families.
pub struct MemSnapshot {
    cfs: Arc<CfPair>,
    engine: Arc<Inner>,
}

impl Drop for MemSnapshot {
    fn drop(&mut self) {
        self.engine.live_snapshots.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MemIter {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl SnapshotIter for MemIter {
    fn seek(&mut self, key: &[u8]) -> io::Result<()> {
        self.pos = self.entries.partition_point(|(k, _)| k.as_slice() < key);
        Ok(())
    }

    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }

    fn next(&mut self) -> io::Result<()> {
        self.pos += 1;
        Ok(())
    }
}

pub struct MemSstWriter {
    path: PathBuf,
    buf: Vec<u8>,
    last_key: Option<Vec<u8>>,
}

impl SstWrite for MemSstWriter {
    fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        if self.last_key.as_deref().is_some_and(|last| key <= last) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "keys must be added in ascending order",
            ));
        }
        frame::append_kv(Some(&mut self.buf), key, value);
        self.last_key = Some(key.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        std::fs::write(&self.path, &self.buf)
    }
}

impl Engine for Memory {
    type Snapshot = MemSnapshot;
    type Iter = MemIter;
    type SstWriter = MemSstWriter;

    fn snapshot(&self) -> MemSnapshot {
        self.0.live_snapshots.fetch_add(1, Ordering::SeqCst);
        MemSnapshot {
            cfs: Arc::new(self.0.cfs.read().clone()),
            engine: Arc::clone(&self.0),
        }
    }

    fn iter(
        &self,
        snapshot: &MemSnapshot,
        cf: ColumnFamily,
        _opts: ReadOptions,
    ) -> io::Result<MemIter> {
        let entries = snapshot
            .cfs
            .cf(cf)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(MemIter { entries, pos: 0 })
    }

    fn sst_writer(&self, _cf: ColumnFamily, path: &Path) -> io::Result<MemSstWriter> {
        // The transport expects the file to exist from open on; an aborted
        // install deletes it.
        File::create(path)?;
        Ok(MemSstWriter {
            path: path.to_owned(),
            buf: Vec::new(),
            last_key: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_frozen_at_creation() {
        let engine = Memory::new();
        engine.put(ColumnFamily::Data, b"a".to_vec(), b"1".to_vec());

        let snapshot = engine.snapshot();
        engine.put(ColumnFamily::Data, b"b".to_vec(), b"2".to_vec());

        let mut iter = engine.iter(&snapshot, ColumnFamily::Data, ReadOptions::default()).unwrap();
        iter.seek(b"").unwrap();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"a");
        iter.next().unwrap();
        assert!(!iter.valid());
    }

    #[test]
    fn live_snapshot_count_follows_drops() {
        let engine = Memory::new();
        assert_eq!(engine.live_snapshots(), 0);
        let one = engine.snapshot();
        let two = engine.snapshot();
        assert_eq!(engine.live_snapshots(), 2);
        drop(one);
        drop(two);
        assert_eq!(engine.live_snapshots(), 0);
    }
}
