//! The file-system facade the consensus transport drives.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use granitedb_keys::{meta, region_prefix};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::{
    OpenFlags, SNAPSHOT_DATA_FILE_WITH_SLASH, SNAPSHOT_META_FILE_WITH_SLASH,
    context::{IterContext, SnapshotContext},
    engine::{ColumnFamily, Engine, ReadOptions, SnapshotIter as _},
    error::{Error, Result},
    posix::{DirReader, PosixFile},
    reader::SnapshotReader,
    sst::SstWriter,
    txlog::LogEntryReader,
};

fn is_snapshot_data_file(path: &str) -> bool {
    path.ends_with(SNAPSHOT_DATA_FILE_WITH_SLASH)
}

fn is_snapshot_meta_file(path: &str) -> bool {
    path.ends_with(SNAPSHOT_META_FILE_WITH_SLASH)
}

/// The polymorphic file handle returned by [`SnapshotAdaptor::open`].
///
/// The transport drives every variant through the same operation set;
/// operations a variant cannot serve fail with [`Error::Unsupported`].
pub enum SnapshotFile<E: Engine> {
    /// An ordinary file outside the snapshot virtual namespace.
    Posix(PosixFile),
    /// Receiving side of a snapshot install.
    Sst(SstWriter<E::SstWriter>),
    /// Sending side: a region snapshot framed as a byte stream.
    Reader(SnapshotReader<E>),
}

impl<E: Engine> SnapshotFile<E> {
    pub fn read(&mut self, portal: &mut Vec<u8>, offset: i64, size: usize) -> Result<usize> {
        match self {
            Self::Posix(file) => file.read(portal, offset, size),
            Self::Sst(writer) => writer.read(portal, offset, size),
            Self::Reader(reader) => reader.read(portal, offset, size),
        }
    }

    pub fn write(&mut self, data: &[u8], offset: i64) -> Result<usize> {
        match self {
            Self::Posix(file) => file.write(data, offset),
            Self::Sst(writer) => writer.write(data, offset),
            Self::Reader(reader) => reader.write(data, offset),
        }
    }

    pub fn size(&self) -> Result<i64> {
        match self {
            Self::Posix(file) => file.size(),
            Self::Sst(writer) => writer.size(),
            Self::Reader(reader) => reader.size(),
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        match self {
            Self::Posix(file) => file.sync(),
            Self::Sst(writer) => writer.sync(),
            Self::Reader(reader) => reader.sync(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Self::Posix(file) => file.close(),
            Self::Sst(writer) => writer.close(),
            Self::Reader(reader) => reader.close(),
        }
    }
}

struct Registered<E: Engine> {
    context: Arc<SnapshotContext<E>>,
    refs: usize,
}

/// Region-scoped snapshot file system.
///
/// One adaptor serves one region replica for the replica's whole lifetime.
/// Paths naming a data or meta virtual file below a registered snapshot
/// directory map onto the engine; everything else is passed through to the
/// host filesystem.
pub struct SnapshotAdaptor<E: Engine> {
    region_id: i64,
    engine: E,
    log_reader: Arc<dyn LogEntryReader>,
    snapshots: Mutex<HashMap<String, Registered<E>>>,
    registry_drained: Condvar,
}

impl<E: Engine> SnapshotAdaptor<E> {
    pub fn new(region_id: i64, engine: E, log_reader: Arc<dyn LogEntryReader>) -> Self {
        Self {
            region_id,
            engine,
            log_reader,
            snapshots: Mutex::new(HashMap::new()),
            registry_drained: Condvar::new(),
        }
    }

    pub fn region_id(&self) -> i64 {
        self.region_id
    }

    /// Number of snapshot paths currently registered.
    pub fn open_snapshots(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Open `path` as the transport sees it.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<SnapshotFile<E>> {
        if !is_snapshot_data_file(path) && !is_snapshot_meta_file(path) {
            debug!("open file: {}, region_id: {}", path, self.region_id);
            let file = PosixFile::open(Path::new(path), flags)?;
            return Ok(SnapshotFile::Posix(file));
        }

        if flags.contains(OpenFlags::WRITE_ONLY) {
            self.open_for_write(path)
        } else {
            self.open_for_read(path)
        }
    }

    fn open_for_write(&self, path: &str) -> Result<SnapshotFile<E>> {
        let cf = if is_snapshot_data_file(path) {
            ColumnFamily::Data
        } else {
            ColumnFamily::Meta
        };
        let inner = self.engine.sst_writer(cf, Path::new(path)).map_err(|e| {
            error!(
                "open sst file path: {} failed, region_id: {}, err: {}",
                path, self.region_id, e
            );
            Error::Io(e)
        })?;
        debug!("open for write file, path: {}, region_id: {}", path, self.region_id);
        Ok(SnapshotFile::Sst(SstWriter::new(
            self.region_id,
            PathBuf::from(path),
            inner,
        )))
    }

    fn open_for_read(&self, path: &str) -> Result<SnapshotFile<E>> {
        let is_meta = is_snapshot_meta_file(path);
        let (prefix, suffix_len) = if is_meta {
            (
                meta::meta_info_prefix(self.region_id),
                SNAPSHOT_META_FILE_WITH_SLASH.len(),
            )
        } else {
            (
                region_prefix(self.region_id),
                SNAPSHOT_DATA_FILE_WITH_SLASH.len(),
            )
        };
        let snapshot_path = &path[..path.len() - suffix_len];

        let context = {
            let registry = self.snapshots.lock();
            let Some(entry) = registry.get(snapshot_path) else {
                error!(
                    "snapshot not found, path: {}, region_id: {}",
                    snapshot_path, self.region_id
                );
                return Err(Error::NotFound {
                    path: snapshot_path.to_owned(),
                });
            };
            Arc::clone(&entry.context)
        };

        {
            let mut branch = context.branch(is_meta).lock();
            if branch.is_none() {
                // First open of this virtual file within the snapshot.
                let (cf, opts) = if is_meta {
                    (
                        ColumnFamily::Meta,
                        ReadOptions {
                            total_order_seek: false,
                            prefix_same_as_start: true,
                        },
                    )
                } else {
                    (
                        ColumnFamily::Data,
                        ReadOptions {
                            total_order_seek: true,
                            prefix_same_as_start: false,
                        },
                    )
                };
                let mut iter = self.engine.iter(&context.snapshot, cf, opts)?;
                iter.seek(&prefix)?;
                *branch = Some(IterContext::new(prefix, iter, is_meta));
            }
            if let Some(ctx) = branch.as_mut() {
                if ctx.reading {
                    warn!(
                        "snapshot reader is busy, path: {}, region_id: {}",
                        path, self.region_id
                    );
                    return Err(Error::InUse {
                        path: path.to_owned(),
                    });
                }
                ctx.reading = true;
            }
        }

        debug!("region_id: {} open reader, path: {}", self.region_id, path);
        Ok(SnapshotFile::Reader(SnapshotReader::new(
            self.region_id,
            path.to_owned(),
            context,
            Arc::clone(&self.log_reader),
            is_meta,
        )))
    }

    /// Introduce (or re-reference) the snapshot directory `path`, pinning a
    /// fresh engine read view on first open. Returns `true` when the context
    /// was newly created.
    pub fn open_snapshot(&self, path: &str) -> bool {
        let mut registry = self.snapshots.lock();
        match registry.get_mut(path) {
            Some(entry) => {
                // Peers must not read the same snapshot concurrently, but
                // may read different snapshots concurrently. Keep counting
                // so teardown stays paired.
                entry.refs += 1;
                warn!("region_id: {} snapshot path: {} is busy", self.region_id, path);
                false
            }
            None => {
                let context = Arc::new(SnapshotContext::<E>::new(self.engine.snapshot()));
                registry.insert(
                    path.to_owned(),
                    Registered { context, refs: 1 },
                );
                info!("region_id: {} open snapshot path: {}", self.region_id, path);
                true
            }
        }
    }

    /// Drop one reference to the snapshot directory `path`; the last close
    /// releases the iterator contexts and the engine read view.
    pub fn close_snapshot(&self, path: &str) {
        info!("region_id: {} close snapshot path: {}", self.region_id, path);
        let mut registry = self.snapshots.lock();
        if let Some(entry) = registry.get_mut(path) {
            entry.refs -= 1;
            if entry.refs == 0 {
                registry.remove(path);
                debug!("region_id: {} snapshot path: {} released", self.region_id, path);
            }
        }
        // Notify anyone waiting to tear down the adaptor.
        self.registry_drained.notify_all();
    }

    /// Release a reader's exclusivity on its iterator context, addressed by
    /// the virtual file path. The cursor is retained for a later open of the
    /// same virtual file.
    ///
    /// Transports that track open files by path use this instead of the
    /// reader handle; both release through the same snapshot context.
    pub fn close(&self, path: &str) {
        let is_meta = is_snapshot_meta_file(path);
        let suffix_len = if is_meta {
            SNAPSHOT_META_FILE_WITH_SLASH.len()
        } else {
            SNAPSHOT_DATA_FILE_WITH_SLASH.len()
        };
        let snapshot_path = &path[..path.len().saturating_sub(suffix_len)];

        let context = {
            let registry = self.snapshots.lock();
            let Some(entry) = registry.get(snapshot_path) else {
                error!(
                    "no snapshot found when closing reader, path: {}, region_id: {}",
                    path, self.region_id
                );
                return;
            };
            Arc::clone(&entry.context)
        };
        context.release_reader(is_meta);
    }

    pub fn delete_file(&self, path: &str, recursive: bool) -> io::Result<()> {
        let path = Path::new(path);
        if path.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        }
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> io::Result<()> {
        fs::rename(old_path, new_path)
    }

    pub fn link(&self, old_path: &str, new_path: &str) -> io::Result<()> {
        fs::hard_link(old_path, new_path)
    }

    pub fn create_directory(&self, path: &str, create_parent_directories: bool) -> io::Result<()> {
        if create_parent_directories {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        }
    }

    pub fn path_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }

    pub fn directory_reader(&self, path: &str) -> io::Result<DirReader> {
        DirReader::open(Path::new(path))
    }

    fn wait_drained(&self) {
        let mut registry = self.snapshots.lock();
        while !registry.is_empty() {
            self.registry_drained.wait(&mut registry);
        }
    }
}

impl<E: Engine> Drop for SnapshotAdaptor<E> {
    fn drop(&mut self) {
        // Wait for all snapshot sessions to finish, so the engine views are
        // not released while a transport session still references them.
        self.wait_drained();
        info!("region_id: {} snapshot adaptor released", self.region_id);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{engine::mem::Memory, testing::InMemoryLogs};

    #[test]
    fn classifies_virtual_file_paths() {
        assert!(is_snapshot_data_file("/snap/region_1/data.sst"));
        assert!(is_snapshot_meta_file("/snap/region_1/meta.sst"));
        assert!(!is_snapshot_data_file("/snap/region_1/meta.sst"));
        assert!(!is_snapshot_data_file("/snap/region_1/raft_meta"));
        assert!(!is_snapshot_data_file("data.sst"));
    }

    #[test]
    fn teardown_waits_for_open_snapshots() {
        let adaptor = SnapshotAdaptor::new(1, Memory::new(), Arc::new(InMemoryLogs::new()));
        adaptor.open_snapshot("/s/d");

        let started = Instant::now();
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                adaptor.close_snapshot("/s/d");
            });
            adaptor.wait_drained();
        });
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(adaptor.open_snapshots(), 0);
    }
}
