//! The storage engine surface consumed by the snapshot transport.
//!
//! The real engine is a rocks-style ordered key-value store. Only the small
//! surface needed to stream and install region snapshots is abstracted here,
//! which also keeps the transport testable against an in-memory stand-in
//! (see [`mem`]).

use std::{io, path::Path};

#[cfg(any(test, feature = "test"))]
pub mod mem;

/// The column families a region snapshot touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnFamily {
    /// Row data, keyed by the region prefix.
    Data,
    /// Region bookkeeping: applied index, prepared transaction records.
    Meta,
}

/// Iterator tuning, mirroring the engine's read options.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    /// Ignore prefix bloom filters and iterate in total order.
    pub total_order_seek: bool,
    /// Bound the iteration to keys sharing the seek prefix.
    pub prefix_same_as_start: bool,
}

/// A forward iterator over one column family of an engine snapshot.
pub trait SnapshotIter {
    /// Position the iterator at the first key `>= key`.
    fn seek(&mut self, key: &[u8]) -> io::Result<()>;

    /// `false` once the iterator has moved past the last entry, or after an
    /// iteration error.
    fn valid(&self) -> bool;

    /// Current key. Only meaningful while [`Self::valid`] returns `true`.
    fn key(&self) -> &[u8];

    /// Current value. Only meaningful while [`Self::valid`] returns `true`.
    fn value(&self) -> &[u8];

    /// Advance to the next entry.
    fn next(&mut self) -> io::Result<()>;
}

/// A bulk-load writer producing the engine's sorted static file format.
pub trait SstWrite {
    /// Add one pair. Keys must arrive in strictly ascending order.
    fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()>;

    /// Finalize the file on disk.
    fn finish(&mut self) -> io::Result<()>;
}

/// Handle to the ordered key-value engine.
pub trait Engine: Clone + Send + Sync + 'static {
    /// A consistent point-in-time read view. Dropping the handle releases
    /// the view.
    type Snapshot: Send + Sync + 'static;
    type Iter: SnapshotIter + Send + 'static;
    type SstWriter: SstWrite + Send + 'static;

    /// Pin a consistent read view of the current state.
    fn snapshot(&self) -> Self::Snapshot;

    /// Open an iterator over `cf` within the pinned view.
    fn iter(
        &self,
        snapshot: &Self::Snapshot,
        cf: ColumnFamily,
        opts: ReadOptions,
    ) -> io::Result<Self::Iter>;

    /// Open a bulk-load writer at `path` with options appropriate for `cf`.
    fn sst_writer(&self, cf: ColumnFamily, path: &Path) -> io::Result<Self::SstWriter>;
}
