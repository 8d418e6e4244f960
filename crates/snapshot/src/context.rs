//! Per-snapshot cursor state shared between the facade and its readers.

use parking_lot::Mutex;

use crate::engine::Engine;

/// Cursor state of one virtual file.
///
/// The engine iterator plus the logical byte offset are the sole source of
/// truth for positional reads; a backward seek re-initializes both. The
/// context outlives any individual reader, so the transport's frequent
/// open/read/destroy cycles resume where they left off.
pub(crate) struct IterContext<I> {
    /// Key prefix bounding the iteration.
    pub prefix: Vec<u8>,
    pub iter: I,
    pub is_meta: bool,
    /// Logical bytes of the framed stream produced so far.
    pub offset: i64,
    /// Bytes of the current entry already produced, when a read stopped
    /// mid-entry.
    pub entry_pos: usize,
    /// Framed bytes of the entry a read stopped inside, so the next call
    /// resumes without rebuilding them (or re-fetching a materialized
    /// payload).
    pub entry: Option<Vec<u8>>,
    /// The iteration walked past the prefix, or failed.
    pub done: bool,
    /// A reader currently holds this context.
    pub reading: bool,
}

impl<I> IterContext<I> {
    pub fn new(prefix: Vec<u8>, iter: I, is_meta: bool) -> Self {
        Self {
            prefix,
            iter,
            is_meta,
            offset: 0,
            entry_pos: 0,
            entry: None,
            done: false,
            reading: false,
        }
    }
}

/// Shared state of one open snapshot: a single engine read view and up to
/// two iterator cursors over it, created lazily on first open of the
/// corresponding virtual file.
pub(crate) struct SnapshotContext<E: Engine> {
    pub snapshot: E::Snapshot,
    pub data: Mutex<Option<IterContext<E::Iter>>>,
    pub meta: Mutex<Option<IterContext<E::Iter>>>,
}

impl<E: Engine> SnapshotContext<E> {
    pub fn new(snapshot: E::Snapshot) -> Self {
        Self {
            snapshot,
            data: Mutex::new(None),
            meta: Mutex::new(None),
        }
    }

    /// The cursor slot of the data or meta branch.
    pub fn branch(&self, is_meta: bool) -> &Mutex<Option<IterContext<E::Iter>>> {
        if is_meta { &self.meta } else { &self.data }
    }

    /// Clear the reading flag of the data or meta branch, releasing the
    /// cursor for the next open. Cursor position and offset are kept.
    ///
    /// Both the reader's own close and the facade's path-addressed close go
    /// through here.
    pub fn release_reader(&self, is_meta: bool) {
        if let Some(ctx) = self.branch(is_meta).lock().as_mut() {
            ctx.reading = false;
        }
    }
}
