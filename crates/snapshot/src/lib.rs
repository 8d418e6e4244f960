//! Snapshot transport for region replication.
//!
//! The consensus layer ships a region snapshot between replicas as a set of
//! files. Rather than materializing those files on disk, this crate maps
//! them onto the storage engine directly: on the sending side a pair of
//! virtual files ([`SNAPSHOT_DATA_FILE`], [`SNAPSHOT_META_FILE`]) streams a
//! framed iteration over a pinned engine snapshot, and on the receiving side
//! the same framed stream is fed straight into a bulk-load file writer.
//! Paths outside the snapshot namespace fall through to the host filesystem.
//!
//! [`SnapshotAdaptor`] is the entry point. The transport introduces a
//! snapshot directory with [`SnapshotAdaptor::open_snapshot`], opens and
//! re-opens virtual files beneath it while the transfer runs, and finally
//! drops its reference with [`SnapshotAdaptor::close_snapshot`].

use bitflags::bitflags;

mod adaptor;
mod context;
mod posix;
mod reader;
mod sst;
mod txlog;

pub mod engine;
pub mod error;
pub mod frame;

#[cfg(any(test, feature = "test"))]
pub mod testing;

pub use crate::{
    adaptor::{SnapshotAdaptor, SnapshotFile},
    error::{Error, Result},
    posix::{DirReader, PosixFile},
    reader::SnapshotReader,
    sst::SstWriter,
    txlog::LogEntryReader,
};

/// Basename of the data virtual file within a snapshot directory.
pub const SNAPSHOT_DATA_FILE: &str = "data.sst";
/// Basename of the meta virtual file within a snapshot directory.
pub const SNAPSHOT_META_FILE: &str = "meta.sst";

pub(crate) const SNAPSHOT_DATA_FILE_WITH_SLASH: &str = "/data.sst";
pub(crate) const SNAPSHOT_META_FILE_WITH_SLASH: &str = "/meta.sst";

bitflags! {
    /// Open disposition accepted by [`SnapshotAdaptor::open`].
    ///
    /// Without [`OpenFlags::WRITE_ONLY`] the file is opened for reading.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct OpenFlags: u32 {
        const WRITE_ONLY = 0b0001;
        const CREATE     = 0b0010;
        const TRUNCATE   = 0b0100;
        const APPEND     = 0b1000;
    }
}
