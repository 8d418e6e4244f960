//! Virtual file over a prefix-bounded iteration of a live engine snapshot.

use std::{io, sync::Arc};

use granitedb_keys::meta;
use log::{debug, error, warn};

use crate::{
    context::SnapshotContext,
    engine::{Engine, SnapshotIter as _},
    error::{Error, Result},
    frame,
    txlog::LogEntryReader,
};

/// Streams a region snapshot as framed (key, value) pairs.
///
/// The transport opens and destroys readers freely while a snapshot is being
/// served; the iterator context persists in the snapshot context, so a new
/// reader resumes exactly where the previous one stopped.
pub struct SnapshotReader<E: Engine> {
    region_id: i64,
    path: String,
    context: Arc<SnapshotContext<E>>,
    log_reader: Arc<dyn LogEntryReader>,
    is_meta: bool,
    log_index_prefix: Vec<u8>,
    txn_info_prefix: Vec<u8>,
    closed: bool,
}

impl<E: Engine> SnapshotReader<E> {
    pub(crate) fn new(
        region_id: i64,
        path: String,
        context: Arc<SnapshotContext<E>>,
        log_reader: Arc<dyn LogEntryReader>,
        is_meta: bool,
    ) -> Self {
        Self {
            region_id,
            path,
            context,
            log_reader,
            is_meta,
            log_index_prefix: meta::log_index_key_prefix(region_id),
            txn_info_prefix: meta::transaction_pb_key_prefix(region_id),
            closed: false,
        }
    }

    /// Append up to `size` bytes of the framed stream, starting at logical
    /// position `offset`, to `portal`. Returns the number of bytes appended;
    /// zero once the iteration has consumed its prefix.
    ///
    /// Requesting an `offset` before the current cursor re-seeks the
    /// iterator to the prefix and re-walks. Already-produced bytes are never
    /// cached; the transport only seeks backward on retry.
    pub fn read(&mut self, portal: &mut Vec<u8>, offset: i64, size: usize) -> Result<usize> {
        if self.closed {
            error!(
                "read on closed snapshot reader, region_id: {}, path: {}",
                self.region_id, self.path
            );
            return Err(Error::Closed {
                path: self.path.clone(),
            });
        }
        if offset < 0 {
            error!("region_id: {} read error, offset: {}", self.region_id, offset);
            return Err(Error::InvalidArgument {
                reason: format!("negative offset: {offset}"),
            });
        }

        let mut guard = self.context.branch(self.is_meta).lock();
        let Some(ctx) = guard.as_mut() else {
            return Err(Error::Closed {
                path: self.path.clone(),
            });
        };

        if offset < ctx.offset {
            ctx.offset = 0;
            ctx.entry_pos = 0;
            ctx.entry = None;
            ctx.done = false;
            if let Err(e) = ctx.iter.seek(&ctx.prefix) {
                ctx.done = true;
                return Err(e.into());
            }
        }

        let mut appended = 0;
        let mut key_num = 0u64;
        while appended < size && !ctx.done {
            if !ctx.iter.valid() || !ctx.iter.key().starts_with(&ctx.prefix) {
                ctx.done = true;
                debug!(
                    "region_id: {} snapshot read over, total size: {}",
                    self.region_id, ctx.offset
                );
                break;
            }
            // txn_info entries are not sent; the leader is not expected to
            // carry them, but a leader change during snapshot preparation
            // can leave them visible.
            if ctx.is_meta && ctx.iter.key().starts_with(&self.txn_info_prefix) {
                if let Err(e) = ctx.iter.next() {
                    ctx.done = true;
                    return Err(e.into());
                }
                continue;
            }

            let is_log_index = ctx.is_meta && ctx.iter.key().starts_with(&self.log_index_prefix);

            // A read that stopped mid-entry left its framed bytes behind;
            // reuse them so a materialized payload is fetched once per
            // entry, not once per chunk.
            let cached = ctx.entry.take();

            // Entries that end before the requested offset only need their
            // byte count.
            if cached.is_none() && !is_log_index {
                let len = frame::append_kv(None, ctx.iter.key(), ctx.iter.value());
                if ctx.offset + (len - ctx.entry_pos) as i64 <= offset {
                    ctx.offset += (len - ctx.entry_pos) as i64;
                    ctx.entry_pos = 0;
                    key_num += 1;
                    if let Err(e) = ctx.iter.next() {
                        ctx.done = true;
                        return Err(e.into());
                    }
                    continue;
                }
            }

            // A prepared transaction's log index entry is rematerialized as
            // the (transaction key, payload) pair the installing side
            // expects; everything else travels verbatim.
            let entry = match cached {
                Some(entry) => entry,
                None if is_log_index => {
                    let log_index = match meta::decode_log_index_value(ctx.iter.value()) {
                        Ok(log_index) => log_index,
                        Err(e) => {
                            ctx.done = true;
                            error!(
                                "region_id: {} invalid log index value: {}",
                                self.region_id, e
                            );
                            return Err(io::Error::new(io::ErrorKind::InvalidData, e).into());
                        }
                    };
                    let payload = match self.log_reader.read_log_entry(self.region_id, log_index) {
                        Ok(payload) => payload,
                        Err(e) => {
                            ctx.done = true;
                            error!(
                                "read txn info fail, may have been removed, region_id: {}, log_index: {}",
                                self.region_id, log_index
                            );
                            return Err(e.into());
                        }
                    };
                    let mut buf = Vec::with_capacity(2 * frame::LEN_PREFIX + payload.len() + 32);
                    frame::append_kv(
                        Some(&mut buf),
                        &meta::transaction_pb_key(self.region_id, log_index),
                        &payload,
                    );
                    buf
                }
                None => {
                    let mut buf = Vec::new();
                    frame::append_kv(Some(&mut buf), ctx.iter.key(), ctx.iter.value());
                    buf
                }
            };

            // Bytes before the requested offset go to the null sink; the
            // rest lands in the portal, capped at `size`. A read may stop
            // mid-entry; `entry_pos` keeps the position for the next call.
            let len = entry.len();
            if ctx.offset < offset {
                let discard = ((offset - ctx.offset) as usize).min(len - ctx.entry_pos);
                ctx.entry_pos += discard;
                ctx.offset += discard as i64;
            }
            if ctx.entry_pos < len && ctx.offset >= offset {
                let take = (size - appended).min(len - ctx.entry_pos);
                portal.extend_from_slice(&entry[ctx.entry_pos..ctx.entry_pos + take]);
                ctx.entry_pos += take;
                ctx.offset += take as i64;
                appended += take;
            }
            if ctx.entry_pos == len {
                ctx.entry_pos = 0;
                key_num += 1;
                if let Err(e) = ctx.iter.next() {
                    ctx.done = true;
                    return Err(e.into());
                }
            } else {
                ctx.entry = Some(entry);
            }
        }
        debug!(
            "region_id: {} read done, count: {}, key_num: {}",
            self.region_id, appended, key_num
        );
        Ok(appended)
    }

    /// Total stream length once the iteration is exhausted; before that, a
    /// sentinel the transport interprets as "keep reading".
    ///
    /// Anything else would force a full pre-walk of the snapshot.
    pub fn size(&self) -> Result<i64> {
        let guard = self.context.branch(self.is_meta).lock();
        let Some(ctx) = guard.as_ref() else {
            return Err(Error::Closed {
                path: self.path.clone(),
            });
        };
        Ok(if ctx.done { ctx.offset } else { i64::MAX })
    }

    pub fn write(&mut self, _data: &[u8], _offset: i64) -> Result<usize> {
        Err(Error::Unsupported { op: "write" })
    }

    pub fn sync(&mut self) -> Result<()> {
        Err(Error::Unsupported { op: "sync" })
    }

    /// Release exclusivity on the iterator context.
    ///
    /// The cursor is retained: the transport destroys and re-opens readers
    /// many times over the life of one snapshot, and a later open must
    /// resume at the same logical offset.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            warn!("file has been closed, path: {}", self.path);
            return Ok(());
        }
        self.closed = true;
        self.context.release_reader(self.is_meta);
        Ok(())
    }
}

impl<E: Engine> Drop for SnapshotReader<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
