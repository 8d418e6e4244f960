//! Receiving side of a snapshot install: framed stream to bulk-load file.

use std::{fs, io, path::PathBuf};

use log::{debug, error, warn};

use crate::{
    engine::SstWrite,
    error::{Error, Result},
    frame,
};

/// Accepts the framed snapshot stream and produces the engine's sorted
/// bulk-load file.
///
/// The transport delivers pairs in ascending key order, which is the only
/// order the bulk-load format accepts; a violation is a protocol error and
/// poisons the writer.
pub struct SstWriter<W: SstWrite> {
    region_id: i64,
    path: PathBuf,
    inner: W,
    count: u64,
    last_key: Option<Vec<u8>>,
    /// Trailing bytes of an incomplete frame, completed by the next write.
    carry: Vec<u8>,
    failed: bool,
    closed: bool,
}

impl<W: SstWrite> SstWriter<W> {
    pub(crate) fn new(region_id: i64, path: PathBuf, inner: W) -> Self {
        Self {
            region_id,
            path,
            inner,
            count: 0,
            last_key: None,
            carry: Vec::new(),
            failed: false,
            closed: false,
        }
    }

    /// Parse `data` as framed (key, value) pairs and insert them in order.
    /// `offset` is informational only.
    ///
    /// The transport chunks the stream at arbitrary byte boundaries, so a
    /// frame may straddle two deliveries; the trailing incomplete frame is
    /// carried over and completed by the next call.
    pub fn write(&mut self, data: &[u8], offset: i64) -> Result<usize> {
        let _ = offset;
        if self.closed {
            return Err(Error::Closed {
                path: self.path.display().to_string(),
            });
        }
        if self.failed {
            return Err(Error::Io(io::Error::other("sst writer already failed")));
        }
        if data.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "empty sst write".into(),
            });
        }
        let pairs = if self.carry.is_empty() {
            let (pairs, consumed) = frame::decode_prefix(data);
            self.carry.extend_from_slice(&data[consumed..]);
            pairs
        } else {
            let mut stream = std::mem::take(&mut self.carry);
            stream.extend_from_slice(data);
            let (pairs, consumed) = frame::decode_prefix(&stream);
            self.carry.extend_from_slice(&stream[consumed..]);
            pairs
        };
        for (key, value) in &pairs {
            if self.last_key.as_deref().is_some_and(|last| key.as_slice() <= last) {
                self.failed = true;
                error!(
                    "out-of-order key in sst stream, path: {}, region_id: {}",
                    self.path.display(),
                    self.region_id
                );
                return Err(Error::OutOfOrderKey);
            }
            if let Err(e) = self.inner.put(key, value) {
                self.failed = true;
                error!(
                    "write sst file path: {} failed, region_id: {}, err: {}",
                    self.path.display(),
                    self.region_id,
                    e
                );
                return Err(e.into());
            }
            self.last_key = Some(key.clone());
            self.count += 1;
        }
        debug!(
            "sst write, region_id: {}, path: {}, data len: {}, keys: {}, total_count: {}, carried: {}",
            self.region_id,
            self.path.display(),
            data.len(),
            pairs.len(),
            self.count,
            self.carry.len()
        );
        Ok(data.len())
    }

    /// Finalize the bulk-load file, or delete it when nothing was written or
    /// the stream failed. The stream must end on a frame boundary; dangling
    /// carried bytes mean the install was cut short.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            warn!("file has been closed, path: {}", self.path.display());
            return Ok(());
        }
        self.closed = true;
        let dangling = if self.carry.is_empty() {
            None
        } else {
            error!(
                "sst stream ended mid-frame, path: {}, region_id: {}, dangling bytes: {}",
                self.path.display(),
                self.region_id,
                self.carry.len()
            );
            self.failed = true;
            frame::decode(&self.carry).err()
        };
        if self.count > 0 && !self.failed {
            self.inner.finish()?;
            debug!(
                "sst writer finished, path: {}, region_id: {}, keys: {}",
                self.path.display(),
                self.region_id,
                self.count
            );
        } else {
            debug!(
                "count is {}, delete path: {}, region_id: {}",
                self.count,
                self.path.display(),
                self.region_id
            );
            fs::remove_file(&self.path)?;
        }
        match dangling {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn read(&mut self, _portal: &mut Vec<u8>, _offset: i64, _size: usize) -> Result<usize> {
        Err(Error::Unsupported { op: "read" })
    }

    pub fn size(&self) -> Result<i64> {
        Err(Error::Unsupported { op: "size" })
    }

    pub fn sync(&mut self) -> Result<()> {
        Err(Error::Unsupported { op: "sync" })
    }
}

impl<W: SstWrite> Drop for SstWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing sst writer failed, path: {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::{ColumnFamily, Engine as _, mem::Memory};

    fn writer(engine: &Memory, path: &Path) -> SstWriter<<Memory as crate::engine::Engine>::SstWriter> {
        let inner = engine.sst_writer(ColumnFamily::Data, path).unwrap();
        SstWriter::new(1, path.to_owned(), inner)
    }

    fn framed(pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (key, value) in pairs {
            frame::append_kv(Some(&mut buf), key, value);
        }
        buf
    }

    #[test]
    fn ordered_stream_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        let data = framed(&[(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3")]);
        assert_eq!(sst.write(&data, 0).unwrap(), data.len());
        sst.close().unwrap();

        let pairs = Memory::read_sst(&path).unwrap();
        assert_eq!(
            pairs,
            vec![
                (b"k1".to_vec(), b"v1".to_vec()),
                (b"k2".to_vec(), b"v2".to_vec()),
                (b"k3".to_vec(), b"v3".to_vec()),
            ]
        );
    }

    #[test]
    fn frames_split_across_writes_are_reassembled() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        let data = framed(&[(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3")]);
        // Split inside the first frame's key chunk.
        let split = 5;
        assert_eq!(sst.write(&data[..split], 0).unwrap(), split);
        assert_eq!(sst.write(&data[split..], split as i64).unwrap(), data.len() - split);
        sst.close().unwrap();

        assert_eq!(
            Memory::read_sst(&path).unwrap(),
            vec![
                (b"k1".to_vec(), b"v1".to_vec()),
                (b"k2".to_vec(), b"v2".to_vec()),
                (b"k3".to_vec(), b"v3".to_vec()),
            ]
        );
    }

    #[test]
    fn stream_ending_mid_frame_fails_and_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        let data = framed(&[(b"k1", b"v1")]);
        assert_eq!(sst.write(&data[..data.len() - 3], 0).unwrap(), data.len() - 3);
        assert!(matches!(sst.close(), Err(Error::Frame(_))));
        assert!(!path.exists());
    }

    #[test]
    fn out_of_order_key_fails_and_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        let data = framed(&[(b"k2", b"v2"), (b"k1", b"v1")]);
        assert!(matches!(sst.write(&data, 0), Err(Error::OutOfOrderKey)));
        sst.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn close_without_keys_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("meta.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        assert!(path.exists());
        sst.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn writes_after_close_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        sst.close().unwrap();
        let data = framed(&[(b"k1", b"v1")]);
        assert!(matches!(sst.write(&data, 0), Err(Error::Closed { .. })));
    }

    #[test]
    fn empty_write_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        assert!(matches!(sst.write(&[], 0), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn unsupported_operations_fail_deterministically() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.sst");
        let engine = Memory::new();

        let mut sst = writer(&engine, &path);
        assert!(matches!(sst.read(&mut Vec::new(), 0, 16), Err(Error::Unsupported { op: "read" })));
        assert!(matches!(sst.size(), Err(Error::Unsupported { op: "size" })));
        assert!(matches!(sst.sync(), Err(Error::Unsupported { op: "sync" })));
    }
}
