//! Ordinary-file and directory passthroughs.

use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io,
    os::unix::fs::FileExt as _,
    path::{Path, PathBuf},
};

use crate::{
    OpenFlags,
    error::{Error, Result},
};

/// Thin positional-I/O wrapper over an ordinary file.
pub struct PosixFile {
    path: PathBuf,
    file: Option<File>,
}

impl PosixFile {
    pub fn open(path: &Path, flags: OpenFlags) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(!flags.contains(OpenFlags::WRITE_ONLY))
            .write(flags.contains(OpenFlags::WRITE_ONLY))
            .create(flags.contains(OpenFlags::CREATE))
            .truncate(flags.contains(OpenFlags::TRUNCATE))
            .append(flags.contains(OpenFlags::APPEND))
            .open(path)?;
        Ok(Self {
            path: path.to_owned(),
            file: Some(file),
        })
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| Error::Closed {
            path: self.path.display().to_string(),
        })
    }

    /// Read up to `size` bytes at `offset`, appending them to `portal`.
    pub fn read(&mut self, portal: &mut Vec<u8>, offset: i64, size: usize) -> Result<usize> {
        if offset < 0 {
            return Err(Error::InvalidArgument {
                reason: format!("negative offset: {offset}"),
            });
        }
        let file = self.file()?;
        let mut buf = vec![0u8; size];
        let mut total = 0;
        while total < size {
            let n = file.read_at(&mut buf[total..], offset as u64 + total as u64)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        portal.extend_from_slice(&buf[..total]);
        Ok(total)
    }

    /// Write all of `data` at `offset`.
    pub fn write(&mut self, data: &[u8], offset: i64) -> Result<usize> {
        if offset < 0 {
            return Err(Error::InvalidArgument {
                reason: format!("negative offset: {offset}"),
            });
        }
        self.file()?.write_all_at(data, offset as u64)?;
        Ok(data.len())
    }

    pub fn size(&self) -> Result<i64> {
        Ok(self.file()?.metadata()?.len() as i64)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file()?.sync_all()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

/// Forward iteration over the basenames in a directory.
///
/// The synthetic `.` and `..` entries never appear.
pub struct DirReader {
    inner: fs::ReadDir,
}

impl DirReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            inner: fs::read_dir(path)?,
        })
    }
}

impl Iterator for DirReader {
    type Item = io::Result<OsString>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| entry.map(|e| e.file_name()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn positional_read_write_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wal");

        let mut file = PosixFile::open(
            &path,
            OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        )
        .unwrap();
        assert_eq!(file.write(b"hello world", 0).unwrap(), 11);
        file.sync().unwrap();
        assert_eq!(file.size().unwrap(), 11);
        file.close().unwrap();
        assert!(matches!(file.write(b"x", 0), Err(Error::Closed { .. })));

        let mut file = PosixFile::open(&path, OpenFlags::empty()).unwrap();
        let mut portal = Vec::new();
        assert_eq!(file.read(&mut portal, 6, 64).unwrap(), 5);
        assert_eq!(portal, b"world");
        assert!(matches!(
            file.read(&mut portal, -1, 64),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn dir_reader_lists_basenames() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a"), b"").unwrap();
        fs::create_dir(tmp.path().join("b")).unwrap();

        let mut names: Vec<_> = DirReader::open(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec![OsString::from("a"), OsString::from("b")]);
    }
}
