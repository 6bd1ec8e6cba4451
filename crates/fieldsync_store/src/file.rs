//! Append-only file storage for journal bytes.

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Journal bytes on disk.
///
/// One instance owns one log file under the store directory. The handle
/// stays open for the backend's lifetime and the length is cached, so
/// append offsets never need a metadata round trip. `flush` pushes
/// buffered bytes to the OS and `sync` forces them to the device.
/// Compaction goes through [`StoreBackend::replace`], which stages a
/// sibling `.tmp` file and renames it into place, so a crash leaves
/// either the old log or the new one, never a mix.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    handle: RwLock<File>,
    len: RwLock<u64>,
}

impl FileBackend {
    /// Opens the log file at `path`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = handle.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            handle: RwLock::new(handle),
            len: RwLock::new(len),
        })
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StoreBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let size = *self.len.read();
        if offset > size || offset.saturating_add(len as u64) > size {
            return Err(StoreError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        // Seek moves the cursor, so reads take the write lock too
        let mut handle = self.handle.write();
        handle.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; len];
        handle.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let mut handle = self.handle.write();
        let mut len = self.len.write();
        if data.is_empty() {
            return Ok(*len);
        }

        handle.seek(SeekFrom::End(0))?;
        handle.write_all(data)?;
        let offset = *len;
        *len += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.handle.write().flush()?;
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(*self.len.read())
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.handle.write().sync_all()?;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        let staging = self.staging_path();
        {
            let mut tmp = File::create(&staging)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        // The held handle still points at the renamed-over inode; reopen
        let reopened = OpenOptions::new().read(true).write(true).open(&self.path)?;
        reopened.sync_all()?;
        *self.handle.write() = reopened;
        *self.len.write() = data.len() as u64;
        Ok(())
    }
}
