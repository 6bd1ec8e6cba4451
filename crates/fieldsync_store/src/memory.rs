//! Byte store held in memory, for tests and ephemeral stores.

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;

/// Journal bytes in a `Vec`.
///
/// Content drops with the process, which is what recovery tests want:
/// [`with_data`](Self::with_data) replays a captured byte image as if
/// the process had died holding it.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a captured byte image.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }
}

impl StoreBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > bytes.len() {
            return Err(StoreError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[start..end].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StoreResult<()> {
        // Nothing buffered
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        *self.bytes.write() = data.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.read_at(0, 0).unwrap().is_empty());
    }

    #[test]
    fn append_reports_the_write_offset() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"queue").unwrap(), 0);
        assert_eq!(backend.append(b"cache").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 10);
    }

    #[test]
    fn reads_return_the_requested_window() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"daily log bytes").unwrap();

        assert_eq!(backend.read_at(0, 5).unwrap(), b"daily");
        assert_eq!(backend.read_at(10, 5).unwrap(), b"bytes");
    }

    #[test]
    fn reads_never_run_past_the_end() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"short").unwrap();

        assert!(matches!(
            backend.read_at(99, 1),
            Err(StoreError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(2, 50),
            Err(StoreError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn preloaded_image_replays() {
        let backend = InMemoryBackend::with_data(b"from a dead process".to_vec());
        assert_eq!(backend.size().unwrap(), 19);
        assert_eq!(backend.read_at(0, 4).unwrap(), b"from");
    }

    #[test]
    fn replace_rewrites_everything() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"a long original content").unwrap();

        backend.replace(b"live").unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert_eq!(backend.read_at(0, 4).unwrap(), b"live");
    }
}
