//! In-memory segment store.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use crate::wal::dir::SegmentStore;
use parking_lot::Mutex;
use redolog_storage::{InMemoryBackend, StorageBackend, StorageResult};
use std::collections::BTreeMap;
use std::sync::Arc;

type SharedSegment = Arc<Mutex<InMemoryBackend>>;

/// Segment store kept entirely in memory.
///
/// Handles returned by the store share bytes with it, so a reader opened
/// after an append sees the appended frame. Useful for tests and for
/// embedding a log in a process that persists it some other way.
#[derive(Debug, Default, Clone)]
pub struct MemorySegmentStore {
    segments: Arc<Mutex<BTreeMap<SegmentId, SharedSegment>>>,
}

impl MemorySegmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a segment's bytes.
    #[must_use]
    pub fn segment_bytes(&self, id: SegmentId) -> Option<Vec<u8>> {
        self.segments
            .lock()
            .get(&id)
            .map(|seg| seg.lock().data().to_vec())
    }

    /// Replaces a segment's bytes, creating it if needed.
    pub fn put_segment_bytes(&self, id: SegmentId, bytes: Vec<u8>) {
        let mut segments = self.segments.lock();
        match segments.get(&id) {
            Some(seg) => *seg.lock() = InMemoryBackend::with_data(bytes),
            None => {
                segments.insert(id, Arc::new(Mutex::new(InMemoryBackend::with_data(bytes))));
            }
        }
    }

    /// Removes a segment.
    pub fn remove_segment(&self, id: SegmentId) -> bool {
        self.segments.lock().remove(&id).is_some()
    }

    fn get(&self, id: SegmentId) -> CoreResult<SharedSegment> {
        self.segments
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::invalid_log_dir(format!("segment missing: {id}")))
    }
}

impl SegmentStore for MemorySegmentStore {
    fn list_segments(&self) -> CoreResult<Vec<SegmentId>> {
        Ok(self.segments.lock().keys().copied().collect())
    }

    fn create_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        let mut segments = self.segments.lock();
        if segments.contains_key(&id) {
            return Err(CoreError::invalid_log_dir(format!(
                "segment already exists: {id}"
            )));
        }
        let seg: SharedSegment = Arc::default();
        segments.insert(id, Arc::clone(&seg));
        Ok(Box::new(SharedBackend(seg)))
    }

    fn open_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(Box::new(SharedBackend(self.get(id)?)))
    }

    fn read_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        self.open_segment(id)
    }
}

/// Backend view of one shared in-memory segment.
struct SharedBackend(SharedSegment);

impl StorageBackend for SharedBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.0.lock().read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.0.lock().append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.0.lock().sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.0.lock().size()
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        self.0.lock().truncate(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_bytes() {
        let store = MemorySegmentStore::new();
        let mut writer = store.create_segment(SegmentId::FIRST).unwrap();
        writer.append(b"hello").unwrap();

        let reader = store.read_segment(SegmentId::FIRST).unwrap();
        assert_eq!(reader.size().unwrap(), 5);
        assert_eq!(store.segment_bytes(SegmentId::FIRST).unwrap(), b"hello");
    }

    #[test]
    fn create_twice_fails() {
        let store = MemorySegmentStore::new();
        store.create_segment(SegmentId::FIRST).unwrap();
        assert!(store.create_segment(SegmentId::FIRST).is_err());
        assert!(store.open_segment(SegmentId::new(2)).is_err());
    }
}
