//! Crash simulation for redo log tests.
//!
//! [`CrashableStore`] wraps any [`SegmentStore`] and routes every writable
//! segment through a [`CrashableBackend`]. All backends share one
//! [`CrashControl`], so a test can say "the process dies after N more bytes"
//! without knowing which segment those bytes land in.
//!
//! A crashed backend keeps whatever bytes reached the inner store and fails
//! every later write, sync and truncate, like a process that stopped
//! mid-`write(2)`. Reopening a writer over the inner store then shows what
//! recovery makes of the leftovers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let inner = MemorySegmentStore::new();
//! let store = CrashableStore::new(inner.clone());
//! let writer = LogWriter::with_store(store.clone(), LogConfig::default())?;
//! store.control().crash_after_more(10);
//! assert!(writer.append(&record).is_err());
//! let recovered = LogWriter::with_store(inner, LogConfig::default())?;
//! ```

use redolog_core::{CoreError, CoreResult, SegmentId, SegmentStore};
use redolog_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Part of a frame reaches storage.
    DuringAppend {
        /// Bytes of the frame that survive.
        keep: u64,
    },
    /// The frame is written but the sync fails.
    DuringSync,
    /// Creating the next segment fails.
    DuringSegmentCreate,
}

/// Crash trigger shared by every backend of a [`CrashableStore`].
#[derive(Debug)]
pub struct CrashControl {
    crash_after_bytes: AtomicU64,
    bytes_written: AtomicU64,
    crashed: AtomicBool,
    fail_sync: AtomicBool,
    fail_create: AtomicBool,
}

impl Default for CrashControl {
    fn default() -> Self {
        Self {
            crash_after_bytes: AtomicU64::new(u64::MAX),
            bytes_written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
        }
    }
}

impl CrashControl {
    /// Bytes appended through the store so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Crashes once `extra` more bytes have been appended.
    pub fn crash_after_more(&self, extra: u64) {
        let at = self.bytes_written().saturating_add(extra);
        self.crash_after_bytes.store(at, Ordering::SeqCst);
    }

    /// Arms `point`.
    pub fn arm(&self, point: CrashPoint) {
        match point {
            CrashPoint::DuringAppend { keep } => self.crash_after_more(keep),
            CrashPoint::DuringSync => self.fail_sync.store(true, Ordering::SeqCst),
            CrashPoint::DuringSegmentCreate => self.fail_create.store(true, Ordering::SeqCst),
        }
    }

    /// Returns whether a crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Clears every trigger and the crashed flag.
    pub fn reset(&self) {
        self.crash_after_bytes.store(u64::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
        self.fail_create.store(false, Ordering::SeqCst);
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }

    fn check_alive(&self, what: &str) -> StorageResult<()> {
        if self.has_crashed() {
            Err(self.crash(what))
        } else {
            Ok(())
        }
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Wraps `inner`, crashing when `control` says so.
    pub fn new(inner: Box<dyn StorageBackend>, control: Arc<CrashControl>) -> Self {
        Self { inner, control }
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.control.check_alive("write")?;
        let len = data.len() as u64;
        let current = self.control.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = self.control.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.control.crash("write"));
        }
        if current + len > threshold {
            // Part of the write reaches storage before the crash.
            let partial = usize::try_from(threshold - current).unwrap_or(data.len());
            if partial > 0 {
                let _ = self.inner.append(&data[..partial]);
            }
            return Err(self.control.crash("partial write"));
        }
        self.inner.append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.control.check_alive("sync")?;
        if self.control.fail_sync.load(Ordering::SeqCst) {
            return Err(self.control.crash("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.control.check_alive("truncate")?;
        self.inner.truncate(new_size)
    }
}

/// A segment store whose writable segments can crash.
#[derive(Clone)]
pub struct CrashableStore<S> {
    inner: S,
    control: Arc<CrashControl>,
}

impl<S: SegmentStore> CrashableStore<S> {
    /// Wraps `inner` with a fresh, unarmed control.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            control: Arc::new(CrashControl::default()),
        }
    }

    /// The shared crash trigger.
    pub fn control(&self) -> &CrashControl {
        &self.control
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn wrap(&self, backend: Box<dyn StorageBackend>) -> Box<dyn StorageBackend> {
        Box::new(CrashableBackend::new(backend, Arc::clone(&self.control)))
    }
}

impl<S: SegmentStore> SegmentStore for CrashableStore<S> {
    fn list_segments(&self) -> CoreResult<Vec<SegmentId>> {
        self.inner.list_segments()
    }

    fn create_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        if self.control.has_crashed() || self.control.fail_create.load(Ordering::SeqCst) {
            return Err(CoreError::Storage(self.control.crash("segment create")));
        }
        Ok(self.wrap(self.inner.create_segment(id)?))
    }

    fn open_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(self.wrap(self.inner.open_segment(id)?))
    }

    fn read_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        self.inner.read_segment(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redolog_storage::InMemoryBackend;

    fn backend(control: &Arc<CrashControl>) -> CrashableBackend {
        CrashableBackend::new(Box::new(InMemoryBackend::new()), Arc::clone(control))
    }

    #[test]
    fn partial_write_keeps_prefix() {
        let control = Arc::new(CrashControl::default());
        let mut b = backend(&control);
        b.append(b"abcd").unwrap();
        control.crash_after_more(2);
        assert!(b.append(b"efgh").is_err());
        assert!(control.has_crashed());
        assert_eq!(b.size().unwrap(), 6);
        assert_eq!(b.read_at(0, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn crashed_backend_rejects_everything() {
        let control = Arc::new(CrashControl::default());
        let mut b = backend(&control);
        control.arm(CrashPoint::DuringAppend { keep: 0 });
        assert!(b.append(b"x").is_err());
        assert!(b.truncate(0).is_err());
        assert!(b.sync().is_err());

        control.reset();
        assert!(b.append(b"y").is_ok());
    }

    #[test]
    fn sync_failure() {
        let control = Arc::new(CrashControl::default());
        let mut b = backend(&control);
        control.arm(CrashPoint::DuringSync);
        b.append(b"x").unwrap();
        assert!(b.sync().is_err());
    }
}
