//! Log directory management.
//!
//! ```text
//! <log_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ segments/
//!    ├─ seg-000001.log
//!    └─ seg-000002.log
//! ```
//!
//! The LOCK file ensures only one process appends to a log at a time.
//! Readers open the directory without taking the lock.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use fs2::FileExt;
use redolog_storage::{FileBackend, StorageBackend, StorageError};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SEGMENTS_DIR: &str = "segments";
const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_SUFFIX: &str = ".log";

/// Where segments live.
///
/// [`LogDir`] keeps them as files; [`crate::MemorySegmentStore`] keeps them
/// in memory for tests and embedding.
pub trait SegmentStore: Send + Sync {
    /// Lists existing segments in ascending id order.
    fn list_segments(&self) -> CoreResult<Vec<SegmentId>>;

    /// Creates a new, empty segment. Fails if it already exists.
    fn create_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>>;

    /// Opens an existing segment for appending.
    fn open_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>>;

    /// Opens an existing segment for reading.
    fn read_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>>;
}

/// Manages the log directory layout and its lock.
///
/// # Example
///
/// ```rust,ignore
/// use redolog_core::LogDir;
/// use std::path::Path;
///
/// let dir = LogDir::open(Path::new("redo"), true)?;
/// println!("segments: {:?}", dir.segments_dir());
/// ```
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    /// Held for exclusive access; `None` for read-only directories.
    lock_file: Option<File>,
}

impl LogDir {
    /// Opens or creates a log directory and takes the writer lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `LogLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path.join(SEGMENTS_DIR))?;
            } else {
                return Err(CoreError::invalid_log_dir(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_log_dir(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
        fs::create_dir_all(path.join(SEGMENTS_DIR))?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::LogLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock_file: Some(lock_file),
        })
    }

    /// Opens an existing log directory for reading. No lock is taken and
    /// segments can only be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or its `segments/` folder is
    /// missing.
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        if !path.join(SEGMENTS_DIR).is_dir() {
            return Err(CoreError::invalid_log_dir(format!(
                "not a log directory: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            lock_file: None,
        })
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if this handle may create or append to segments.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.lock_file.is_some()
    }

    /// Directory holding the segment files.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.path.join(SEGMENTS_DIR)
    }

    /// Path of the file for `id`.
    #[must_use]
    pub fn segment_path(&self, id: SegmentId) -> PathBuf {
        self.segments_dir()
            .join(format!("{SEGMENT_PREFIX}{:06}{SEGMENT_SUFFIX}", id.as_u64()))
    }

    fn require_writable(&self) -> CoreResult<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(StorageError::ReadOnly.into())
        }
    }

    /// Syncs the segments directory so created files survive a crash.
    #[cfg(unix)]
    fn sync_segments_directory(&self) -> CoreResult<()> {
        File::open(self.segments_dir())?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_segments_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}

fn parse_segment_name(name: &str) -> Option<SegmentId> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(SegmentId::new)
}

impl SegmentStore for LogDir {
    fn list_segments(&self) -> CoreResult<Vec<SegmentId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.segments_dir())? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_segment_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn create_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        self.require_writable()?;
        let path = self.segment_path(id);
        if path.exists() {
            return Err(CoreError::invalid_log_dir(format!(
                "segment already exists: {}",
                path.display()
            )));
        }
        let backend = FileBackend::create(&path)?;
        self.sync_segments_directory()?;
        tracing::debug!(segment = %id, path = %path.display(), "created segment file");
        Ok(Box::new(backend))
    }

    fn open_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        self.require_writable()?;
        let path = self.segment_path(id);
        if !path.exists() {
            return Err(CoreError::invalid_log_dir(format!(
                "segment missing: {}",
                path.display()
            )));
        }
        Ok(Box::new(FileBackend::create(&path)?))
    }

    fn read_segment(&self, id: SegmentId) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::open_read_only(&self.segment_path(id))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let log_path = temp.path().join("redo");

        let dir = LogDir::open(&log_path, true).unwrap();
        assert!(dir.segments_dir().is_dir());
        assert!(log_path.join(LOCK_FILE).exists());
        assert!(dir.list_segments().unwrap().is_empty());
    }

    #[test]
    fn open_fails_if_missing_and_no_create() {
        let temp = tempdir().unwrap();
        let result = LogDir::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(CoreError::InvalidLogDir { .. })));
    }

    #[test]
    fn lock_prevents_second_writer() {
        let temp = tempdir().unwrap();
        let _first = LogDir::open(temp.path(), true).unwrap();
        assert!(matches!(
            LogDir::open(temp.path(), true),
            Err(CoreError::LogLocked)
        ));
        // Readers are not blocked by the writer lock.
        assert!(LogDir::open_read_only(temp.path()).is_ok());
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(LogDir::open(temp.path(), true).unwrap());
        assert!(LogDir::open(temp.path(), true).is_ok());
    }

    #[test]
    fn segments_listed_in_order() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();
        for id in [3, 1, 2] {
            dir.create_segment(SegmentId::new(id)).unwrap();
        }
        fs::write(dir.segments_dir().join("notes.txt"), b"x").unwrap();

        let ids = dir.list_segments().unwrap();
        assert_eq!(ids, vec![SegmentId::new(1), SegmentId::new(2), SegmentId::new(3)]);
        assert_eq!(
            dir.segment_path(SegmentId::new(2)),
            temp.path().join("segments").join("seg-000002.log")
        );
        assert!(dir.create_segment(SegmentId::new(2)).is_err());
    }

    #[test]
    fn read_only_dir_refuses_writes() {
        let temp = tempdir().unwrap();
        drop(LogDir::open(temp.path(), true).unwrap());
        let dir = LogDir::open_read_only(temp.path()).unwrap();
        assert!(!dir.is_writable());
        assert!(matches!(
            dir.create_segment(SegmentId::FIRST),
            Err(CoreError::Storage(StorageError::ReadOnly))
        ));
    }

    #[test]
    fn segment_names_parse() {
        assert_eq!(parse_segment_name("seg-000042.log"), Some(SegmentId::new(42)));
        assert_eq!(parse_segment_name("seg-.log"), None);
        assert_eq!(parse_segment_name("seg-00x1.log"), None);
        assert_eq!(parse_segment_name("LOCK"), None);
    }
}
