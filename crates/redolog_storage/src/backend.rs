//! Storage backend trait definition.

use crate::error::StorageResult;

/// A byte store holding exactly one redo log segment.
///
/// # Invariants
///
/// - `append` writes at the current end and returns that offset
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns `Ok`, every appended byte survives a crash
/// - `truncate` only ever shrinks the store
///
/// Backends must be `Send + Sync` so a segment handle can move between the
/// writer's callers.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Part of `data` may have reached
    /// the store; callers that need all-or-nothing frames cut the store back
    /// with [`StorageBackend::truncate`].
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data and the store length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform reports a failed sync.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes and makes the new length durable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateGrows`] if `new_size` is larger
    /// than the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
