//! # redolog storage
//!
//! Byte-store backends that hold redo log segments.
//!
//! A backend is an **opaque byte store**: it knows nothing about segment
//! headers, frames or record kinds. The redo log core owns every byte of
//! format interpretation and only asks a backend to read, append, make
//! durable and cut back.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file per segment
//! - [`InMemoryBackend`] - ephemeral storage for tests and tooling
//!
//! ## Example
//!
//! ```rust
//! use redolog_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
