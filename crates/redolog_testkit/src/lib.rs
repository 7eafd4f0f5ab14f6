//! # Redolog Testkit
//!
//! Test utilities for the redo log.
//!
//! This crate provides:
//! - In-memory mailboxes and a resolver for replay tests
//! - Crash simulation wrapped around any segment store
//! - Property-based record generators using proptest
//! - Hand-written wire-format vectors
//! - Fuzz targets for the decoder and scanner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redolog_testkit::prelude::*;
//!
//! let mailboxes = MemoryMailboxes::new()
//!     .with(MemoryMailbox::new(MailboxId::new(7)).with_message(101));
//! let report = replay(scanner, &mailboxes);
//! assert!(report.is_clean());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use crash::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use vectors::*;
