//! Interfaces to the mailbox engine that replayed records mutate.
//!
//! The mailbox store itself lives outside this crate. Replay reaches it
//! through two narrow traits:
//!
//! - [`MailboxResolver`] turns a mailbox id into an exclusively held
//!   [`MailboxTarget`]
//! - [`MailboxTarget`] exposes one `apply_*` method per record kind
//!
//! A target reports "this mutation is already reflected" through the
//! [`TargetError::AlreadyExists`] and [`TargetError::AlreadyInState`]
//! signals. Whether such a signal is absorbed is decided by
//! [`crate::IdempotencyPolicy`], not by the target.

use crate::record::{
    AlterItemTag, CreateFolder, CreateMountpoint, DismissCalendarAlarm, EnableSharedReminder,
    ImapCopyItem, SetItemColor,
};
use crate::types::{ItemId, MailboxId};
use parking_lot::MutexGuard;
use serde::Serialize;
use thiserror::Error;

/// Result type for mailbox mutations.
pub type TargetResult<T> = Result<T, TargetError>;

/// Failure reported by a [`MailboxTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// The object the record creates already exists with the same identity.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// What already exists.
        what: String,
    },

    /// The mutation would leave state unchanged (tag already set, alarm
    /// already dismissed, ...).
    #[error("already in requested state: {what}")]
    AlreadyInState {
        /// What is already in the requested state.
        what: String,
    },

    /// A referenced item does not exist.
    #[error("no such item: {0}")]
    NoSuchItem(ItemId),

    /// A referenced folder does not exist.
    #[error("no such folder: {0}")]
    NoSuchFolder(ItemId),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl TargetError {
    /// Creates an already-exists signal.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates an already-in-state signal.
    pub fn already_in_state(what: impl Into<String>) -> Self {
        Self::AlreadyInState { what: what.into() }
    }

    /// Creates an unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The class the idempotency policy matches on.
    #[must_use]
    pub fn class(&self) -> TargetErrorClass {
        match self {
            Self::AlreadyExists { .. } => TargetErrorClass::AlreadyExists,
            Self::AlreadyInState { .. } => TargetErrorClass::AlreadyInState,
            Self::NoSuchItem(_) => TargetErrorClass::NoSuchItem,
            Self::NoSuchFolder(_) => TargetErrorClass::NoSuchFolder,
            Self::Other(_) => TargetErrorClass::Other,
        }
    }
}

/// Payload-free classification of a [`TargetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetErrorClass {
    /// See [`TargetError::AlreadyExists`].
    AlreadyExists,
    /// See [`TargetError::AlreadyInState`].
    AlreadyInState,
    /// See [`TargetError::NoSuchItem`].
    NoSuchItem,
    /// See [`TargetError::NoSuchFolder`].
    NoSuchFolder,
    /// See [`TargetError::Other`].
    Other,
}

/// A mailbox held exclusively for the duration of a replay.
///
/// One method family per record kind. Implementations must not partially
/// apply a mutation and then fail; on error, state is left as it was.
pub trait MailboxTarget {
    /// Id of the held mailbox.
    fn mailbox_id(&self) -> MailboxId;

    /// Returns true if an item with `id` exists in this mailbox.
    fn item_exists(&self, id: ItemId) -> bool;

    /// Sets or clears a tag on items.
    fn apply_tag_alteration(&mut self, op: &AlterItemTag) -> TargetResult<()>;

    /// Creates a mountpoint with the recorded id.
    fn apply_create_mountpoint(&mut self, op: &CreateMountpoint) -> TargetResult<()>;

    /// Records an alarm dismissal.
    fn apply_dismiss_alarm(&mut self, op: &DismissCalendarAlarm) -> TargetResult<()>;

    /// Enables or disables reminders on a mountpoint.
    fn apply_enable_shared_reminder(&mut self, op: &EnableSharedReminder) -> TargetResult<()>;

    /// Creates the recorded copies in the destination folder.
    fn apply_imap_copy(&mut self, op: &ImapCopyItem) -> TargetResult<()>;

    /// Sets the color of items.
    fn apply_set_color(&mut self, op: &SetItemColor) -> TargetResult<()>;

    /// Creates a folder with the recorded id.
    fn apply_create_folder(&mut self, op: &CreateFolder) -> TargetResult<()>;
}

/// A locked mailbox is a held mailbox: the guard is the exclusive hold.
impl<T: MailboxTarget + ?Sized> MailboxTarget for MutexGuard<'_, T> {
    fn mailbox_id(&self) -> MailboxId {
        (**self).mailbox_id()
    }

    fn item_exists(&self, id: ItemId) -> bool {
        (**self).item_exists(id)
    }

    fn apply_tag_alteration(&mut self, op: &AlterItemTag) -> TargetResult<()> {
        (**self).apply_tag_alteration(op)
    }

    fn apply_create_mountpoint(&mut self, op: &CreateMountpoint) -> TargetResult<()> {
        (**self).apply_create_mountpoint(op)
    }

    fn apply_dismiss_alarm(&mut self, op: &DismissCalendarAlarm) -> TargetResult<()> {
        (**self).apply_dismiss_alarm(op)
    }

    fn apply_enable_shared_reminder(&mut self, op: &EnableSharedReminder) -> TargetResult<()> {
        (**self).apply_enable_shared_reminder(op)
    }

    fn apply_imap_copy(&mut self, op: &ImapCopyItem) -> TargetResult<()> {
        (**self).apply_imap_copy(op)
    }

    fn apply_set_color(&mut self, op: &SetItemColor) -> TargetResult<()> {
        (**self).apply_set_color(op)
    }

    fn apply_create_folder(&mut self, op: &CreateFolder) -> TargetResult<()> {
        (**self).apply_create_folder(op)
    }
}

/// Why a mailbox id could not be turned into a [`MailboxTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The mailbox no longer exists. Records for it are skipped.
    #[error("mailbox {0} not found")]
    NotFound(MailboxId),

    /// The mailbox exists but could not be held. Replay of that mailbox is
    /// aborted so later records never run ahead of an unapplied one.
    #[error("mailbox {mailbox_id} unavailable: {message}")]
    Unavailable {
        /// Mailbox that could not be held.
        mailbox_id: MailboxId,
        /// Description of the failure.
        message: String,
    },
}

/// Looks up live mailboxes for replay.
///
/// The returned handle is the exclusive hold on the mailbox: no live client
/// operation may touch the mailbox while it exists. Replay keeps it from the
/// mailbox's first record until the pass completes or the mailbox aborts.
pub trait MailboxResolver {
    /// The held mailbox.
    type Handle<'a>: MailboxTarget
    where
        Self: 'a;

    /// Resolves and exclusively holds `mailbox_id`.
    fn resolve(&self, mailbox_id: MailboxId) -> Result<Self::Handle<'_>, ResolveError>;
}
