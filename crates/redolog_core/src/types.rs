//! Core type definitions for the redo log.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of the mailbox a record mutates.
///
/// Mailbox ids are positive. `0` is reserved for log-internal markers that
/// belong to no mailbox (see [`MailboxId::SYSTEM`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MailboxId(pub i32);

impl MailboxId {
    /// Owner of log-internal records such as segment seals.
    pub const SYSTEM: Self = Self(0);

    /// Creates a new mailbox ID.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns true for ids that can name a real mailbox.
    #[must_use]
    pub const fn is_mailbox(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mbox:{}", self.0)
    }
}

/// Identifier of an item (message, folder, tag, ...) inside one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub i32);

impl ItemId {
    /// Creates a new item ID.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a logged mutation.
///
/// Ordered by timestamp first, then counter. Ids handed out by one
/// [`TxnIdGenerator`] are strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TransactionId {
    /// Wall-clock milliseconds when the id was assigned.
    pub timestamp_ms: i64,
    /// Tie breaker among ids sharing a timestamp.
    pub counter: u32,
}

impl TransactionId {
    /// Creates a transaction ID.
    #[must_use]
    pub const fn new(timestamp_ms: i64, counter: u32) -> Self {
        Self {
            timestamp_ms,
            counter,
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}.{}", self.timestamp_ms, self.counter)
    }
}

/// Assigns monotonically increasing [`TransactionId`]s.
///
/// When the clock stands still or steps backwards the previous timestamp is
/// reused and the counter advances, so ids never repeat within a process.
#[derive(Debug, Default)]
pub struct TxnIdGenerator {
    last: Mutex<Option<TransactionId>>,
}

impl TxnIdGenerator {
    /// Creates a generator with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator whose next id is greater than `last`.
    ///
    /// Used after reopening a log so ids keep increasing across restarts.
    #[must_use]
    pub fn resume_after(last: Option<TransactionId>) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Returns the next id using the system clock.
    pub fn next_id(&self) -> TransactionId {
        self.next_at(now_millis())
    }

    /// Returns the next id as if the clock read `now_ms`.
    pub fn next_at(&self, now_ms: i64) -> TransactionId {
        let mut last = self.last.lock();
        let next = match *last {
            Some(prev) if now_ms <= prev.timestamp_ms => match prev.counter.checked_add(1) {
                Some(counter) => TransactionId::new(prev.timestamp_ms, counter),
                None => TransactionId::new(prev.timestamp_ms + 1, 0),
            },
            _ => TransactionId::new(now_ms, 0),
        };
        *last = Some(next);
        next
    }
}

/// Record format version as `(major, minor)`.
///
/// Packed on the wire as `major << 8 | minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FormatVersion {
    /// Major version. Readers refuse frames with a newer major.
    pub major: u8,
    /// Minor version. Each minor may add version-gated fields.
    pub minor: u8,
}

impl FormatVersion {
    /// The first released layout.
    pub const V1_0: Self = Self::new(1, 0);
    /// Adds tag constraints, mountpoint colors and the color record.
    pub const V1_1: Self = Self::new(1, 1);
    /// Adds tag ids and destination uuids on IMAP copies.
    pub const V1_2: Self = Self::new(1, 2);
    /// Adds mountpoint remote uuids and reminder flags.
    pub const V1_3: Self = Self::new(1, 3);
    /// Adds the folder creation record.
    pub const V1_4: Self = Self::new(1, 4);

    /// The version this build writes by default and the newest it can read.
    pub const CURRENT: Self = Self::V1_4;

    /// Every version this build can read, oldest first.
    pub const SUPPORTED: [Self; 5] = [Self::V1_0, Self::V1_1, Self::V1_2, Self::V1_3, Self::V1_4];

    /// Creates a format version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Returns true if this version is at least `major.minor`.
    #[must_use]
    pub const fn at_least(self, other: Self) -> bool {
        self.major > other.major || (self.major == other.major && self.minor >= other.minor)
    }

    /// Packs the version into its wire form.
    #[must_use]
    pub const fn to_wire(self) -> u16 {
        ((self.major as u16) << 8) | self.minor as u16
    }

    /// Unpacks a version from its wire form.
    #[must_use]
    pub const fn from_wire(raw: u16) -> Self {
        Self::new((raw >> 8) as u8, (raw & 0xFF) as u8)
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Identifier of a log segment. Segments are numbered from 1 in creation
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// The first segment of a new log.
    pub const FIRST: Self = Self(1);

    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the id of the segment created after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{:06}", self.0)
    }
}

/// Kind of mailbox item a record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ItemType {
    /// Type not recorded.
    Unknown = 0,
    /// Regular folder.
    Folder = 1,
    /// Saved search.
    SearchFolder = 2,
    /// Tag.
    Tag = 3,
    /// Conversation.
    Conversation = 4,
    /// Mail message.
    Message = 5,
    /// Contact.
    Contact = 6,
    /// Calendar appointment.
    Appointment = 11,
    /// Folder link into another mailbox.
    Mountpoint = 13,
    /// Task.
    Task = 15,
    /// Document.
    Document = 18,
}

impl ItemType {
    /// Converts a byte to an item type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Unknown),
            1 => Some(Self::Folder),
            2 => Some(Self::SearchFolder),
            3 => Some(Self::Tag),
            4 => Some(Self::Conversation),
            5 => Some(Self::Message),
            6 => Some(Self::Contact),
            11 => Some(Self::Appointment),
            13 => Some(Self::Mountpoint),
            15 => Some(Self::Task),
            18 => Some(Self::Document),
            _ => None,
        }
    }

    /// Converts the item type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Lower-case name used in record descriptions.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Folder => "folder",
            Self::SearchFolder => "search",
            Self::Tag => "tag",
            Self::Conversation => "conversation",
            Self::Message => "message",
            Self::Contact => "contact",
            Self::Appointment => "appointment",
            Self::Mountpoint => "mountpoint",
            Self::Task => "task",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
