//! Operation records.
//!
//! An [`OpRecord`] is the durable description of one mailbox mutation: a
//! fixed [`RecordHeader`] followed by a kind-specific [`OpPayload`].
//!
//! ## Frame Format
//!
//! ```text
//! +-----------+----------------+-------------------+-------------------+
//! | kind (1)  | mailbox id (4) | format version (2)| txn timestamp (8) |
//! +-----------+----------------+-------------------+-------------------+
//! | txn counter (4) | payload fields (kind-specific, version-gated)    |
//! +-----------------+--------------------------------------------------+
//! ```
//!
//! All integers are big-endian. The format version is `major << 8 | minor`.
//!
//! ## Kinds
//!
//! The set of kinds is closed. Each payload type implements [`OpBody`] and
//! dispatch from a decoded kind byte goes through an exhaustive match, so a
//! kind byte this build does not know is always a decode error.

mod calendar;
mod folder;
mod imap;
mod item;
mod marker;
pub(crate) mod redact;

pub use calendar::DismissCalendarAlarm;
pub use folder::{CreateFolder, CreateMountpoint, EnableSharedReminder};
pub use imap::{CopyTarget, ImapCopyItem};
pub use item::{AlterItemTag, SetItemColor};
pub use marker::{BackupMarker, SealSegment};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreError, CoreResult, DecodeError, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::{FormatVersion, MailboxId, TransactionId};
use serde::Serialize;
use std::fmt;

/// Bytes in the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 1 + 4 + 2 + 8 + 4;

/// Record kind discriminant, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum RecordKind {
    /// Set or clear a tag on items.
    AlterItemTag = 1,
    /// Create a mountpoint to a remote folder.
    CreateMountpoint = 2,
    /// Dismiss a calendar alarm.
    DismissCalendarAlarm = 3,
    /// Toggle reminders on a shared calendar mountpoint.
    EnableSharedReminder = 4,
    /// Copy IMAP-synced items into a folder.
    ImapCopyItem = 5,
    /// Backup boundary marker.
    BackupMarker = 6,
    /// Closes a segment. Written only by the log itself.
    SealSegment = 7,
    /// Set the color of items.
    SetItemColor = 8,
    /// Create a folder.
    CreateFolder = 9,
}

impl RecordKind {
    /// Every kind, in discriminant order.
    pub const ALL: [Self; 9] = [
        Self::AlterItemTag,
        Self::CreateMountpoint,
        Self::DismissCalendarAlarm,
        Self::EnableSharedReminder,
        Self::ImapCopyItem,
        Self::BackupMarker,
        Self::SealSegment,
        Self::SetItemColor,
        Self::CreateFolder,
    ];

    /// Parses a kind byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_byte() == b)
    }

    /// The kind byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// First format version that contains this kind.
    #[must_use]
    pub const fn introduced_in(self) -> FormatVersion {
        match self {
            Self::SetItemColor => FormatVersion::V1_1,
            Self::CreateFolder => FormatVersion::V1_4,
            _ => FormatVersion::V1_0,
        }
    }

    /// Returns true for records that describe no mailbox mutation.
    #[must_use]
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::BackupMarker | Self::SealSegment)
    }

    /// Returns true for records only the log itself may write.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::SealSegment)
    }

    /// Returns true if a record of this kind may carry `mailbox_id`.
    ///
    /// Internal records carry [`MailboxId::SYSTEM`]; backup markers may be
    /// log-wide or per mailbox; everything else needs a real mailbox.
    #[must_use]
    pub const fn accepts_mailbox(self, mailbox_id: MailboxId) -> bool {
        match self {
            Self::SealSegment => mailbox_id.as_i32() == MailboxId::SYSTEM.as_i32(),
            Self::BackupMarker => mailbox_id.as_i32() >= 0,
            _ => mailbox_id.is_mailbox(),
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AlterItemTag => "AlterItemTag",
            Self::CreateMountpoint => "CreateMountpoint",
            Self::DismissCalendarAlarm => "DismissCalendarAlarm",
            Self::EnableSharedReminder => "EnableSharedReminder",
            Self::ImapCopyItem => "ImapCopyItem",
            Self::BackupMarker => "BackupMarker",
            Self::SealSegment => "SealSegment",
            Self::SetItemColor => "SetItemColor",
            Self::CreateFolder => "CreateFolder",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What applying a payload did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The mutation was performed.
    Applied,
    /// The target already reflected the whole mutation; nothing was called.
    NoOp,
}

/// Behavior shared by every payload type.
pub trait OpBody: Sized {
    /// Kind byte this payload is framed with.
    const KIND: RecordKind;

    /// Writes the payload fields at the writer's version.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented on the wire.
    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()>;

    /// Reads the payload fields at the reader's version, substituting
    /// defaults for fields the version predates.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is short or a field is invalid.
    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self>;

    /// Performs the mutation against a held mailbox.
    ///
    /// # Errors
    ///
    /// Returns the target's failure unchanged; classification happens in
    /// the replay policy.
    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome>;

    /// Human-readable, redacted summary.
    fn describe(&self) -> String;
}

/// Kind-specific part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpPayload {
    /// See [`AlterItemTag`].
    AlterItemTag(AlterItemTag),
    /// See [`CreateMountpoint`].
    CreateMountpoint(CreateMountpoint),
    /// See [`DismissCalendarAlarm`].
    DismissCalendarAlarm(DismissCalendarAlarm),
    /// See [`EnableSharedReminder`].
    EnableSharedReminder(EnableSharedReminder),
    /// See [`ImapCopyItem`].
    ImapCopyItem(ImapCopyItem),
    /// See [`BackupMarker`].
    BackupMarker(BackupMarker),
    /// See [`SealSegment`].
    SealSegment(SealSegment),
    /// See [`SetItemColor`].
    SetItemColor(SetItemColor),
    /// See [`CreateFolder`].
    CreateFolder(CreateFolder),
}

/// Expands `$body` once per payload variant with `$op` bound to the inner
/// value.
macro_rules! each_payload {
    ($payload:expr, $op:ident => $body:expr) => {
        match $payload {
            OpPayload::AlterItemTag($op) => $body,
            OpPayload::CreateMountpoint($op) => $body,
            OpPayload::DismissCalendarAlarm($op) => $body,
            OpPayload::EnableSharedReminder($op) => $body,
            OpPayload::ImapCopyItem($op) => $body,
            OpPayload::BackupMarker($op) => $body,
            OpPayload::SealSegment($op) => $body,
            OpPayload::SetItemColor($op) => $body,
            OpPayload::CreateFolder($op) => $body,
        }
    };
}

macro_rules! payload_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for OpPayload {
                fn from(op: $variant) -> Self {
                    Self::$variant(op)
                }
            }
        )*
    };
}

payload_from!(
    AlterItemTag,
    CreateMountpoint,
    DismissCalendarAlarm,
    EnableSharedReminder,
    ImapCopyItem,
    BackupMarker,
    SealSegment,
    SetItemColor,
    CreateFolder,
);

/// Generic helper so `each_payload!` can name the body type's constant.
fn kind_of<T: OpBody>(_: &T) -> RecordKind {
    T::KIND
}

impl OpPayload {
    /// The payload's kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        each_payload!(self, op => kind_of(op))
    }

    /// Writes the payload fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented on the wire.
    pub fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        each_payload!(self, op => op.encode(w))
    }

    /// Reads the payload of a frame whose header declared `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is short or a field is invalid.
    pub fn decode(kind: RecordKind, r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(match kind {
            RecordKind::AlterItemTag => AlterItemTag::decode(r)?.into(),
            RecordKind::CreateMountpoint => CreateMountpoint::decode(r)?.into(),
            RecordKind::DismissCalendarAlarm => DismissCalendarAlarm::decode(r)?.into(),
            RecordKind::EnableSharedReminder => EnableSharedReminder::decode(r)?.into(),
            RecordKind::ImapCopyItem => ImapCopyItem::decode(r)?.into(),
            RecordKind::BackupMarker => BackupMarker::decode(r)?.into(),
            RecordKind::SealSegment => SealSegment::decode(r)?.into(),
            RecordKind::SetItemColor => SetItemColor::decode(r)?.into(),
            RecordKind::CreateFolder => CreateFolder::decode(r)?.into(),
        })
    }

    /// Performs the mutation against a held mailbox.
    ///
    /// # Errors
    ///
    /// Returns the target's failure unchanged.
    pub fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        each_payload!(self, op => op.apply(target))
    }

    /// Human-readable, redacted summary.
    #[must_use]
    pub fn describe(&self) -> String {
        each_payload!(self, op => op.describe())
    }
}

/// Fields every frame starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    /// Mailbox the record mutates, or [`MailboxId::SYSTEM`] for log markers.
    pub mailbox_id: MailboxId,
    /// Position of the record in its mailbox's history.
    pub transaction_id: TransactionId,
    /// Layout the payload was written with.
    pub format_version: FormatVersion,
}

/// One logged mailbox mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    /// Common fields.
    pub header: RecordHeader,
    /// Kind-specific fields.
    pub payload: OpPayload,
}

impl OpRecord {
    /// Creates a record at [`FormatVersion::CURRENT`].
    pub fn new(
        mailbox_id: MailboxId,
        transaction_id: TransactionId,
        payload: impl Into<OpPayload>,
    ) -> Self {
        Self {
            header: RecordHeader {
                mailbox_id,
                transaction_id,
                format_version: FormatVersion::CURRENT,
            },
            payload: payload.into(),
        }
    }

    /// Sets the version the record will be encoded at.
    #[must_use]
    pub fn with_format_version(mut self, version: FormatVersion) -> Self {
        self.header.format_version = version;
        self
    }

    /// The record's kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Mailbox the record mutates.
    #[must_use]
    pub fn mailbox_id(&self) -> MailboxId {
        self.header.mailbox_id
    }

    /// Transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.header.transaction_id
    }

    /// Format version.
    #[must_use]
    pub fn format_version(&self) -> FormatVersion {
        self.header.format_version
    }

    /// Checks the header against the payload without encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRecord`] if the version is not supported,
    /// the kind did not exist yet at the version, or the mailbox id is not
    /// allowed for the kind.
    pub fn validate(&self) -> CoreResult<()> {
        let kind = self.kind();
        let version = self.format_version();
        if !FormatVersion::SUPPORTED.contains(&version) {
            return Err(CoreError::invalid_record(format!(
                "format version {version} is not supported"
            )));
        }
        if !version.at_least(kind.introduced_in()) {
            return Err(CoreError::invalid_record(format!(
                "{kind} requires format {} but record is {version}",
                kind.introduced_in()
            )));
        }
        if !kind.accepts_mailbox(self.mailbox_id()) {
            return Err(CoreError::invalid_record(format!(
                "{kind} cannot target {}",
                self.mailbox_id()
            )));
        }
        Ok(())
    }

    /// Encodes the record as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if [`validate`](Self::validate) fails or a field
    /// cannot be represented on the wire.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        self.validate()?;
        let mut w = FrameWriter::new(self.format_version());
        w.put_u8(self.kind().as_byte());
        w.put_i32(self.header.mailbox_id.as_i32());
        w.put_u16(self.header.format_version.to_wire());
        w.put_i64(self.header.transaction_id.timestamp_ms);
        w.put_u32(self.header.transaction_id.counter);
        self.payload.encode(&mut w)?;
        Ok(w.into_vec())
    }

    /// Decodes one frame from the front of `input`, returning the record and
    /// the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedEof`] if `input` ends inside the
    /// frame, and another [`DecodeError`] if the frame is invalid.
    pub fn decode(input: &[u8]) -> DecodeResult<(Self, usize)> {
        let mut r = FrameReader::new(input, FormatVersion::CURRENT);
        let raw_kind = r.get_u8()?;
        let kind = RecordKind::from_byte(raw_kind).ok_or(DecodeError::UnknownKind(raw_kind))?;
        let mailbox_id = MailboxId::new(r.get_i32()?);
        let format_version = FormatVersion::from_wire(r.get_u16()?);
        if format_version.major != FormatVersion::CURRENT.major
            || !FormatVersion::CURRENT.at_least(format_version)
        {
            return Err(DecodeError::UnsupportedVersion {
                found: format_version,
                supported: FormatVersion::CURRENT,
            });
        }
        if !format_version.at_least(kind.introduced_in()) {
            return Err(DecodeError::KindNotInVersion {
                kind,
                introduced: kind.introduced_in(),
                found: format_version,
            });
        }
        if !kind.accepts_mailbox(mailbox_id) {
            return Err(DecodeError::MailboxMismatch { kind, mailbox_id });
        }
        let transaction_id = TransactionId::new(r.get_i64()?, r.get_u32()?);
        r.set_version(format_version);
        let payload = OpPayload::decode(kind, &mut r)?;
        let record = Self {
            header: RecordHeader {
                mailbox_id,
                transaction_id,
                format_version,
            },
            payload,
        };
        Ok((record, r.position()))
    }

    /// One-line, redacted summary.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} {} {} v{}: {}",
            self.transaction_id(),
            self.mailbox_id(),
            self.kind(),
            self.format_version(),
            self.payload.describe()
        )
    }
}

impl fmt::Display for OpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, ItemType, SegmentId};

    fn tag_record() -> OpRecord {
        OpRecord::new(
            MailboxId::new(7),
            TransactionId::new(1_700_000_000_000, 3),
            AlterItemTag::new(vec![ItemId::new(101)], ItemType::Message, "urgent", true),
        )
    }

    #[test]
    fn kind_bytes_roundtrip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordKind::from_byte(0), None);
        assert_eq!(RecordKind::from_byte(0xFF), None);
    }

    #[test]
    fn header_layout() {
        let bytes = tag_record().encode().unwrap();
        assert_eq!(bytes[0], RecordKind::AlterItemTag.as_byte());
        assert_eq!(&bytes[1..5], &7i32.to_be_bytes());
        assert_eq!(&bytes[5..7], &[1, 4]);
        assert_eq!(&bytes[7..15], &1_700_000_000_000i64.to_be_bytes());
        assert_eq!(&bytes[15..19], &3u32.to_be_bytes());
        assert!(bytes.len() > FRAME_HEADER_LEN);
    }

    #[test]
    fn decode_reports_consumed_length() {
        let mut bytes = tag_record().encode().unwrap();
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let (decoded, used) = OpRecord::decode(&bytes).unwrap();
        assert_eq!(used, len);
        assert_eq!(decoded, tag_record());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = tag_record().encode().unwrap();
        bytes[0] = 0xFF;
        assert_eq!(
            OpRecord::decode(&bytes).unwrap_err(),
            DecodeError::UnknownKind(0xFF)
        );
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = tag_record().encode().unwrap();
        bytes[6] = 9;
        assert!(matches!(
            OpRecord::decode(&bytes).unwrap_err(),
            DecodeError::UnsupportedVersion { .. }
        ));
        bytes[5] = 2;
        bytes[6] = 0;
        assert!(matches!(
            OpRecord::decode(&bytes).unwrap_err(),
            DecodeError::UnsupportedVersion { .. }
        ));
    }

    #[test]
    fn kind_older_than_its_version_is_rejected() {
        let record = OpRecord::new(
            MailboxId::new(7),
            TransactionId::new(1, 0),
            SetItemColor::new(vec![ItemId::new(5)], ItemType::Folder, 3),
        );
        let err = record
            .clone()
            .with_format_version(FormatVersion::V1_0)
            .encode()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));

        let mut bytes = record.with_format_version(FormatVersion::V1_1).encode().unwrap();
        bytes[6] = 0;
        assert!(matches!(
            OpRecord::decode(&bytes).unwrap_err(),
            DecodeError::KindNotInVersion { .. }
        ));
    }

    #[test]
    fn mailbox_rules_per_kind() {
        let seal = OpRecord::new(
            MailboxId::new(3),
            TransactionId::new(1, 0),
            SealSegment::new(SegmentId::new(1)),
        );
        assert!(seal.encode().is_err());

        let mut tag = tag_record();
        tag.header.mailbox_id = MailboxId::SYSTEM;
        assert!(tag.encode().is_err());

        let backup = OpRecord::new(
            MailboxId::SYSTEM,
            TransactionId::new(1, 0),
            BackupMarker::new("nightly", 10),
        );
        assert!(backup.encode().is_ok());
    }

    #[test]
    fn truncated_frames_report_eof() {
        let bytes = tag_record().encode().unwrap();
        for cut in 0..bytes.len() {
            let err = OpRecord::decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_eof(), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn describe_names_kind_and_mailbox() {
        let text = tag_record().describe();
        assert!(text.contains("AlterItemTag"));
        assert!(text.contains("mbox:7"));
        assert!(text.contains("\"urgent\""));
    }
}
