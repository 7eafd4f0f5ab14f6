//! Property-based test generators using proptest.
//!
//! Strategies produce records that are valid at a chosen format version:
//! kinds the version predates are never generated, and fields the version
//! predates hold the defaults a reader substitutes for them. That makes
//! "encode at V, decode, compare" an exact equality for every version.

use proptest::prelude::*;
use redolog_core::{
    AlterItemTag, BackupMarker, CopyTarget, CreateFolder, CreateMountpoint, DismissCalendarAlarm,
    EnableSharedReminder, FormatVersion, ImapCopyItem, ItemId, ItemType, MailboxId, OpPayload,
    OpRecord, RecordKind, SetItemColor, TransactionId,
};

/// Strategy for item ids in the range real mailboxes hand out.
pub fn item_id_strategy() -> impl Strategy<Value = ItemId> {
    (1..1_000_000i32).prop_map(ItemId::new)
}

/// Strategy for mailbox ids.
pub fn mailbox_id_strategy() -> impl Strategy<Value = MailboxId> {
    (1..100_000i32).prop_map(MailboxId::new)
}

/// Strategy for transaction ids.
pub fn transaction_id_strategy() -> impl Strategy<Value = TransactionId> {
    (0..i64::MAX / 2, any::<u32>()).prop_map(|(ts, counter)| TransactionId::new(ts, counter))
}

/// Strategy for item types.
pub fn item_type_strategy() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Unknown),
        Just(ItemType::Folder),
        Just(ItemType::SearchFolder),
        Just(ItemType::Tag),
        Just(ItemType::Conversation),
        Just(ItemType::Message),
        Just(ItemType::Contact),
        Just(ItemType::Appointment),
        Just(ItemType::Mountpoint),
        Just(ItemType::Task),
        Just(ItemType::Document),
    ]
}

/// Strategy for folder and tag names, including non-ASCII text.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::string::string_regex("[A-Za-z][A-Za-z0-9 _-]{0,23}").expect("Invalid regex"),
        1 => prop::string::string_regex("[à-ÿ一-龥]{1,8}").expect("Invalid regex"),
        1 => Just(String::new()),
    ]
}

fn uuid_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(
        prop::string::string_regex("[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("Invalid regex"),
    )
}

fn ids_strategy() -> impl Strategy<Value = Vec<ItemId>> {
    prop::collection::vec(item_id_strategy(), 0..16)
}

/// Strategy for any supported format version.
pub fn version_strategy() -> impl Strategy<Value = FormatVersion> {
    prop::sample::select(FormatVersion::SUPPORTED.to_vec())
}

/// Returns `value` if `version` has the field introduced at `since`, else
/// `default`.
fn gated<T>(version: FormatVersion, since: FormatVersion, value: T, default: T) -> T {
    if version.at_least(since) {
        value
    } else {
        default
    }
}

fn alter_item_tag(version: FormatVersion) -> impl Strategy<Value = OpPayload> {
    (
        ids_strategy(),
        item_type_strategy(),
        name_strategy(),
        any::<bool>(),
        prop::option::of(name_strategy()),
        prop::option::of(any::<i32>()),
    )
        .prop_map(move |(ids, item_type, tag_name, tagged, constraint, tag_id)| {
            AlterItemTag {
                ids,
                item_type,
                tag_name,
                tagged,
                constraint: gated(version, FormatVersion::V1_1, constraint, None),
                tag_id: gated(version, FormatVersion::V1_2, tag_id, None),
            }
            .into()
        })
}

fn create_mountpoint(version: FormatVersion) -> impl Strategy<Value = OpPayload> {
    (
        (item_id_strategy(), item_id_strategy(), name_strategy()),
        (name_strategy(), item_id_strategy(), item_type_strategy(), any::<i32>()),
        (any::<u32>(), uuid_strategy(), any::<bool>()),
    )
        .prop_map(
            move |(
                (mountpoint_id, parent_id, name),
                (owner_id, remote_id, view, flags),
                (color, remote_uuid, reminder_enabled),
            )| {
                CreateMountpoint {
                    mountpoint_id,
                    parent_id,
                    name,
                    owner_id,
                    remote_id,
                    view,
                    flags,
                    color: gated(version, FormatVersion::V1_1, color, 0),
                    remote_uuid: gated(version, FormatVersion::V1_3, remote_uuid, None),
                    reminder_enabled: gated(version, FormatVersion::V1_3, reminder_enabled, false),
                }
                .into()
            },
        )
}

fn dismiss_alarm() -> impl Strategy<Value = OpPayload> {
    (item_id_strategy(), any::<i64>()).prop_map(|(item_id, dismissed_at_ms)| {
        DismissCalendarAlarm {
            item_id,
            dismissed_at_ms,
        }
        .into()
    })
}

fn enable_shared_reminder() -> impl Strategy<Value = OpPayload> {
    (item_id_strategy(), any::<bool>()).prop_map(|(mountpoint_id, enabled)| {
        EnableSharedReminder {
            mountpoint_id,
            enabled,
        }
        .into()
    })
}

fn imap_copy(version: FormatVersion) -> impl Strategy<Value = OpPayload> {
    (
        item_type_strategy(),
        item_id_strategy(),
        prop::collection::btree_map(item_id_strategy(), (item_id_strategy(), uuid_strategy()), 0..12),
    )
        .prop_map(move |(item_type, dest_folder_id, pairs)| {
            let copies = pairs
                .into_iter()
                .map(|(src, (dest_id, dest_uuid))| {
                    let dest_uuid = gated(version, FormatVersion::V1_2, dest_uuid, None);
                    (src, CopyTarget { dest_id, dest_uuid })
                })
                .collect();
            ImapCopyItem {
                item_type,
                dest_folder_id,
                copies,
            }
            .into()
        })
}

fn backup_marker() -> impl Strategy<Value = OpPayload> {
    (name_strategy(), any::<i64>())
        .prop_map(|(label, marked_at_ms)| BackupMarker::new(label, marked_at_ms).into())
}

fn set_item_color() -> impl Strategy<Value = OpPayload> {
    (ids_strategy(), item_type_strategy(), any::<u32>())
        .prop_map(|(ids, item_type, color)| SetItemColor::new(ids, item_type, color).into())
}

fn create_folder() -> impl Strategy<Value = OpPayload> {
    (
        (item_id_strategy(), item_id_strategy(), name_strategy()),
        (item_type_strategy(), any::<i32>(), any::<u32>(), uuid_strategy()),
    )
        .prop_map(|((folder_id, parent_id, name), (view, flags, color, uuid))| {
            CreateFolder {
                folder_id,
                parent_id,
                name,
                view,
                flags,
                color,
                uuid,
            }
            .into()
        })
}

/// Strategy for payloads of `kind` valid at `version`.
///
/// # Panics
///
/// Panics for [`RecordKind::SealSegment`], which only the writer produces.
pub fn payload_of_kind(kind: RecordKind, version: FormatVersion) -> BoxedStrategy<OpPayload> {
    match kind {
        RecordKind::AlterItemTag => alter_item_tag(version).boxed(),
        RecordKind::CreateMountpoint => create_mountpoint(version).boxed(),
        RecordKind::DismissCalendarAlarm => dismiss_alarm().boxed(),
        RecordKind::EnableSharedReminder => enable_shared_reminder().boxed(),
        RecordKind::ImapCopyItem => imap_copy(version).boxed(),
        RecordKind::BackupMarker => backup_marker().boxed(),
        RecordKind::SetItemColor => set_item_color().boxed(),
        RecordKind::CreateFolder => create_folder().boxed(),
        RecordKind::SealSegment => panic!("seal records are written by the log itself"),
    }
}

/// Kinds a caller may append at `version`.
pub fn appendable_kinds(version: FormatVersion) -> Vec<RecordKind> {
    RecordKind::ALL
        .into_iter()
        .filter(|kind| !kind.is_internal() && version.at_least(kind.introduced_in()))
        .collect()
}

/// Strategy for any appendable payload valid at `version`.
pub fn payload_strategy(version: FormatVersion) -> BoxedStrategy<OpPayload> {
    prop::sample::select(appendable_kinds(version))
        .prop_flat_map(move |kind| payload_of_kind(kind, version))
        .boxed()
}

/// Strategy for appendable records framed at `version`.
pub fn record_strategy(version: FormatVersion) -> BoxedStrategy<OpRecord> {
    (
        mailbox_id_strategy(),
        transaction_id_strategy(),
        payload_strategy(version),
    )
        .prop_map(move |(mailbox, txn, payload)| {
            OpRecord::new(mailbox, txn, payload).with_format_version(version)
        })
        .boxed()
}

/// Strategy for records at any supported version.
pub fn any_record_strategy() -> BoxedStrategy<OpRecord> {
    version_strategy()
        .prop_flat_map(record_strategy)
        .boxed()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
