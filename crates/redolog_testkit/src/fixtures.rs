//! In-memory mailboxes and temporary logs.
//!
//! [`MemoryMailbox`] is a small but honest [`MailboxTarget`]: it raises the
//! same "already exists" and "already in state" signals a real mailbox store
//! does, so replay tests exercise the idempotency policy end to end.
//! [`MemoryMailboxes`] resolves ids to locked mailboxes the way a server
//! would hand out an exclusive mailbox lock.

use parking_lot::{Mutex, MutexGuard};
use redolog_core::{
    AlterItemTag, CoreResult, CreateFolder, CreateMountpoint, DismissCalendarAlarm,
    EnableSharedReminder, ImapCopyItem, ItemId, ItemType, LogConfig, LogDir, LogWriter,
    MailboxId, MailboxResolver, MailboxTarget, ResolveError, SetItemColor, TargetError,
    TargetResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::TempDir;

/// Root of every mailbox's folder tree.
pub const ROOT_FOLDER: ItemId = ItemId::new(1);
/// The inbox, created with every mailbox.
pub const INBOX: ItemId = ItemId::new(2);

/// A message, appointment or other non-folder item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Item type.
    pub item_type: ItemType,
    /// Containing folder.
    pub folder_id: ItemId,
    /// Tag names set on the item.
    pub tags: BTreeSet<String>,
    /// Color.
    pub color: u32,
    /// When its alarm was last dismissed.
    pub alarm_dismissed_at: Option<i64>,
}

impl Item {
    /// Creates an untagged item in `folder_id`.
    #[must_use]
    pub fn new(item_type: ItemType, folder_id: ItemId) -> Self {
        Self {
            item_type,
            folder_id,
            tags: BTreeSet::new(),
            color: 0,
            alarm_dismissed_at: None,
        }
    }
}

/// Remote side of a mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Owner account.
    pub owner_id: String,
    /// Folder id in the owner's mailbox.
    pub remote_id: ItemId,
    /// Uuid of the remote folder.
    pub remote_uuid: Option<String>,
    /// Whether shared reminders fire.
    pub reminder_enabled: bool,
}

/// A folder or mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Parent folder.
    pub parent_id: ItemId,
    /// Display name.
    pub name: String,
    /// Default view.
    pub view: ItemType,
    /// Flags bitmask.
    pub flags: i32,
    /// Color.
    pub color: u32,
    /// Folder uuid.
    pub uuid: Option<String>,
    /// Set for mountpoints.
    pub mount: Option<Mount>,
}

impl Folder {
    fn plain(parent_id: ItemId, name: &str, view: ItemType) -> Self {
        Self {
            parent_id,
            name: name.to_string(),
            view,
            flags: 0,
            color: 0,
            uuid: None,
            mount: None,
        }
    }
}

/// Mailbox state held in memory.
///
/// Equality compares items and folders only, so two mailboxes that reached
/// the same state by different routes are equal.
#[derive(Debug, Clone)]
pub struct MemoryMailbox {
    id: MailboxId,
    items: BTreeMap<ItemId, Item>,
    folders: BTreeMap<ItemId, Folder>,
    mutations: u64,
    fail_next: Option<TargetError>,
}

impl PartialEq for MemoryMailbox {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.items == other.items && self.folders == other.folders
    }
}

impl Eq for MemoryMailbox {}

impl MemoryMailbox {
    /// Creates a mailbox holding only the root folder and the inbox.
    #[must_use]
    pub fn new(id: MailboxId) -> Self {
        let mut folders = BTreeMap::new();
        folders.insert(ROOT_FOLDER, Folder::plain(ROOT_FOLDER, "", ItemType::Folder));
        folders.insert(INBOX, Folder::plain(ROOT_FOLDER, "Inbox", ItemType::Message));
        Self {
            id,
            items: BTreeMap::new(),
            folders,
            mutations: 0,
            fail_next: None,
        }
    }

    /// Adds an item.
    #[must_use]
    pub fn with_item(mut self, id: ItemId, item: Item) -> Self {
        self.items.insert(id, item);
        self
    }

    /// Adds an untagged message to the inbox.
    #[must_use]
    pub fn with_message(self, id: i32) -> Self {
        self.with_item(ItemId::new(id), Item::new(ItemType::Message, INBOX))
    }

    /// Adds an empty folder under the root.
    #[must_use]
    pub fn with_folder(mut self, id: i32, name: &str) -> Self {
        self.folders
            .insert(ItemId::new(id), Folder::plain(ROOT_FOLDER, name, ItemType::Message));
        self
    }

    /// Makes the next apply call fail with `error`.
    pub fn fail_next_apply(&mut self, error: TargetError) {
        self.fail_next = Some(error);
    }

    /// Item by id.
    #[must_use]
    pub fn item(&self, id: i32) -> Option<&Item> {
        self.items.get(&ItemId::new(id))
    }

    /// Mutable item by id.
    pub fn item_mut(&mut self, id: i32) -> Option<&mut Item> {
        self.items.get_mut(&ItemId::new(id))
    }

    /// Folder by id.
    #[must_use]
    pub fn folder(&self, id: i32) -> Option<&Folder> {
        self.folders.get(&ItemId::new(id))
    }

    /// Number of items, folders excluded.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of folders, including root and inbox.
    #[must_use]
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Mutations that changed state.
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    fn injected(&mut self) -> TargetResult<()> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn items_mut(&mut self, ids: &[ItemId]) -> TargetResult<Vec<&mut Item>> {
        if let Some(missing) = ids.iter().find(|id| !self.items.contains_key(id)) {
            return Err(TargetError::NoSuchItem(*missing));
        }
        Ok(self
            .items
            .iter_mut()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, item)| item)
            .collect())
    }

    fn require_folder(&self, id: ItemId) -> TargetResult<()> {
        if self.folders.contains_key(&id) {
            Ok(())
        } else {
            Err(TargetError::NoSuchFolder(id))
        }
    }

    fn changed(&mut self) -> TargetResult<()> {
        self.mutations += 1;
        Ok(())
    }
}

impl MailboxTarget for MemoryMailbox {
    fn mailbox_id(&self) -> MailboxId {
        self.id
    }

    fn item_exists(&self, id: ItemId) -> bool {
        self.items.contains_key(&id) || self.folders.contains_key(&id)
    }

    fn apply_tag_alteration(&mut self, op: &AlterItemTag) -> TargetResult<()> {
        self.injected()?;
        let mut items = self.items_mut(&op.ids)?;
        let pending = items
            .iter()
            .filter(|item| item.tags.contains(&op.tag_name) != op.tagged)
            .count();
        if pending == 0 {
            return Err(TargetError::already_in_state(format!(
                "tag {:?} on {} items",
                op.tag_name,
                op.ids.len()
            )));
        }
        for item in &mut items {
            if op.tagged {
                item.tags.insert(op.tag_name.clone());
            } else {
                item.tags.remove(&op.tag_name);
            }
        }
        self.changed()
    }

    fn apply_create_mountpoint(&mut self, op: &CreateMountpoint) -> TargetResult<()> {
        self.injected()?;
        if self.item_exists(op.mountpoint_id) {
            return Err(TargetError::already_exists(format!(
                "mountpoint {}",
                op.mountpoint_id
            )));
        }
        self.require_folder(op.parent_id)?;
        self.folders.insert(
            op.mountpoint_id,
            Folder {
                parent_id: op.parent_id,
                name: op.name.clone(),
                view: op.view,
                flags: op.flags,
                color: op.color,
                uuid: None,
                mount: Some(Mount {
                    owner_id: op.owner_id.clone(),
                    remote_id: op.remote_id,
                    remote_uuid: op.remote_uuid.clone(),
                    reminder_enabled: op.reminder_enabled,
                }),
            },
        );
        self.changed()
    }

    fn apply_dismiss_alarm(&mut self, op: &DismissCalendarAlarm) -> TargetResult<()> {
        self.injected()?;
        let item = self
            .items
            .get_mut(&op.item_id)
            .ok_or(TargetError::NoSuchItem(op.item_id))?;
        if item.alarm_dismissed_at >= Some(op.dismissed_at_ms) {
            return Err(TargetError::already_in_state(format!(
                "alarm on {} dismissed",
                op.item_id
            )));
        }
        item.alarm_dismissed_at = Some(op.dismissed_at_ms);
        self.changed()
    }

    fn apply_enable_shared_reminder(&mut self, op: &EnableSharedReminder) -> TargetResult<()> {
        self.injected()?;
        let mount = self
            .folders
            .get_mut(&op.mountpoint_id)
            .and_then(|folder| folder.mount.as_mut())
            .ok_or(TargetError::NoSuchFolder(op.mountpoint_id))?;
        if mount.reminder_enabled == op.enabled {
            return Err(TargetError::already_in_state(format!(
                "reminders on {}",
                op.mountpoint_id
            )));
        }
        mount.reminder_enabled = op.enabled;
        self.changed()
    }

    fn apply_imap_copy(&mut self, op: &ImapCopyItem) -> TargetResult<()> {
        self.injected()?;
        self.require_folder(op.dest_folder_id)?;
        let mut copies = Vec::with_capacity(op.copies.len());
        for (src, target) in &op.copies {
            if self.item_exists(target.dest_id) {
                return Err(TargetError::already_exists(format!("item {}", target.dest_id)));
            }
            let source = self.items.get(src).ok_or(TargetError::NoSuchItem(*src))?;
            let mut copy = source.clone();
            copy.folder_id = op.dest_folder_id;
            copies.push((target.dest_id, copy));
        }
        self.items.extend(copies);
        self.changed()
    }

    fn apply_set_color(&mut self, op: &SetItemColor) -> TargetResult<()> {
        self.injected()?;
        let mut items = self.items_mut(&op.ids)?;
        if items.iter().all(|item| item.color == op.color) {
            return Err(TargetError::already_in_state(format!("color {}", op.color)));
        }
        for item in &mut items {
            item.color = op.color;
        }
        self.changed()
    }

    fn apply_create_folder(&mut self, op: &CreateFolder) -> TargetResult<()> {
        self.injected()?;
        if self.item_exists(op.folder_id) {
            return Err(TargetError::already_exists(format!("folder {}", op.folder_id)));
        }
        self.require_folder(op.parent_id)?;
        self.folders.insert(
            op.folder_id,
            Folder {
                parent_id: op.parent_id,
                name: op.name.clone(),
                view: op.view,
                flags: op.flags,
                color: op.color,
                uuid: op.uuid.clone(),
                mount: None,
            },
        );
        self.changed()
    }
}

/// A set of mailboxes resolvable by id.
#[derive(Debug, Default)]
pub struct MemoryMailboxes {
    mailboxes: BTreeMap<MailboxId, Mutex<MemoryMailbox>>,
    unavailable: BTreeSet<MailboxId>,
}

impl MemoryMailboxes {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `mailbox`, replacing any mailbox with the same id.
    #[must_use]
    pub fn with(mut self, mailbox: MemoryMailbox) -> Self {
        self.insert(mailbox);
        self
    }

    /// Adds `mailbox`, replacing any mailbox with the same id.
    pub fn insert(&mut self, mailbox: MemoryMailbox) {
        self.mailboxes.insert(mailbox.mailbox_id(), Mutex::new(mailbox));
    }

    /// Makes resolution of `id` fail with [`ResolveError::Unavailable`].
    pub fn mark_unavailable(&mut self, id: MailboxId) {
        self.unavailable.insert(id);
    }

    /// Locks a mailbox for inspection.
    ///
    /// # Panics
    ///
    /// Panics if the mailbox does not exist.
    pub fn get(&self, id: i32) -> MutexGuard<'_, MemoryMailbox> {
        self.mailboxes
            .get(&MailboxId::new(id))
            .map(Mutex::lock)
            .unwrap_or_else(|| panic!("no mailbox {id}"))
    }

    /// Copy of every mailbox, for comparing end states.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<MailboxId, MemoryMailbox> {
        self.mailboxes
            .iter()
            .map(|(id, mailbox)| (*id, mailbox.lock().clone()))
            .collect()
    }
}

impl MailboxResolver for MemoryMailboxes {
    type Handle<'a> = MutexGuard<'a, MemoryMailbox>;

    fn resolve(&self, mailbox_id: MailboxId) -> Result<Self::Handle<'_>, ResolveError> {
        if self.unavailable.contains(&mailbox_id) {
            return Err(ResolveError::Unavailable {
                mailbox_id,
                message: "mailbox is in maintenance mode".to_string(),
            });
        }
        self.mailboxes
            .get(&mailbox_id)
            .map(Mutex::lock)
            .ok_or(ResolveError::NotFound(mailbox_id))
    }
}

/// A log directory that is removed when dropped.
pub struct TestLog {
    dir: TempDir,
}

impl TestLog {
    /// Creates an empty temporary log directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp directory"),
        }
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens a writer with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or recovered.
    pub fn writer(&self) -> CoreResult<LogWriter> {
        self.writer_with(LogConfig::default())
    }

    /// Opens a writer with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or recovered.
    pub fn writer_with(&self, config: LogConfig) -> CoreResult<LogWriter> {
        LogWriter::open(self.path(), config)
    }

    /// Opens the directory for reading without taking the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is not a log.
    pub fn reader_dir(&self) -> CoreResult<LogDir> {
        LogDir::open_read_only(self.path())
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redolog_core::{CopyTarget, TargetErrorClass};

    fn tag(ids: &[i32], name: &str, tagged: bool) -> AlterItemTag {
        AlterItemTag::new(
            ids.iter().copied().map(ItemId::new).collect(),
            ItemType::Message,
            name,
            tagged,
        )
    }

    #[test]
    fn tagging_twice_signals_already_in_state() {
        let mut mailbox = MemoryMailbox::new(MailboxId::new(7)).with_message(101);
        mailbox.apply_tag_alteration(&tag(&[101], "Important", true)).unwrap();
        let err = mailbox
            .apply_tag_alteration(&tag(&[101], "Important", true))
            .unwrap_err();
        assert_eq!(err.class(), TargetErrorClass::AlreadyInState);
        assert_eq!(mailbox.mutations(), 1);
    }

    #[test]
    fn partial_tagging_completes_the_rest() {
        let mut mailbox = MemoryMailbox::new(MailboxId::new(7))
            .with_message(101)
            .with_message(102);
        mailbox.apply_tag_alteration(&tag(&[101], "x", true)).unwrap();
        mailbox.apply_tag_alteration(&tag(&[101, 102], "x", true)).unwrap();
        assert!(mailbox.item(102).unwrap().tags.contains("x"));
    }

    #[test]
    fn tagging_missing_item_fails() {
        let mut mailbox = MemoryMailbox::new(MailboxId::new(7));
        let err = mailbox.apply_tag_alteration(&tag(&[5], "x", true)).unwrap_err();
        assert_eq!(err, TargetError::NoSuchItem(ItemId::new(5)));
    }

    #[test]
    fn imap_copy_refuses_existing_destination() {
        let mut mailbox = MemoryMailbox::new(MailboxId::new(7))
            .with_message(101)
            .with_message(501);
        let op = ImapCopyItem {
            item_type: ItemType::Message,
            dest_folder_id: INBOX,
            copies: [(ItemId::new(101), CopyTarget::new(ItemId::new(501)))].into(),
        };
        let err = mailbox.apply_imap_copy(&op).unwrap_err();
        assert_eq!(err.class(), TargetErrorClass::AlreadyExists);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut mailbox = MemoryMailbox::new(MailboxId::new(7)).with_message(1);
        mailbox.fail_next_apply(TargetError::other("disk full"));
        assert!(mailbox.apply_tag_alteration(&tag(&[1], "x", true)).is_err());
        assert!(mailbox.apply_tag_alteration(&tag(&[1], "x", true)).is_ok());
    }

    #[test]
    fn resolver_distinguishes_missing_and_unavailable() {
        let mut mailboxes = MemoryMailboxes::new().with(MemoryMailbox::new(MailboxId::new(1)));
        mailboxes.insert(MemoryMailbox::new(MailboxId::new(2)));
        mailboxes.mark_unavailable(MailboxId::new(2));

        assert!(mailboxes.resolve(MailboxId::new(1)).is_ok());
        assert!(matches!(
            mailboxes.resolve(MailboxId::new(2)),
            Err(ResolveError::Unavailable { .. })
        ));
        assert!(matches!(
            mailboxes.resolve(MailboxId::new(3)),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_log_opens_writer() {
        let log = TestLog::new();
        let writer = log.writer().unwrap();
        drop(writer);
        assert!(log.reader_dir().is_ok());
    }
}
