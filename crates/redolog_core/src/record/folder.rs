//! Folder and mountpoint records.

use super::{redact, ApplyOutcome, OpBody, RecordKind};
use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreResult, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::{FormatVersion, ItemId, ItemType};

/// Creates a mountpoint: a local folder entry pointing at a folder in
/// another account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMountpoint {
    /// Id assigned to the mountpoint when the operation first ran.
    pub mountpoint_id: ItemId,
    /// Parent folder.
    pub parent_id: ItemId,
    /// Display name.
    pub name: String,
    /// Account id of the remote owner.
    pub owner_id: String,
    /// Id of the shared folder in the owner's mailbox.
    pub remote_id: ItemId,
    /// Default item type shown in the mountpoint.
    pub view: ItemType,
    /// Folder flags bitmask.
    pub flags: i32,
    /// Color. Since 1.1, default 0.
    pub color: u32,
    /// Uuid of the remote folder. Since 1.3.
    pub remote_uuid: Option<String>,
    /// Whether reminders fire for the shared calendar. Since 1.3, default
    /// false.
    pub reminder_enabled: bool,
}

impl OpBody for CreateMountpoint {
    const KIND: RecordKind = RecordKind::CreateMountpoint;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_item_id(self.mountpoint_id);
        w.put_item_id(self.parent_id);
        w.put_str(&self.name)?;
        w.put_str(&self.owner_id)?;
        w.put_item_id(self.remote_id);
        w.put_item_type(self.view);
        w.put_i32(self.flags);
        w.since(FormatVersion::V1_1, |w| {
            w.put_u32(self.color);
            Ok(())
        })?;
        w.since(FormatVersion::V1_3, |w| {
            w.put_opt_str(self.remote_uuid.as_deref())?;
            w.put_bool(self.reminder_enabled);
            Ok(())
        })
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        let mountpoint_id = r.get_item_id()?;
        let parent_id = r.get_item_id()?;
        let name = r.get_str("name")?;
        let owner_id = r.get_str("owner_id")?;
        let remote_id = r.get_item_id()?;
        let view = r.get_item_type("view")?;
        let flags = r.get_i32()?;
        let color = r.since(FormatVersion::V1_1, |r| r.get_u32())?;
        let (remote_uuid, reminder_enabled) = r
            .since(FormatVersion::V1_3, |r| {
                Ok((r.get_opt_str("remote_uuid")?, r.get_bool("reminder_enabled")?))
            })?
            .unwrap_or((None, false));
        Ok(Self {
            mountpoint_id,
            parent_id,
            name,
            owner_id,
            remote_id,
            view,
            flags,
            color: color.unwrap_or(0),
            remote_uuid,
            reminder_enabled,
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_create_mountpoint(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        format!(
            "mountpoint {} {} in {} -> {}:{} (uuid {}) view={} reminders={}",
            self.mountpoint_id,
            redact::text(&self.name),
            self.parent_id,
            redact::uuid(Some(&self.owner_id)),
            self.remote_id,
            redact::uuid(self.remote_uuid.as_deref()),
            self.view,
            self.reminder_enabled,
        )
    }
}

/// Creates a folder with a fixed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFolder {
    /// Id assigned to the folder when the operation first ran.
    pub folder_id: ItemId,
    /// Parent folder.
    pub parent_id: ItemId,
    /// Display name.
    pub name: String,
    /// Default item type shown in the folder.
    pub view: ItemType,
    /// Folder flags bitmask.
    pub flags: i32,
    /// Color.
    pub color: u32,
    /// Folder uuid, if one was assigned.
    pub uuid: Option<String>,
}

impl OpBody for CreateFolder {
    const KIND: RecordKind = RecordKind::CreateFolder;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_item_id(self.folder_id);
        w.put_item_id(self.parent_id);
        w.put_str(&self.name)?;
        w.put_item_type(self.view);
        w.put_i32(self.flags);
        w.put_u32(self.color);
        w.put_opt_str(self.uuid.as_deref())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            folder_id: r.get_item_id()?,
            parent_id: r.get_item_id()?,
            name: r.get_str("name")?,
            view: r.get_item_type("view")?,
            flags: r.get_i32()?,
            color: r.get_u32()?,
            uuid: r.get_opt_str("uuid")?,
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_create_folder(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        format!(
            "folder {} {} in {} (uuid {}) view={}",
            self.folder_id,
            redact::text(&self.name),
            self.parent_id,
            redact::uuid(self.uuid.as_deref()),
            self.view,
        )
    }
}

/// Enables or disables reminders on a shared calendar mountpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableSharedReminder {
    /// Mountpoint being changed.
    pub mountpoint_id: ItemId,
    /// New reminder state.
    pub enabled: bool,
}

impl OpBody for EnableSharedReminder {
    const KIND: RecordKind = RecordKind::EnableSharedReminder;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_item_id(self.mountpoint_id);
        w.put_bool(self.enabled);
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            mountpoint_id: r.get_item_id()?,
            enabled: r.get_bool("enabled")?,
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_enable_shared_reminder(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        format!(
            "shared reminder on {} {}",
            self.mountpoint_id,
            if self.enabled { "enabled" } else { "disabled" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mountpoint() -> CreateMountpoint {
        CreateMountpoint {
            mountpoint_id: ItemId::new(300),
            parent_id: ItemId::new(1),
            name: "Team Calendar".to_string(),
            owner_id: "8d1c7a52-03f4-4e0b-9c55-7b2e0f3a1d90".to_string(),
            remote_id: ItemId::new(10),
            view: ItemType::Appointment,
            flags: 0,
            color: 5,
            remote_uuid: Some("0f7e3c1a-6b2d-4d8e-a1f0-5c9b8e7d6a52".to_string()),
            reminder_enabled: true,
        }
    }

    fn decode_at<T: OpBody>(op: &T, version: FormatVersion) -> T {
        let mut w = FrameWriter::new(version);
        op.encode(&mut w).unwrap();
        let bytes = w.into_vec();
        let mut r = FrameReader::new(&bytes, version);
        let out = T::decode(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        out
    }

    #[test]
    fn mountpoint_roundtrip_current() {
        let op = mountpoint();
        assert_eq!(decode_at(&op, FormatVersion::CURRENT), op);
    }

    #[test]
    fn mountpoint_defaults_before_1_3() {
        let v12 = decode_at(&mountpoint(), FormatVersion::V1_2);
        assert_eq!(v12.color, 5);
        assert_eq!(v12.remote_uuid, None);
        assert!(!v12.reminder_enabled);

        let v10 = decode_at(&mountpoint(), FormatVersion::V1_0);
        assert_eq!(v10.color, 0);
        assert_eq!(v10.name, "Team Calendar");
    }

    #[test]
    fn mountpoint_describe_shortens_uuids() {
        let text = mountpoint().describe();
        assert!(text.contains("8d1c7a52~"));
        assert!(text.contains("0f7e3c1a~"));
        assert!(!text.contains("7b2e0f3a1d90"));
    }

    #[test]
    fn folder_roundtrip() {
        let op = CreateFolder {
            folder_id: ItemId::new(260),
            parent_id: ItemId::new(1),
            name: "Receipts".to_string(),
            view: ItemType::Message,
            flags: 0,
            color: 0,
            uuid: None,
        };
        assert_eq!(decode_at(&op, FormatVersion::V1_4), op);
    }

    #[test]
    fn reminder_rejects_bad_bool() {
        let bytes = [0, 0, 1, 44, 7];
        let mut r = FrameReader::new(&bytes, FormatVersion::CURRENT);
        assert!(EnableSharedReminder::decode(&mut r).is_err());
    }
}
