//! Records that change attributes of existing items.

use super::{redact, ApplyOutcome, OpBody, RecordKind};
use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreResult, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::{FormatVersion, ItemId, ItemType};

/// Sets or clears a tag on a set of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterItemTag {
    /// Items the tag is applied to.
    pub ids: Vec<ItemId>,
    /// Type of the items.
    pub item_type: ItemType,
    /// Tag name.
    pub tag_name: String,
    /// True to set the tag, false to clear it.
    pub tagged: bool,
    /// Target constraint the original operation ran under. Since 1.1.
    pub constraint: Option<String>,
    /// Tag id, if known when logged. `None` resolves the tag by name at
    /// apply time. Since 1.2.
    pub tag_id: Option<i32>,
}

impl AlterItemTag {
    /// Creates a tag alteration without constraint or tag id.
    pub fn new(
        ids: Vec<ItemId>,
        item_type: ItemType,
        tag_name: impl Into<String>,
        tagged: bool,
    ) -> Self {
        Self {
            ids,
            item_type,
            tag_name: tag_name.into(),
            tagged,
            constraint: None,
            tag_id: None,
        }
    }
}

impl OpBody for AlterItemTag {
    const KIND: RecordKind = RecordKind::AlterItemTag;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_ids(&self.ids)?;
        w.put_item_type(self.item_type);
        w.put_str(&self.tag_name)?;
        w.put_bool(self.tagged);
        w.since(FormatVersion::V1_1, |w| w.put_opt_str(self.constraint.as_deref()))?;
        w.since(FormatVersion::V1_2, |w| {
            w.put_opt_i32(self.tag_id);
            Ok(())
        })
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            ids: r.get_ids()?,
            item_type: r.get_item_type("item_type")?,
            tag_name: r.get_str("tag_name")?,
            tagged: r.get_bool("tagged")?,
            constraint: r
                .since(FormatVersion::V1_1, |r| r.get_opt_str("constraint"))?
                .flatten(),
            tag_id: r
                .since(FormatVersion::V1_2, |r| r.get_opt_i32("tag_id"))?
                .flatten(),
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_tag_alteration(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        let tag_id = self
            .tag_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let constraint = self
            .constraint
            .as_deref()
            .map_or_else(|| "-".to_string(), redact::text);
        format!(
            "{} tag {} (id {tag_id}) on {} {} constraint={constraint}",
            if self.tagged { "set" } else { "clear" },
            redact::text(&self.tag_name),
            self.item_type,
            redact::ids(&self.ids),
        )
    }
}

/// Sets the color of a set of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetItemColor {
    /// Items being recolored.
    pub ids: Vec<ItemId>,
    /// Type of the items.
    pub item_type: ItemType,
    /// Color value (palette index or packed RGB).
    pub color: u32,
}

impl SetItemColor {
    /// Creates a color change.
    #[must_use]
    pub fn new(ids: Vec<ItemId>, item_type: ItemType, color: u32) -> Self {
        Self {
            ids,
            item_type,
            color,
        }
    }
}

impl OpBody for SetItemColor {
    const KIND: RecordKind = RecordKind::SetItemColor;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_ids(&self.ids)?;
        w.put_item_type(self.item_type);
        w.put_u32(self.color);
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            ids: r.get_ids()?,
            item_type: r.get_item_type("item_type")?,
            color: r.get_u32()?,
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_set_color(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        format!(
            "color {:#x} on {} {}",
            self.color,
            self.item_type,
            redact::ids(&self.ids)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: OpBody>(op: &T, version: FormatVersion) -> T {
        let mut w = FrameWriter::new(version);
        op.encode(&mut w).unwrap();
        let bytes = w.into_vec();
        let mut r = FrameReader::new(&bytes, version);
        let decoded = T::decode(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        decoded
    }

    fn full_tag() -> AlterItemTag {
        AlterItemTag {
            constraint: Some("-t".to_string()),
            tag_id: Some(64),
            ..AlterItemTag::new(
                vec![ItemId::new(257), ItemId::new(258)],
                ItemType::Message,
                "work",
                true,
            )
        }
    }

    #[test]
    fn tag_roundtrip_current() {
        let op = full_tag();
        assert_eq!(roundtrip(&op, FormatVersion::CURRENT), op);
    }

    #[test]
    fn tag_fields_default_at_older_versions() {
        let op = full_tag();

        let v11 = roundtrip(&op, FormatVersion::V1_1);
        assert_eq!(v11.constraint.as_deref(), Some("-t"));
        assert_eq!(v11.tag_id, None);

        let v10 = roundtrip(&op, FormatVersion::V1_0);
        assert_eq!(v10.constraint, None);
        assert_eq!(v10.tag_id, None);
        assert_eq!(v10.tag_name, "work");
        assert!(v10.tagged);
    }

    #[test]
    fn tag_describe_redacts_long_names() {
        let mut op = full_tag();
        op.tag_name = "n".repeat(50);
        let text = op.describe();
        assert!(text.starts_with("set tag"));
        assert!(!text.contains(&"n".repeat(33)));
    }

    #[test]
    fn color_roundtrip() {
        let op = SetItemColor::new(vec![ItemId::new(2)], ItemType::Folder, 0x00FF_8800);
        assert_eq!(roundtrip(&op, FormatVersion::V1_1), op);
        assert!(op.describe().contains("0xff8800"));
    }
}
