//! IMAP copy record.

use super::{redact, ApplyOutcome, OpBody, RecordKind};
use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreResult, DecodeError, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::{FormatVersion, ItemId, ItemType};
use std::collections::BTreeMap;

/// Where one source item was copied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTarget {
    /// Id the copy was created with.
    pub dest_id: ItemId,
    /// Uuid of the copy. Since 1.2.
    pub dest_uuid: Option<String>,
}

impl CopyTarget {
    /// Creates a copy target without uuid.
    #[must_use]
    pub fn new(dest_id: ItemId) -> Self {
        Self {
            dest_id,
            dest_uuid: None,
        }
    }
}

/// Copies items into a folder as an IMAP `COPY` did, keeping the
/// destination ids assigned the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapCopyItem {
    /// Type of the copied items.
    pub item_type: ItemType,
    /// Folder the copies were placed in.
    pub dest_folder_id: ItemId,
    /// Source item to copy, ordered by source id.
    pub copies: BTreeMap<ItemId, CopyTarget>,
}

/// Smallest encoded copy entry: source and destination ids.
const MIN_ENTRY_LEN: usize = 8;

impl OpBody for ImapCopyItem {
    const KIND: RecordKind = RecordKind::ImapCopyItem;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_item_type(self.item_type);
        w.put_item_id(self.dest_folder_id);
        w.put_count(self.copies.len())?;
        for (src, copy) in &self.copies {
            w.put_item_id(*src);
            w.put_item_id(copy.dest_id);
            w.since(FormatVersion::V1_2, |w| w.put_opt_str(copy.dest_uuid.as_deref()))?;
        }
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        let item_type = r.get_item_type("item_type")?;
        let dest_folder_id = r.get_item_id()?;
        let count = r.get_count(MIN_ENTRY_LEN)?;
        let mut copies = BTreeMap::new();
        for _ in 0..count {
            let src = r.get_item_id()?;
            let dest_id = r.get_item_id()?;
            let dest_uuid = r
                .since(FormatVersion::V1_2, |r| r.get_opt_str("dest_uuid"))?
                .flatten();
            if copies.insert(src, CopyTarget { dest_id, dest_uuid }).is_some() {
                return Err(DecodeError::InvalidValue {
                    field: "copies",
                    value: i64::from(src.as_i32()),
                });
            }
        }
        Ok(Self {
            item_type,
            dest_folder_id,
            copies,
        })
    }

    /// Skips copies whose destination id already exists; the target only
    /// sees the remainder. With nothing left the record is a no-op.
    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        let pending: BTreeMap<ItemId, CopyTarget> = self
            .copies
            .iter()
            .filter(|(_, copy)| !target.item_exists(copy.dest_id))
            .map(|(src, copy)| (*src, copy.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(ApplyOutcome::NoOp);
        }
        if pending.len() == self.copies.len() {
            target.apply_imap_copy(self)?;
        } else {
            target.apply_imap_copy(&Self {
                item_type: self.item_type,
                dest_folder_id: self.dest_folder_id,
                copies: pending,
            })?;
        }
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        let pairs: Vec<String> = self
            .copies
            .iter()
            .take(8)
            .map(|(src, copy)| {
                format!(
                    "{}->{}({})",
                    src.as_i32(),
                    copy.dest_id.as_i32(),
                    redact::uuid(copy.dest_uuid.as_deref())
                )
            })
            .collect();
        let more = self.copies.len().saturating_sub(pairs.len());
        let suffix = if more > 0 {
            format!(",+{more}")
        } else {
            String::new()
        };
        format!(
            "imap copy of {} {} into {}: [{}{suffix}]",
            self.copies.len(),
            self.item_type,
            self.dest_folder_id,
            pairs.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> ImapCopyItem {
        let mut copies = BTreeMap::new();
        copies.insert(
            ItemId::new(500),
            CopyTarget {
                dest_id: ItemId::new(900),
                dest_uuid: Some("c0ffee00-1111-2222-3333-444455556666".to_string()),
            },
        );
        copies.insert(ItemId::new(501), CopyTarget::new(ItemId::new(901)));
        ImapCopyItem {
            item_type: ItemType::Message,
            dest_folder_id: ItemId::new(2),
            copies,
        }
    }

    #[test]
    fn roundtrip_and_uuid_gating() {
        for version in FormatVersion::SUPPORTED {
            let mut w = FrameWriter::new(version);
            op().encode(&mut w).unwrap();
            let bytes = w.into_vec();
            let mut r = FrameReader::new(&bytes, version);
            let decoded = ImapCopyItem::decode(&mut r).unwrap();
            assert_eq!(r.remaining(), 0);
            let uuid = decoded.copies[&ItemId::new(500)].dest_uuid.clone();
            if version.at_least(FormatVersion::V1_2) {
                assert_eq!(decoded, op());
            } else {
                assert_eq!(uuid, None);
                assert_eq!(decoded.copies[&ItemId::new(500)].dest_id, ItemId::new(900));
            }
        }
    }

    #[test]
    fn repeated_source_is_rejected() {
        let mut w = FrameWriter::new(FormatVersion::V1_0);
        w.put_item_type(ItemType::Message);
        w.put_item_id(ItemId::new(2));
        w.put_count(2).unwrap();
        for dest in [900, 901] {
            w.put_item_id(ItemId::new(500));
            w.put_item_id(ItemId::new(dest));
        }
        let bytes = w.into_vec();
        let mut r = FrameReader::new(&bytes, FormatVersion::V1_0);
        assert!(matches!(
            ImapCopyItem::decode(&mut r),
            Err(DecodeError::InvalidValue { field: "copies", value: 500 })
        ));
    }

    #[test]
    fn describe_shortens_uuid() {
        let text = op().describe();
        assert!(text.contains("500->900(c0ffee00~)"));
        assert!(text.contains("501->901(-)"));
    }
}
