//! Binary frame codec.
//!
//! Every record frame is a flat sequence of fixed-width big-endian integers,
//! length-prefixed strings and counted collections. There is no frame-level
//! length prefix: a frame is exactly as long as its kind's field layout says,
//! so a reader that does not know a kind cannot skip it.
//!
//! ## Primitive Encodings
//!
//! ```text
//! u8 / bool         1 byte (bool must be 0 or 1)
//! i32 / u32         4 bytes big-endian
//! i64               8 bytes big-endian
//! string            u32 byte length | UTF-8 bytes
//! optional string   u32 0xFFFF_FFFF for None, otherwise as string
//! optional i32      presence byte (0/1) | i32 if present
//! id list           u32 count | count x i32
//! ```
//!
//! ## Version Gating
//!
//! The negotiated [`FormatVersion`](crate::FormatVersion) travels with the
//! writer and the reader. A field added in a later minor version is wrapped
//! in `since(introduced, ..)` on both sides: the writer omits it for older
//! versions and the reader substitutes the field's documented default.

mod reader;
mod writer;

pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Wire value marking an absent optional string.
pub(crate) const NONE_LEN: u32 = u32::MAX;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormatVersion, ItemId, ItemType};

    #[test]
    fn primitives_roundtrip() {
        let mut w = FrameWriter::new(FormatVersion::CURRENT);
        w.put_u8(0xAB);
        w.put_bool(true);
        w.put_i32(-42);
        w.put_u32(7);
        w.put_i64(1_700_000_000_000);
        w.put_str("Inbox").unwrap();
        w.put_opt_str(None).unwrap();
        w.put_opt_str(Some("u-42")).unwrap();
        w.put_ids(&[ItemId::new(101), ItemId::new(102)]).unwrap();
        w.put_item_type(ItemType::Message);
        w.put_opt_i32(Some(-7));
        w.put_opt_i32(None);
        let bytes = w.into_vec();

        let mut r = FrameReader::new(&bytes, FormatVersion::CURRENT);
        assert_eq!(r.get_u8().unwrap(), 0xAB);
        assert!(r.get_bool("flag").unwrap());
        assert_eq!(r.get_i32().unwrap(), -42);
        assert_eq!(r.get_u32().unwrap(), 7);
        assert_eq!(r.get_i64().unwrap(), 1_700_000_000_000);
        assert_eq!(r.get_str("name").unwrap(), "Inbox");
        assert_eq!(r.get_opt_str("uuid").unwrap(), None);
        assert_eq!(r.get_opt_str("uuid").unwrap().as_deref(), Some("u-42"));
        assert_eq!(
            r.get_ids().unwrap(),
            vec![ItemId::new(101), ItemId::new(102)]
        );
        assert_eq!(r.get_item_type("type").unwrap(), ItemType::Message);
        assert_eq!(r.get_opt_i32("tag_id").unwrap(), Some(-7));
        assert_eq!(r.get_opt_i32("tag_id").unwrap(), None);
        assert_eq!(r.remaining(), 0);
        assert_eq!(r.position(), bytes.len());
    }

    #[test]
    fn integers_are_big_endian() {
        let mut w = FrameWriter::new(FormatVersion::CURRENT);
        w.put_i32(0x0102_0304);
        assert_eq!(w.into_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn gated_field_omitted_for_older_version() {
        let mut old = FrameWriter::new(FormatVersion::V1_0);
        old.since(FormatVersion::V1_1, |w| {
            w.put_i32(9);
            Ok(())
        })
        .unwrap();
        assert!(old.is_empty());

        let mut new = FrameWriter::new(FormatVersion::V1_1);
        new.since(FormatVersion::V1_1, |w| {
            w.put_i32(9);
            Ok(())
        })
        .unwrap();
        assert_eq!(new.len(), 4);
    }

    #[test]
    fn gated_read_uses_default_when_absent() {
        let bytes: Vec<u8> = Vec::new();
        let mut r = FrameReader::new(&bytes, FormatVersion::V1_0);
        let value = r
            .since(FormatVersion::V1_1, |r| r.get_i32())
            .unwrap()
            .unwrap_or(-1);
        assert_eq!(value, -1);
    }

    #[test]
    fn short_input_reports_eof() {
        let bytes = [0u8, 1];
        let mut r = FrameReader::new(&bytes, FormatVersion::CURRENT);
        let err = r.get_i32().unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn bad_bool_is_invalid() {
        let bytes = [2u8];
        let mut r = FrameReader::new(&bytes, FormatVersion::CURRENT);
        assert!(!r.get_bool("tagged").unwrap_err().is_eof());
    }

    #[test]
    fn huge_count_fails_without_allocating() {
        let mut w = FrameWriter::new(FormatVersion::CURRENT);
        w.put_u32(u32::MAX - 1);
        let bytes = w.into_vec();
        let mut r = FrameReader::new(&bytes, FormatVersion::CURRENT);
        assert!(r.get_ids().unwrap_err().is_eof());
    }
}
