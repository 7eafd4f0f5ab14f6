//! Wire-format test vectors.
//!
//! Each vector is a frame written byte by byte from the documented layout,
//! not by the encoder under test. Decoding them pins the format: a change
//! that breaks any vector would strand records already on disk.

use serde::{Deserialize, Serialize};

/// A frame and what decoding it must produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Frame bytes (hex-encoded).
    pub frame_hex: String,
    /// Expected `describe()` output of the decoded record.
    pub expected_describe: Option<String>,
    /// Substring of the expected decode error.
    pub expected_error: Option<String>,
}

impl FrameVector {
    fn ok(id: &str, description: &str, frame_hex: &str, describe: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            frame_hex: frame_hex.into(),
            expected_describe: Some(describe.into()),
            expected_error: None,
        }
    }

    fn err(id: &str, description: &str, frame_hex: &str, error: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            frame_hex: frame_hex.into(),
            expected_describe: None,
            expected_error: Some(error.into()),
        }
    }

    /// Frame bytes.
    ///
    /// # Panics
    ///
    /// Panics if `frame_hex` is not valid hex.
    #[must_use]
    pub fn frame(&self) -> Vec<u8> {
        hex_decode(&self.frame_hex).expect("Invalid hex in test vector")
    }
}

/// Frame vectors covering each layout rule.
pub fn frame_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector::ok(
            "tag_v1_0",
            "AlterItemTag at 1.0: no constraint, no tag id",
            "0100000007010000000000000000010000000200000001000000650500000009\
             496d706f7274616e7401",
            "txn:1.2 mbox:7 AlterItemTag v1.0: set tag \"Important\" (id -) on message [101] constraint=-",
        ),
        FrameVector::ok(
            "tag_v1_2",
            "AlterItemTag at 1.2: absent constraint and tag id",
            "0100000007010200000000000000010000000200000001000000650500000009\
             496d706f7274616e7401ffffffff00",
            "txn:1.2 mbox:7 AlterItemTag v1.2: set tag \"Important\" (id -) on message [101] constraint=-",
        ),
        FrameVector::ok(
            "mountpoint_v1_0",
            "CreateMountpoint at 1.0: color and remote uuid default",
            "0200000007010000000000000000010000000000000005000000010000000653\
             686172656400000006616363742d390000002a0b00000000",
            "txn:1.0 mbox:7 CreateMountpoint v1.0: mountpoint 5 \"Shared\" in 1 -> acct-9:42 \
             (uuid -) view=appointment reminders=false",
        ),
        FrameVector::ok(
            "imap_copy_v1_0",
            "ImapCopyItem at 1.0: one pair, no uuids",
            "0500000007010000000000000000030000000005000000030000000100000065\
             000001f5",
            "txn:3.0 mbox:7 ImapCopyItem v1.0: imap copy of 1 message into 3: [101->501(-)]",
        ),
        FrameVector::err(
            "unknown_kind",
            "Kind 0xFF is not a record",
            "ff000000070100000000000000000100000000",
            "unknown record kind 0xff",
        ),
        FrameVector::err(
            "newer_major",
            "Major version 2 is refused",
            "01000000070200000000000000000100000000",
            "unsupported format version 2.0",
        ),
        FrameVector::err(
            "color_before_1_1",
            "SetItemColor claiming format 1.0",
            "08000000070100000000000000000100000000",
            "do not exist before format 1.1",
        ),
        FrameVector::err(
            "torn_tag",
            "AlterItemTag cut inside its tag name",
            "0100000007010000000000000000010000000200000001000000650500000009\
             496d706f727461",
            "unexpected end of frame",
        ),
    ]
}

/// Decodes lowercase or uppercase hex.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

/// Encodes bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        assert_eq!(hex_decode("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
        assert_eq!(hex_encode(&[0xab, 0x01]), "ab01");
        assert!(hex_decode("abc").is_none());
        assert!(hex_decode("zz").is_none());
    }

    #[test]
    fn vectors_are_valid_hex() {
        for vector in frame_vectors() {
            assert!(hex_decode(&vector.frame_hex).is_some(), "{}", vector.id);
            assert!(
                vector.expected_describe.is_some() != vector.expected_error.is_some(),
                "{}",
                vector.id
            );
        }
    }

    #[test]
    fn vectors_serialize() {
        let json = serde_json::to_string(&frame_vectors()).unwrap();
        let back: Vec<FrameVector> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), frame_vectors().len());
    }
}
