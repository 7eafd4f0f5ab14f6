//! Fuzz targets for the frame decoder and the segment scanner.
//!
//! Usable from cargo-fuzz or from proptest. The contract for arbitrary
//! input is the same everywhere: an error or a record, never a panic and
//! never an unbounded allocation.

use redolog_core::{
    MemorySegmentStore, OpRecord, SegmentHeader, SegmentId, SegmentScanner, SegmentStore,
};
use uuid::Uuid;

/// Decodes `data` as one frame. If it decodes, the record must survive
/// another encode and decode at its own version unchanged.
///
/// # Panics
///
/// Panics if a decoded record does not round-trip.
pub fn fuzz_frame_decode(data: &[u8]) {
    let Ok((record, used)) = OpRecord::decode(data) else {
        return;
    };
    assert!(used <= data.len(), "decoder consumed past its input");
    if let Ok(encoded) = record.encode() {
        let again = OpRecord::decode(&encoded).map(|(r, _)| r);
        assert_eq!(again.as_ref(), Ok(&record), "round-trip mismatch for {record}");
    }
}

/// Scans `data` as the frame area of a segment behind a valid header.
///
/// Returns the number of records yielded before the scan ended.
///
/// # Panics
///
/// Panics if the scanner yields more than one error or keeps going after
/// one.
pub fn fuzz_segment_scan(data: &[u8]) -> usize {
    let store = MemorySegmentStore::new();
    let id = SegmentId::FIRST;
    let mut bytes = SegmentHeader::new(Uuid::nil(), id).encode();
    bytes.extend_from_slice(data);
    store.put_segment_bytes(id, bytes);

    let Ok(backend) = store.read_segment(id) else {
        return 0;
    };
    let Ok(scanner) = SegmentScanner::open(id, backend) else {
        return 0;
    };
    let mut records = 0;
    let mut failed = false;
    for item in scanner {
        assert!(!failed, "scanner continued after an error");
        match item {
            Ok(_) => records += 1,
            Err(_) => failed = true,
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{any_record_strategy, PropTestConfig};
    use proptest::prelude::*;

    #[test]
    fn empty_and_tiny_inputs() {
        fuzz_frame_decode(&[]);
        fuzz_frame_decode(&[0x01]);
        fuzz_frame_decode(&[0xff; 64]);
        assert_eq!(fuzz_segment_scan(&[]), 0);
        assert_eq!(fuzz_segment_scan(&[0x01, 0x00]), 0);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            fuzz_frame_decode(&data);
            fuzz_segment_scan(&data);
        }

        #[test]
        fn valid_frame_with_garbage_tail(record in any_record_strategy(), tail in prop::collection::vec(any::<u8>(), 0..32)) {
            let mut data = record.encode().unwrap();
            data.extend_from_slice(&tail);
            fuzz_frame_decode(&data);
            prop_assert!(fuzz_segment_scan(&data) >= 1);
        }
    }
}
