//! Wire compatibility: fixed vectors, round-trips at every version, and
//! records from older writers read by this one.

use proptest::prelude::*;
use redolog_core::{
    AlterItemTag, CopyTarget, CreateMountpoint, DecodeError, FormatVersion, ImapCopyItem, ItemId,
    ItemType, MailboxId, OpPayload, OpRecord, RecordKind, TransactionId,
};
use redolog_testkit::{
    appendable_kinds, frame_vectors, payload_of_kind, record_strategy, version_strategy,
    PropTestConfig,
};

#[test]
fn frame_vectors_decode_as_documented() {
    for vector in frame_vectors() {
        let frame = vector.frame();
        match (OpRecord::decode(&frame), &vector.expected_describe, &vector.expected_error) {
            (Ok((record, used)), Some(describe), None) => {
                assert_eq!(used, frame.len(), "{}: trailing bytes", vector.id);
                assert_eq!(&record.describe(), describe, "{}", vector.id);
                let reencoded = record.encode().unwrap();
                assert_eq!(reencoded, frame, "{}: re-encode differs", vector.id);
            }
            (Err(err), None, Some(expected)) => {
                assert!(
                    err.to_string().contains(expected.as_str()),
                    "{}: got {err}",
                    vector.id
                );
            }
            (result, _, _) => panic!("{}: unexpected result {result:?}", vector.id),
        }
    }
}

#[test]
fn every_kind_roundtrips_at_every_version_it_exists_in() {
    let mut runner = proptest::test_runner::TestRunner::new(
        PropTestConfig::quick().to_proptest_config(),
    );
    for version in FormatVersion::SUPPORTED {
        for kind in appendable_kinds(version) {
            runner
                .run(&payload_of_kind(kind, version), |payload| {
                    let record =
                        OpRecord::new(MailboxId::new(9), TransactionId::new(5, 1), payload)
                            .with_format_version(version);
                    let frame = record.encode().unwrap();
                    let (decoded, used) = OpRecord::decode(&frame).unwrap();
                    prop_assert_eq!(used, frame.len());
                    prop_assert_eq!(decoded, record);
                    Ok(())
                })
                .unwrap_or_else(|err| panic!("{kind} at {version}: {err}"));
        }
    }
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn records_roundtrip(record in version_strategy().prop_flat_map(record_strategy)) {
        let frame = record.encode().unwrap();
        let (decoded, used) = OpRecord::decode(&frame).unwrap();
        prop_assert_eq!(used, frame.len());
        prop_assert_eq!(decoded, record);
    }

    #[test]
    fn every_proper_prefix_is_a_torn_frame(record in version_strategy().prop_flat_map(record_strategy)) {
        let frame = record.encode().unwrap();
        for cut in 0..frame.len() {
            let err = OpRecord::decode(&frame[..cut]).unwrap_err();
            prop_assert!(err.is_eof(), "cut {} of {}: {}", cut, frame.len(), err);
        }
    }

    #[test]
    fn concatenated_frames_decode_in_order(
        records in prop::collection::vec(version_strategy().prop_flat_map(record_strategy), 1..8)
    ) {
        let mut stream = Vec::new();
        for record in &records {
            stream.extend(record.encode().unwrap());
        }
        let mut rest = stream.as_slice();
        for record in &records {
            let (decoded, used) = OpRecord::decode(rest).unwrap();
            prop_assert_eq!(&decoded, record);
            rest = &rest[used..];
        }
        prop_assert!(rest.is_empty());
    }
}

fn full_mountpoint() -> CreateMountpoint {
    CreateMountpoint {
        mountpoint_id: ItemId::new(5),
        parent_id: ItemId::new(1),
        name: "Shared".into(),
        owner_id: "acct-9".into(),
        remote_id: ItemId::new(42),
        view: ItemType::Appointment,
        flags: 0,
        color: 3,
        remote_uuid: Some("u-42".into()),
        reminder_enabled: true,
    }
}

#[test]
fn old_mountpoint_records_read_with_defaults() {
    let record = OpRecord::new(
        MailboxId::new(7),
        TransactionId::new(1, 0),
        full_mountpoint(),
    )
    .with_format_version(FormatVersion::V1_0);
    let (decoded, _) = OpRecord::decode(&record.encode().unwrap()).unwrap();
    let OpPayload::CreateMountpoint(mp) = decoded.payload else {
        panic!("wrong kind");
    };
    assert_eq!(decoded.header.format_version, FormatVersion::V1_0);
    assert_eq!(mp.name, "Shared");
    assert_eq!(mp.color, 0);
    assert_eq!(mp.remote_uuid, None);
    assert!(!mp.reminder_enabled);
}

#[test]
fn each_minor_version_adds_its_fields() {
    let encoded_len = |version| {
        OpRecord::new(MailboxId::new(7), TransactionId::new(1, 0), full_mountpoint())
            .with_format_version(version)
            .encode()
            .unwrap()
            .len()
    };
    let v1_0 = encoded_len(FormatVersion::V1_0);
    assert_eq!(encoded_len(FormatVersion::V1_1), v1_0 + 4);
    assert_eq!(encoded_len(FormatVersion::V1_2), v1_0 + 4);
    // remote uuid "u-42" as 4 + 4 bytes, then the reminder flag
    assert_eq!(encoded_len(FormatVersion::V1_3), v1_0 + 4 + 8 + 1);
}

#[test]
fn old_tag_and_copy_records_read_with_defaults() {
    let mut tag = AlterItemTag::new(vec![ItemId::new(101)], ItemType::Message, "x", true);
    tag.constraint = Some("-tj".into());
    tag.tag_id = Some(64);
    let record = OpRecord::new(MailboxId::new(7), TransactionId::new(1, 0), tag)
        .with_format_version(FormatVersion::V1_1);
    let (decoded, _) = OpRecord::decode(&record.encode().unwrap()).unwrap();
    let OpPayload::AlterItemTag(tag) = decoded.payload else {
        panic!("wrong kind");
    };
    assert_eq!(tag.constraint.as_deref(), Some("-tj"));
    assert_eq!(tag.tag_id, None);

    let mut target = CopyTarget::new(ItemId::new(501));
    target.dest_uuid = Some("d-501".into());
    let copy = ImapCopyItem {
        item_type: ItemType::Message,
        dest_folder_id: ItemId::new(3),
        copies: [(ItemId::new(101), target)].into(),
    };
    let record = OpRecord::new(MailboxId::new(7), TransactionId::new(2, 0), copy)
        .with_format_version(FormatVersion::V1_1);
    let (decoded, _) = OpRecord::decode(&record.encode().unwrap()).unwrap();
    let OpPayload::ImapCopyItem(copy) = decoded.payload else {
        panic!("wrong kind");
    };
    assert_eq!(copy.copies[&ItemId::new(101)].dest_id, ItemId::new(501));
    assert_eq!(copy.copies[&ItemId::new(101)].dest_uuid, None);
}

#[test]
fn newer_minor_is_refused() {
    let record = OpRecord::new(
        MailboxId::new(7),
        TransactionId::new(1, 0),
        AlterItemTag::new(vec![], ItemType::Message, "x", true),
    );
    let mut frame = record.encode().unwrap();
    let newer = FormatVersion::new(1, FormatVersion::CURRENT.minor + 1);
    frame[5..7].copy_from_slice(&newer.to_wire().to_be_bytes());
    assert!(matches!(
        OpRecord::decode(&frame),
        Err(DecodeError::UnsupportedVersion { found, .. }) if found == newer
    ));
}

#[test]
fn kinds_cannot_be_written_before_they_exist() {
    for kind in RecordKind::ALL {
        if kind.is_internal() {
            continue;
        }
        for version in FormatVersion::SUPPORTED {
            assert_eq!(
                appendable_kinds(version).contains(&kind),
                version.at_least(kind.introduced_in()),
                "{kind} at {version}"
            );
        }
    }
}
