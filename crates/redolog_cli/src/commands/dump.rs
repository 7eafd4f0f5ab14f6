//! Dump command implementation.

use super::{open_log, CliResult, OutputFormat};
use redolog_core::{
    CoreError, LogDir, LogReader, RecordHeader, RecordKind, ScannedRecord, SegmentId,
};
use serde::Serialize;
use std::path::Path;

/// Which records to print.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// First segment to read.
    pub from: Option<SegmentId>,
    /// Maximum number of records.
    pub limit: Option<usize>,
    /// Only records for this mailbox.
    pub mailbox: Option<i32>,
}

/// A decoded record for output.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Segment holding the frame.
    pub segment_id: SegmentId,
    /// Offset of the frame.
    pub offset: u64,
    /// Record kind.
    pub kind: RecordKind,
    /// Common record fields.
    pub header: RecordHeader,
    /// Redacted summary.
    pub summary: String,
}

impl From<ScannedRecord> for DumpedRecord {
    fn from(scanned: ScannedRecord) -> Self {
        Self {
            segment_id: scanned.segment_id,
            offset: scanned.offset,
            kind: scanned.record.kind(),
            header: scanned.record.header,
            summary: scanned.record.describe(),
        }
    }
}

/// Runs the dump command.
///
/// Records decoded before a scan error are printed; the error is returned
/// afterwards.
pub fn run(path: &Path, options: &DumpOptions, format: OutputFormat) -> CliResult<()> {
    let dir = open_log(path)?;
    let (records, failure) = collect(&dir, options)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            println!("Records ({} shown)", records.len());
            println!("================");
            for record in &records {
                println!("[{} @{:>8}] {}", record.segment_id, record.offset, record.summary);
            }
        }
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Scans `dir` and returns the matching records plus the error that ended
/// the scan, if any.
pub fn collect(
    dir: &LogDir,
    options: &DumpOptions,
) -> CliResult<(Vec<DumpedRecord>, Option<CoreError>)> {
    let reader = LogReader::new(dir);
    let scanner = match options.from {
        Some(from) => reader.scan_from(from)?,
        None => reader.scan_all()?,
    };
    let limit = options.limit.unwrap_or(usize::MAX);

    let mut records = Vec::new();
    for item in scanner {
        if records.len() >= limit {
            break;
        }
        match item {
            Ok(scanned) => {
                if options
                    .mailbox
                    .is_some_and(|m| scanned.record.mailbox_id().as_i32() != m)
                {
                    continue;
                }
                records.push(DumpedRecord::from(scanned));
            }
            Err(err) => return Ok((records, Some(err))),
        }
    }
    Ok((records, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use redolog_core::{AlterItemTag, ItemId, ItemType, MailboxId, OpRecord, TransactionId};
    use redolog_testkit::TestLog;

    fn populated() -> TestLog {
        let log = TestLog::new();
        let writer = log.writer().unwrap();
        for ts in 1..=6 {
            writer
                .append(&OpRecord::new(
                    MailboxId::new(if ts % 2 == 0 { 2 } else { 1 }),
                    TransactionId::new(ts, 0),
                    AlterItemTag::new(vec![ItemId::new(9)], ItemType::Message, "x", true),
                ))
                .unwrap();
            if ts == 3 {
                writer.rotate().unwrap();
            }
        }
        log
    }

    #[test]
    fn filters_by_mailbox_and_limit() {
        let log = populated();
        let dir = log.reader_dir().unwrap();

        let options = DumpOptions {
            mailbox: Some(2),
            ..DumpOptions::default()
        };
        let (records, failure) = collect(&dir, &options).unwrap();
        assert!(failure.is_none());
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.header.mailbox_id == MailboxId::new(2)));

        let options = DumpOptions {
            limit: Some(2),
            ..DumpOptions::default()
        };
        assert_eq!(collect(&dir, &options).unwrap().0.len(), 2);
    }

    #[test]
    fn starts_at_requested_segment() {
        let log = populated();
        let dir = log.reader_dir().unwrap();
        let options = DumpOptions {
            from: Some(SegmentId::new(2)),
            ..DumpOptions::default()
        };
        let (records, _) = collect(&dir, &options).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].header.transaction_id, TransactionId::new(4, 0));
        assert!(records[0].summary.contains("AlterItemTag"));

        let json = serde_json::to_string(&records).unwrap();
        assert!(json.contains("\"kind\":\"AlterItemTag\""));
    }
}
