//! Verify command implementation.

use super::{open_log, CliError, CliResult};
use redolog_core::{LogDir, LogReader, SegmentId};
use std::collections::BTreeMap;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Segments in the directory.
    pub segments: usize,
    /// Records decoded, seals included.
    pub records: u64,
    /// Records per segment.
    pub per_segment: BTreeMap<SegmentId, u64>,
    /// Conditions a writer recovers from but an operator should know about.
    pub warnings: Vec<String>,
    /// The decode or storage error that ended the scan.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying redo log at {}", path.display());
    println!();

    let dir = open_log(path)?;
    let result = verify(&dir)?;

    for (segment, records) in &result.per_segment {
        println!("  {segment}: {records} records");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    println!();
    println!(
        "{} segments, {} records checked",
        result.segments, result.records
    );

    match result.error {
        None => {
            println!("✓ Log verification passed");
            Ok(())
        }
        Some(error) => {
            println!("✗ Log verification failed: {error}");
            Err(CliError::VerificationFailed(error))
        }
    }
}

/// Scans every segment of `dir`.
pub fn verify(dir: &LogDir) -> CliResult<VerifyResult> {
    let reader = LogReader::new(dir);
    let segments = reader.segments()?;
    let mut result = VerifyResult {
        segments: segments.len(),
        ..VerifyResult::default()
    };

    let mut scanner = reader.scan_all()?;
    for item in scanner.by_ref() {
        match item {
            Ok(scanned) => {
                result.records += 1;
                *result.per_segment.entry(scanned.segment_id).or_default() += 1;
            }
            Err(err) => {
                result.error = Some(err.to_string());
                break;
            }
        }
    }

    let newest = segments.last().copied();
    for (segment, offset) in scanner.torn_tails() {
        if Some(*segment) == newest {
            result
                .warnings
                .push(format!("{segment} ends with a torn frame at {offset}; the next writer truncates it"));
        } else {
            result
                .warnings
                .push(format!("{segment} ends with a torn frame at {offset} but is not the newest segment"));
        }
    }
    if result.is_ok() {
        for id in segments.iter().rev().skip(1) {
            if !reader.inspect(*id)?.sealed {
                result.warnings.push(format!("{id} is not sealed but has a successor"));
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redolog_core::{
        AlterItemTag, ItemId, ItemType, MailboxId, OpRecord, TransactionId, SEGMENT_HEADER_LEN,
    };
    use redolog_testkit::TestLog;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn record(ts: i64) -> OpRecord {
        OpRecord::new(
            MailboxId::new(1),
            TransactionId::new(ts, 0),
            AlterItemTag::new(vec![ItemId::new(9)], ItemType::Message, "x", true),
        )
    }

    fn segment_file(log: &TestLog, id: u64) -> std::path::PathBuf {
        log.path().join("segments").join(format!("seg-{id:06}.log"))
    }

    #[test]
    fn clean_log_passes() {
        let log = TestLog::new();
        let writer = log.writer().unwrap();
        writer.append(&record(1)).unwrap();
        writer.rotate().unwrap();
        writer.append(&record(2)).unwrap();

        let result = verify(&log.reader_dir().unwrap()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.segments, 2);
        assert_eq!(result.records, 3);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn torn_tail_is_a_warning() {
        let log = TestLog::new();
        log.writer().unwrap().append(&record(1)).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(segment_file(&log, 1))
            .unwrap();
        file.write_all(&record(2).encode().unwrap()[..10]).unwrap();

        let result = verify(&log.reader_dir().unwrap()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.records, 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn unknown_kind_fails() {
        let log = TestLog::new();
        drop(log.writer().unwrap());
        let path = segment_file(&log, 1);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(SEGMENT_HEADER_LEN);
        bytes.extend_from_slice(&[0xFF; 24]);
        std::fs::write(&path, bytes).unwrap();

        let result = verify(&log.reader_dir().unwrap()).unwrap();
        assert_eq!(result.records, 0);
        assert!(result.error.unwrap().contains("unknown record kind 0xff"));
    }
}
