//! Segments command implementation.

use super::{open_log, CliResult, OutputFormat};
use redolog_core::{LogDir, LogReader, SegmentInfo};
use std::fmt::Write as _;
use std::path::Path;

/// Runs the segments command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let dir = open_log(path)?;
    let infos = collect(&dir)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
        OutputFormat::Text => print!("{}", render_text(&infos)),
    }
    Ok(())
}

/// Inspects every segment in `dir`, oldest first.
pub fn collect(dir: &LogDir) -> CliResult<Vec<SegmentInfo>> {
    let reader = LogReader::new(dir);
    let mut infos = Vec::new();
    for id in reader.segments()? {
        infos.push(reader.inspect(id)?);
    }
    Ok(infos)
}

fn render_text(infos: &[SegmentInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Segments ({} total)", infos.len());
    let _ = writeln!(out, "================");
    for info in infos {
        let created = info
            .created_at_ms
            .map_or_else(|| "-".to_string(), |ms| ms.to_string());
        let _ = write!(
            out,
            "{} {:>10} bytes {:>6} frames created={created}",
            info.segment_id, info.size, info.frames
        );
        if info.sealed {
            let _ = write!(out, " sealed");
        }
        if let Some(offset) = info.torn_tail {
            let _ = write!(out, " torn@{offset}");
        }
        if let Some(ref error) = info.error {
            let _ = write!(out, " ERROR: {error}");
        }
        out.push('\n');
    }
    out
}
