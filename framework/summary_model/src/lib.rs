mod report;
mod stats;

pub use report::*;
pub use stats::*;

use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Append the report to a history file
///
/// The report will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_report(report: &BenchReport, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_report(report, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the report to a writer, on a single line
pub fn store_report<W: Write>(report: &BenchReport, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, report)?;
    Ok(())
}

/// Serialize the report as indented JSON, the format written next to each run
pub fn report_to_json(report: &BenchReport) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(report)?)
}

/// Load a report from a reader
pub fn load_report<R: Read>(reader: R) -> anyhow::Result<BenchReport> {
    let reader = std::io::BufReader::new(reader);
    let report: BenchReport = serde_json::from_reader(reader)?;
    Ok(report)
}

/// Load every report from a history file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_report]. Blank lines are skipped.
pub fn load_report_history(path: impl AsRef<Path>) -> anyhow::Result<Vec<BenchReport>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut reports = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let report: BenchReport = serde_json::from_str(&line)?;
        reports.push(report);
    }
    Ok(reports)
}
