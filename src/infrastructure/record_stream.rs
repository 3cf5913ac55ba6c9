//! Record Stream Reader
//!
//! Replays a decoded snapshot stream (one JSON record per line) into a
//! [`RecordHandler`]. The file is memory-mapped rather than read into a buffer.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;
use tracing::debug;

use crate::domain::records::Record;
use crate::ports::RecordHandler;

/// Replay every record in `path`. Returns the number of records handled.
pub fn replay_file(path: &Path, handler: &mut dyn RecordHandler) -> Result<usize> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open record stream {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(0);
    }

    // SAFETY: the mapping is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map {}", path.display()))?;
    debug!("mapped {} bytes from {}", mmap.len(), path.display());

    replay_bytes(&mmap, handler)
        .with_context(|| format!("Malformed record stream {}", path.display()))
}

/// Replay records from an in-memory stream. Blank lines are skipped; the
/// first malformed line aborts with its line number.
pub fn replay_bytes(bytes: &[u8], handler: &mut dyn RecordHandler) -> Result<usize> {
    let mut count = 0;
    for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = trim_whitespace(line);
        if line.is_empty() {
            continue;
        }
        let record: Record = serde_json::from_slice(line)
            .with_context(|| format!("line {}: not a valid record", idx + 1))?;
        record
            .dispatch(handler)
            .with_context(|| format!("line {}: record rejected", idx + 1))?;
        count += 1;
    }
    Ok(count)
}

fn trim_whitespace(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}
