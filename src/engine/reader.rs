use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::MmapOptions;

/// Files above this are mapped instead of read into a buffer.
const MMAP_THRESHOLD: u64 = 1_048_576;

/// Read a candidate file the way the matchers expect it: zero-length lines
/// dropped, remaining lines re-joined with `\n`, non-UTF-8 bytes replaced.
/// Match offsets are positions in this joined text.
pub fn read_contents(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    let joined = if size > MMAP_THRESHOLD {
        // SAFETY: mapping is read-only and dropped before this returns
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        join_non_empty_lines(&mmap)
    } else {
        let raw = std::fs::read(path)?;
        join_non_empty_lines(&raw)
    };
    Ok(joined)
}

fn join_non_empty_lines(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
