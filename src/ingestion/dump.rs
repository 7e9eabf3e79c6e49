//! SQL script / database dump extraction.
//!
//! Only a line scan for `INSERT INTO` statements is performed. Statement values are not parsed,
//! so the extractor always yields an empty batch; matching statements are counted and logged.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ExtractResult;
use crate::types::Record;

/// Scan a dump file. Returns an empty batch; I/O errors are fatal.
pub fn extract_dump_from_path(path: impl AsRef<Path>) -> ExtractResult<Vec<Record>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let inserts = count_insert_statements(reader)?;
    tracing::warn!(
        path = %path.display(),
        insert_statements = inserts,
        "dump statements are not parsed; extracted 0 records"
    );
    Ok(Vec::new())
}

const INSERT_PREFIX: &[u8] = b"INSERT INTO";

/// Count lines that start an `INSERT INTO` statement (case-insensitive, leading whitespace ignored).
///
/// Lines are scanned as raw bytes, so compressed dumps and non-UTF-8 scripts are accepted.
pub fn count_insert_statements<R: BufRead>(mut reader: R) -> std::io::Result<usize> {
    let mut count = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = buf.trim_ascii_start();
        if line.len() >= INSERT_PREFIX.len()
            && line[..INSERT_PREFIX.len()].eq_ignore_ascii_case(INSERT_PREFIX)
        {
            count += 1;
        }
    }
    Ok(count)
}
