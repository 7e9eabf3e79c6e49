//! File format detection.
//!
//! The extension decides when it is recognized; otherwise the first 512 bytes are inspected.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected when the extension is inconclusive.
pub const SNIFF_LEN: usize = 512;

const ZIP_LOCAL_FILE: [u8; 2] = [0x50, 0x4B];
const COMPOUND_BINARY_FILE: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];
const SQL_MARKERS: [&str; 4] = ["create table", "insert into", "select ", "drop table"];

/// Closed set of formats the detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Comma-separated values.
    Csv,
    /// JSON document (array of objects or a single object).
    Json,
    /// Zip-based spreadsheet.
    Xlsx,
    /// Compound-binary spreadsheet.
    Xls,
    /// Database dump (`.dump`, bare `.gz`).
    Dump,
    /// Tar archive.
    Tar,
    /// Gzip-compressed tar archive.
    TarGz,
    /// SQL script.
    Sql,
    /// Nothing matched.
    Unknown,
}

impl FileFormat {
    /// Classify by extension alone. `None` means "inspect the content".
    pub fn from_path_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = match ext.as_str() {
            "csv" => Self::Csv,
            "json" => Self::Json,
            "xlsx" => Self::Xlsx,
            "xls" => Self::Xls,
            "dump" => Self::Dump,
            "tar" => Self::Tar,
            "gz" => {
                let name = path.to_string_lossy().to_ascii_lowercase();
                if name.ends_with(".tar.gz") {
                    Self::TarGz
                } else {
                    Self::Dump
                }
            }
            "sql" => Self::Sql,
            _ => return None,
        };
        Some(format)
    }

    /// Classify from a prefix of the file content.
    pub fn from_content(prefix: &[u8]) -> Self {
        if serde_json::from_slice::<serde_json::Value>(prefix).is_ok() {
            return Self::Json;
        }
        if prefix.len() >= 4 && prefix.starts_with(&ZIP_LOCAL_FILE) {
            return Self::Xlsx;
        }
        if prefix.len() >= 8 && prefix.starts_with(&COMPOUND_BINARY_FILE) {
            return Self::Xls;
        }
        let text = String::from_utf8_lossy(prefix).trim().to_lowercase();
        if SQL_MARKERS.iter().any(|m| text.contains(m)) {
            return Self::Sql;
        }
        Self::Unknown
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Dump => "dump",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::Sql => "sql",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the format of the file at `path`.
///
/// Unreadable files are reported as [`FileFormat::Unknown`]; the extractor dispatch turns that
/// into an unsupported-format error.
pub fn detect_format(path: impl AsRef<Path>) -> FileFormat {
    let path = path.as_ref();
    if let Some(format) = FileFormat::from_path_extension(path) {
        return format;
    }
    match read_prefix(path) {
        Ok(prefix) => FileFormat::from_content(&prefix),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "content sniffing failed");
            FileFormat::Unknown
        }
    }
}

fn read_prefix(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}
