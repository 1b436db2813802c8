/// Extensions the remote listing accepts
pub const REMOTE_FILE_EXTENSIONS: [&str; 3] = ["csv", "pdf", "zip"];

/// Extensions the import job accepts from object storage
pub const IMPORT_FILE_EXTENSIONS: [&str; 1] = ["zip"];

/// Extension of CSV entries inside settlement zips
pub const CSV_EXTENSION: &str = "csv";

/// Largest decompressed CSV entry read out of a settlement zip
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Capacity of the channels between a producer and a worker pool,
/// expressed in pages
pub const STREAM_BUFFER_PAGES: usize = 2;

/// Postgres accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

// =============================================================================
// CSV SECTIONS
// =============================================================================

/// First-cell values that separate the summary section from the detail
/// section of a combined settlement CSV (compared trimmed, ASCII case-insensitive)
pub const SECTION_MARKERS: [&str; 5] = ["明細", "取引明細", "detail", "details", "[detail]"];

/// Byte-order mark some providers prepend to the first header cell
pub const UTF8_BOM: char = '\u{feff}';

/// Return the lowercase extension of a path-like string, if any
pub fn extension_of(name: &str) -> Option<String> {
    let base = base_name(name);
    base.rfind('.')
        .filter(|&idx| idx + 1 < base.len())
        .map(|idx| base[idx + 1..].to_ascii_lowercase())
}

/// Final path segment of a remote path or object key
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
