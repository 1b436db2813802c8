use std::sync::Arc;

use csv::{StringRecord, StringRecordsIntoIter};

use crate::core::error::Result;
use crate::features::import_payin_file::header_mapping::normalize_header;

/// One data row keyed by the normalised header of its file
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    headers: Arc<Vec<String>>,
    cells: Vec<String>,
    /// 1-based line of the row in its file, header included
    line: u64,
}

impl CsvRow {
    fn new(headers: Arc<Vec<String>>, record: &StringRecord, line: u64) -> Self {
        let cells = record.iter().map(str::to_string).collect();
        Self::from_cells(headers, cells, line)
    }

    fn from_cells(headers: Arc<Vec<String>>, mut cells: Vec<String>, line: u64) -> Self {
        if cells.len() < headers.len() {
            cells.resize(headers.len(), String::new());
        }
        Self {
            headers,
            cells,
            line,
        }
    }

    /// Re-key the same cells under a different header row
    pub fn with_headers(self, headers: Arc<Vec<String>>) -> Self {
        Self::from_cells(headers, self.cells, self.line)
    }

    /// Interpret this row as a header row
    pub fn as_headers(&self) -> Vec<String> {
        self.cells.iter().map(|c| normalize_header(c)).collect()
    }

    /// Cell under `key`; the first column wins when two headers share a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == key)
            .map(|idx| self.cells[idx].as_str())
    }

    pub fn first_cell(&self) -> &str {
        self.cells.first().map(String::as_str).unwrap_or("")
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Lazy row sequence over one CSV document
pub struct CsvRows<'a> {
    headers: Arc<Vec<String>>,
    records: StringRecordsIntoIter<&'a [u8]>,
}

impl CsvRows<'_> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for CsvRows<'_> {
    type Item = Result<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let row = CsvRow::new(Arc::clone(&self.headers), &record, line);
            // Spreadsheet exports pad the end of a file with empty rows
            if row.is_blank() {
                continue;
            }
            return Some(Ok(row));
        }
    }
}

/// Read `content` using its first record as the header row.
///
/// Headers are normalised through the localized-label table; rows shorter
/// than the header are padded with empty cells. Every call starts over from
/// the first row.
pub fn read_with_header(content: &[u8]) -> Result<CsvRows<'_>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut records = reader.into_records();
    let headers = match records.next() {
        Some(header) => header?.iter().map(normalize_header).collect(),
        None => Vec::new(),
    };

    Ok(CsvRows {
        headers: Arc::new(headers),
        records,
    })
}
