//! Combined settlement CSVs: summary rows, a marker row, then detail rows

use std::sync::Arc;

use crate::core::error::Result;
use crate::features::import_payin_file::csv_reader::CsvRow;
use crate::features::import_payin_file::row_parser::{
    parse_detail, parse_rows, parse_summary, Section,
};
use crate::features::payin_files::models::{PaypayPayinDetail, PaypayPayinSummary};
use crate::shared::constants::SECTION_MARKERS;

/// Rows of one combined file, split at the section marker
#[derive(Debug, Default)]
pub struct SectionSplit {
    pub summary: Vec<CsvRow>,
    pub detail: Vec<CsvRow>,
    /// Header the detail rows are keyed by, when the section carries its own
    pub detail_headers: Option<Arc<Vec<String>>>,
    pub has_marker: bool,
}

/// Rows handed to each section callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionCounts {
    pub summaries: usize,
    pub details: usize,
}

pub fn is_section_marker(row: &CsvRow) -> bool {
    let cell = row.first_cell().trim();
    SECTION_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(cell))
}

/// Split at the first marker row; the marker itself belongs to neither side.
///
/// When the row right after the marker is a header row for the detail
/// section, it is consumed and the detail rows are re-keyed by it.
pub fn split_sections(rows: impl IntoIterator<Item = CsvRow>) -> SectionSplit {
    let mut split = SectionSplit::default();
    let mut awaiting_detail_header = false;

    for row in rows {
        if !split.has_marker {
            if is_section_marker(&row) {
                split.has_marker = true;
                awaiting_detail_header = true;
            } else {
                split.summary.push(row);
            }
            continue;
        }

        if awaiting_detail_header {
            awaiting_detail_header = false;
            let candidate = row.as_headers();
            let is_header = Section::Detail
                .required_fields()
                .iter()
                .all(|required| candidate.iter().any(|h| h == required));
            if is_header {
                split.detail_headers = Some(Arc::new(candidate));
                continue;
            }
        }

        let row = match &split.detail_headers {
            Some(headers) => row.with_headers(Arc::clone(headers)),
            None => row,
        };
        split.detail.push(row);
    }

    split
}

/// Parse both sections of a combined file and hand them to the callbacks.
///
/// Both sections are validated before either callback runs, so a bad detail
/// row means the summary callback never sees its rows either.
pub fn import_combined<S, D>(
    headers: &[String],
    rows: impl IntoIterator<Item = CsvRow>,
    payin_file_id: i64,
    on_summary: S,
    on_detail: D,
) -> Result<SectionCounts>
where
    S: FnOnce(Vec<PaypayPayinSummary>),
    D: FnOnce(Vec<PaypayPayinDetail>),
{
    let split = split_sections(rows);

    let summaries = if split.summary.is_empty() {
        Vec::new()
    } else {
        parse_rows(
            Section::Summary,
            headers,
            &split.summary,
            payin_file_id,
            parse_summary,
        )?
    };

    let details = if split.detail.is_empty() {
        Vec::new()
    } else {
        let detail_headers = match &split.detail_headers {
            Some(own) => own.as_slice(),
            None => headers,
        };
        parse_rows(
            Section::Detail,
            detail_headers,
            &split.detail,
            payin_file_id,
            parse_detail,
        )?
    };

    let counts = SectionCounts {
        summaries: summaries.len(),
        details: details.len(),
    };
    tracing::debug!(
        "Payin file {}: {} summary rows, {} detail rows (marker: {})",
        payin_file_id,
        counts.summaries,
        counts.details,
        split.has_marker
    );

    on_summary(summaries);
    on_detail(details);
    Ok(counts)
}
