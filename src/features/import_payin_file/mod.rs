//! Import pipeline: object storage -> zip entries -> CSV rows -> reporting tables

pub mod csv_reader;
pub mod header_mapping;
pub mod key_filter;
pub mod multi_section;
pub mod row_parser;
pub mod runner;
pub mod zip_import_task;

pub use csv_reader::{read_with_header, CsvRow, CsvRows};
pub use key_filter::KeyFilter;
pub use multi_section::{import_combined, split_sections, SectionCounts, SectionSplit};
pub use runner::{ImportPayinFileJob, ImportReport};
pub use zip_import_task::{EntryKind, ZipEntry, ZipImportTask};
