//! Import/Export Transfer: moving the entry collection in and out of the
//! vault as a JSON document.

mod document;
mod file;

pub use document::{export_document, merge_entries, parse_document};
pub use file::{
    export_entries, import_entries, ExportSink, FileExportSink, FileImportSource, ImportOutcome,
    ImportSource, EXPORT_MIME,
};
