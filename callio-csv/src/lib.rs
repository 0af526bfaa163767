//! Reading prompts out of CSV rows and writing responses back.

mod extract;
mod selection;
mod write;

pub use extract::{extract, extract_from_reader, ExtractOptions, ExtractedTable, PromptRow};
pub use selection::{Column, ColumnSelection, RowBound, RowRange};
pub use write::{output_rows, write_output, write_to, OutputOptions};

use callio_core::CallioError;

pub(crate) fn csv_error(err: csv::Error) -> CallioError {
    if !err.is_io_error() {
        return CallioError::Csv(err.to_string());
    }
    match err.into_kind() {
        csv::ErrorKind::Io(err) => CallioError::Io(err),
        kind => CallioError::Csv(format!("{kind:?}")),
    }
}
