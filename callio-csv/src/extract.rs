use std::fs::File;
use std::io::Read;
use std::path::Path;

use callio_core::CallioError;

use crate::csv_error;
use crate::selection::{ColumnSelection, RowRange};

/// One retained row reduced to the text sent to the model. `index` is the
/// row's position among retained rows and fixes its place in the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptRow {
    pub index: usize,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub columns: ColumnSelection,
    pub range: RowRange,
    pub separator: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    /// Retained data rows, in input order.
    pub rows: Vec<Vec<String>>,
    /// One prompt per retained row, same order as `rows`.
    pub prompts: Vec<PromptRow>,
}

impl ExtractedTable {
    pub fn prompt_texts(&self) -> impl Iterator<Item = &str> {
        self.prompts.iter().map(|prompt| prompt.text.as_str())
    }
}

pub fn extract(path: &Path, options: &ExtractOptions) -> Result<ExtractedTable, CallioError> {
    let file = File::open(path).map_err(|source| CallioError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let table = extract_from_reader(file, options)?;
    tracing::info!(
        path = %path.display(),
        rows = table.rows.len(),
        columns = %options.columns,
        "extracted prompts"
    );
    Ok(table)
}

pub fn extract_from_reader<R: Read>(
    reader: R,
    options: &ExtractOptions,
) -> Result<ExtractedTable, CallioError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = reader.records();

    let headers = match records.next() {
        Some(record) => record_cells(record.map_err(csv_error)?),
        None => Vec::new(),
    };

    let missing = options.columns.missing_from(headers.len());
    if !missing.is_empty() {
        return Err(CallioError::ColumnNotFound { columns: missing });
    }

    let all_rows = records
        .map(|record| record.map(record_cells).map_err(csv_error))
        .collect::<Result<Vec<_>, _>>()?;

    let range = options.range.resolve(all_rows.len())?;
    let rows = all_rows
        .into_iter()
        .skip(range.start)
        .take(range.len())
        .filter(|row| !is_blank(row))
        .collect::<Vec<_>>();

    let prompts = rows
        .iter()
        .enumerate()
        .map(|(index, row)| PromptRow {
            index,
            text: prompt_text(row, &options.columns, &options.separator),
        })
        .collect();

    Ok(ExtractedTable {
        headers,
        rows,
        prompts,
    })
}

fn record_cells(record: csv::StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.is_empty())
}

/// The single selected value, or every selected value joined with
/// `separator` in selection order. Cells past the end of a ragged row read
/// as empty.
fn prompt_text(row: &[String], columns: &ColumnSelection, separator: &str) -> String {
    columns
        .columns()
        .iter()
        .map(|column| row.get(column.index()).map(String::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(separator)
}
