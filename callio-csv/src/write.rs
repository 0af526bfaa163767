use std::fs::File;
use std::io::Write;
use std::path::Path;

use callio_core::CallioError;

use crate::csv_error;
use crate::selection::Column;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputOptions {
    pub include_headers: bool,
    /// Write every retained input row with `output_column` replaced by the
    /// response, instead of a single response column.
    pub keep_data: bool,
    pub output_column: Column,
}

/// Builds the output table. `results[i]` belongs to `rows[i]`.
pub fn output_rows(
    headers: &[String],
    rows: &[Vec<String>],
    results: &[String],
    options: &OutputOptions,
) -> Result<Vec<Vec<String>>, CallioError> {
    if rows.len() != results.len() {
        return Err(CallioError::InvalidConfig(format!(
            "{} results for {} retained rows",
            results.len(),
            rows.len()
        )));
    }

    let mut table = Vec::with_capacity(rows.len() + 1);
    if options.include_headers {
        table.push(headers.to_vec());
    }

    if options.keep_data {
        let column = options.output_column.index();
        for (row, result) in rows.iter().zip(results) {
            let mut row = row.clone();
            if column < row.len() {
                row[column] = result.clone();
            } else {
                row.resize(column, String::new());
                row.push(result.clone());
            }
            table.push(row);
        }
    } else {
        table.extend(results.iter().map(|result| vec![result.clone()]));
    }

    Ok(table)
}

pub fn write_to<W: Write>(writer: W, table: &[Vec<String>]) -> Result<(), CallioError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);
    for row in table {
        writer.write_record(row).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_output(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
    results: &[String],
    options: &OutputOptions,
) -> Result<(), CallioError> {
    let table = output_rows(headers, rows, results, options)?;
    let unwritable = |source| CallioError::FileUnwritable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(unwritable)?;
    write_to(file, &table).map_err(|err| match err {
        CallioError::Io(source) => unwritable(source),
        other => other,
    })?;
    tracing::info!(path = %path.display(), rows = results.len(), "wrote output");
    Ok(())
}
