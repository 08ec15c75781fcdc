//! I/O error types for thicket-io.

use std::path::PathBuf;

/// Errors from reading and validating dataset files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the header leaves no column to use as a feature.
    #[error("no feature columns in {path}")]
    NoFeatureColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when the requested label column is not in the header.
    #[error("label column \"{column}\" not found in {path}")]
    MissingLabelColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested column name.
        column: String,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a cell value is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Header name of the offending column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a label cell is not a non-negative integer.
    #[error("invalid label in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },
}
