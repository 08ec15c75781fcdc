//! CSV dataset readers with full input validation.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{FeatureDataset, LabeledDataset};

/// Reads a labeled classification dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required, one name per column
/// - One column holds the class label (default: the last column); every
///   other column is a feature
/// - Features parse as finite `f64`, labels as non-negative integers
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingLabelColumn`] | Named label column not in header |
/// | [`IoError::NoFeatureColumns`] | Only the label column is present |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable |
/// | [`IoError::InvalidLabel`] | Label cell is not a non-negative integer |
#[derive(Debug, Clone)]
pub struct LabeledCsvReader {
    path: PathBuf,
    label_column: Option<String>,
}

impl LabeledCsvReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            label_column: None,
        }
    }

    /// Use the column with this header name as the label.
    #[must_use]
    pub fn with_label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = Some(name.into());
        self
    }

    /// Read and validate the CSV file, returning a [`LabeledDataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<LabeledDataset, IoError> {
        let mut rdr = open_csv(&self.path)?;
        let header = read_header(&mut rdr, &self.path)?;
        let expected_cols = header.len();

        let label_index = match &self.label_column {
            Some(name) => header.iter().position(|h| h == name).ok_or_else(|| {
                IoError::MissingLabelColumn {
                    path: self.path.clone(),
                    column: name.clone(),
                }
            })?,
            None => expected_cols.saturating_sub(1),
        };
        if expected_cols < 2 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let label_name = header[label_index].clone();
        let feature_columns: Vec<usize> = (0..expected_cols).filter(|&c| c != label_index).collect();
        let feature_names: Vec<String> = feature_columns.iter().map(|&c| header[c].clone()).collect();
        debug!(expected_cols, label = %label_name, "read CSV header");

        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| csv_error(&self.path, e))?;
            check_row_length(&self.path, row_index, &record, expected_cols)?;

            let raw_label = record.get(label_index).unwrap_or("");
            let label: usize = raw_label
                .trim()
                .parse()
                .map_err(|_| IoError::InvalidLabel {
                    path: self.path.clone(),
                    row_index,
                    raw: raw_label.to_string(),
                })?;

            let row = feature_columns
                .iter()
                .map(|&c| parse_feature(&self.path, row_index, &header[c], record.get(c).unwrap_or("")))
                .collect::<Result<Vec<f64>, IoError>>()?;

            features.push(row);
            labels.push(label);
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            "labeled dataset loaded"
        );

        Ok(LabeledDataset::new(feature_names, label_name, features, labels))
    }
}

/// Reads an unlabeled feature matrix from a CSV file.
///
/// Every column is a feature except an optional skipped column, which is
/// ignored when present (so a labeled file can be fed back for prediction).
///
/// # Errors
///
/// Same as [`LabeledCsvReader`], minus the label-specific variants.
#[derive(Debug, Clone)]
pub struct FeatureCsvReader {
    path: PathBuf,
    skipped_column: Option<String>,
}

impl FeatureCsvReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            skipped_column: None,
        }
    }

    /// Ignore the column with this header name if the file has one.
    #[must_use]
    pub fn with_skipped_column(mut self, name: impl Into<String>) -> Self {
        self.skipped_column = Some(name.into());
        self
    }

    /// Read and validate the CSV file, returning a [`FeatureDataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureDataset, IoError> {
        let mut rdr = open_csv(&self.path)?;
        let header = read_header(&mut rdr, &self.path)?;
        let expected_cols = header.len();

        let feature_columns: Vec<usize> = (0..expected_cols)
            .filter(|&c| self.skipped_column.as_deref() != Some(header[c].as_str()))
            .collect();
        if feature_columns.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names: Vec<String> = feature_columns.iter().map(|&c| header[c].clone()).collect();

        let mut features = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| csv_error(&self.path, e))?;
            check_row_length(&self.path, row_index, &record, expected_cols)?;
            let row = feature_columns
                .iter()
                .map(|&c| parse_feature(&self.path, row_index, &header[c], record.get(c).unwrap_or("")))
                .collect::<Result<Vec<f64>, IoError>>()?;
            features.push(row);
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            "feature dataset loaded"
        );

        Ok(FeatureDataset::new(feature_names, features))
    }
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>, IoError> {
    let file = File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    // flexible(true) so that short rows surface as InconsistentRowLength
    // rather than a low-level CsvParse error.
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file))
}

fn read_header(rdr: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>, IoError> {
    let header = rdr.headers().map_err(|e| csv_error(path, e))?;
    Ok(header.iter().map(String::from).collect())
}

fn csv_error(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

fn check_row_length(
    path: &Path,
    row_index: usize,
    record: &csv::StringRecord,
    expected: usize,
) -> Result<(), IoError> {
    if record.len() != expected {
        return Err(IoError::InconsistentRowLength {
            path: path.to_path_buf(),
            row_index,
            expected,
            got: record.len(),
        });
    }
    Ok(())
}

fn parse_feature(path: &Path, row_index: usize, column: &str, raw: &str) -> Result<f64, IoError> {
    let non_finite = || IoError::NonFiniteValue {
        path: path.to_path_buf(),
        row_index,
        column: column.to_string(),
        raw: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| non_finite())?;
    if !value.is_finite() {
        return Err(non_finite());
    }
    Ok(value)
}
