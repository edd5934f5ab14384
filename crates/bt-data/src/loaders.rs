use std::io::Read;
use std::path::Path;

use bt_types::{BtResult, DataError, Dataset};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

/// Name of the label column when none is configured.
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// Feature rows read from a CSV without (or ignoring) a label column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Loads headered CSV files into a [`Dataset`].
///
/// Every column except the label column is a numeric feature. Empty cells and
/// `NaN`/`NA`/`null` are read as missing (`NaN`).
#[derive(Debug, Clone)]
pub struct CsvLoader {
    label_column: String,
    delimiter: u8,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self {
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            delimiter: b',',
        }
    }

    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Load a labelled dataset from a CSV file.
    pub fn load<P: AsRef<Path>>(&self, file_path: P) -> BtResult<Dataset> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV dataset from: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to open CSV file {}: {}", path.display(), e),
        })?;
        let dataset = self.load_from_reader(file)?;

        let counts = dataset.class_counts();
        tracing::info!(
            "Loaded {} rows x {} features ({} positive, {} negative)",
            dataset.n_rows(),
            dataset.n_features(),
            counts.positive,
            counts.negative
        );
        Ok(dataset)
    }

    /// Load a labelled dataset from any reader producing CSV text.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> BtResult<Dataset> {
        let mut rdr = self.reader(reader);
        let headers = read_headers(&mut rdr)?;
        let label_idx = headers
            .iter()
            .position(|h| h == self.label_column)
            .ok_or_else(|| DataError::ColumnNotFound {
                column: self.label_column.clone(),
            })?;
        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut values = Vec::new();
        let mut labels = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", row + 2, e),
            })?;
            check_width(&record, headers.len(), row)?;

            for (i, field) in record.iter().enumerate() {
                if i == label_idx {
                    labels.push(parse_label(field, row)?);
                } else {
                    values.push(parse_feature(field, &headers[i], row)?);
                }
            }
        }

        Dataset::from_row_major(feature_names, values, labels)
    }

    /// Read feature rows for prediction. A label column, if present, is
    /// skipped.
    pub fn load_features<P: AsRef<Path>>(&self, file_path: P) -> BtResult<FeatureTable> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV features from: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to open CSV file {}: {}", path.display(), e),
        })?;
        let mut rdr = self.reader(file);
        let headers = read_headers(&mut rdr)?;
        let label_idx = headers.iter().position(|h| h == self.label_column);
        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != label_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", row + 2, e),
            })?;
            check_width(&record, headers.len(), row)?;
            let values = record
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != label_idx)
                .map(|(i, field)| parse_feature(field, &headers[i], row))
                .collect::<BtResult<Vec<f64>>>()?;
            rows.push(values);
        }

        if rows.is_empty() {
            return Err(DataError::Empty.into());
        }
        tracing::info!("Loaded {} feature rows", rows.len());
        Ok(FeatureTable {
            feature_names,
            rows,
        })
    }

    fn reader<R: Read>(&self, reader: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader)
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a dataset as CSV with its feature names and a trailing label column.
/// Missing values are written as empty cells.
pub fn write_csv<P: AsRef<Path>>(file_path: P, dataset: &Dataset, label_column: &str) -> BtResult<()> {
    let path = file_path.as_ref();
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to create CSV file {}: {}", path.display(), e),
        })?;

    let mut header: Vec<&str> = dataset.feature_names().iter().map(String::as_str).collect();
    header.push(label_column);
    wtr.write_record(&header).map_err(write_failed)?;

    for (row, values) in dataset.rows().enumerate() {
        let mut record: Vec<String> = values.iter().map(|v| format_value(*v)).collect();
        record.push(dataset.label(row).to_string());
        wtr.write_record(&record).map_err(write_failed)?;
    }
    wtr.flush()?;

    tracing::info!("Wrote {} rows to {}", dataset.n_rows(), path.display());
    Ok(())
}

/// Write one probability per row under a `probability` header.
pub fn write_predictions<P: AsRef<Path>>(file_path: P, probabilities: &[f64]) -> BtResult<()> {
    let path = file_path.as_ref();
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to create CSV file {}: {}", path.display(), e),
        })?;
    wtr.write_record(["probability"]).map_err(write_failed)?;
    for p in probabilities {
        wtr.write_record([p.to_string()]).map_err(write_failed)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_failed(e: csv::Error) -> DataError {
    DataError::LoadingFailed {
        message: format!("Failed to write CSV record: {}", e),
    }
}

fn read_headers<R: Read>(rdr: &mut csv::Reader<R>) -> BtResult<StringRecord> {
    let headers = rdr
        .headers()
        .map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to read CSV headers: {}", e),
        })?
        .clone();
    if headers.is_empty() {
        return Err(DataError::ParseError {
            message: "CSV file has no header row".to_string(),
        }
        .into());
    }
    tracing::debug!("CSV headers: {:?}", headers);
    Ok(headers)
}

fn check_width(record: &StringRecord, expected: usize, row: usize) -> BtResult<()> {
    if record.len() != expected {
        return Err(DataError::RaggedRow {
            row,
            expected,
            actual: record.len(),
        }
        .into());
    }
    Ok(())
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Parse a feature cell; missing markers become `NaN`.
fn parse_feature(value_str: &str, column: &str, row: usize) -> BtResult<f64> {
    if value_str.is_empty() || is_missing_marker(value_str) {
        return Ok(f64::NAN);
    }
    value_str.parse::<f64>().map_err(|e| {
        DataError::ParseError {
            message: format!(
                "Could not parse {} value '{}' at row {}: {}",
                column, value_str, row, e
            ),
        }
        .into()
    })
}

fn is_missing_marker(value_str: &str) -> bool {
    matches!(
        value_str.to_ascii_lowercase().as_str(),
        "nan" | "na" | "null" | "none"
    )
}

/// Parse a binary label cell: `0`/`1`, `0.0`/`1.0` or `true`/`false`.
fn parse_label(value_str: &str, row: usize) -> BtResult<u8> {
    match value_str.to_ascii_lowercase().as_str() {
        "0" | "false" => return Ok(0),
        "1" | "true" => return Ok(1),
        _ => {}
    }
    match value_str.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(DataError::NonBinaryLabel {
            row,
            value: value_str.to_string(),
        }
        .into()),
    }
}
