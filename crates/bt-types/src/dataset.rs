//! Immutable binary-classification dataset.

use serde::{Deserialize, Serialize};

use crate::errors::{BtError, BtResult, DataError};

/// Per-class row counts of a label vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub negative: usize,
    pub positive: usize,
}

impl ClassCounts {
    pub fn from_labels(labels: &[u8]) -> Self {
        let positive = labels.iter().filter(|&&l| l == 1).count();
        Self {
            negative: labels.len() - positive,
            positive,
        }
    }

    pub fn total(&self) -> usize {
        self.negative + self.positive
    }

    /// Size of the smaller class.
    pub fn minority(&self) -> usize {
        self.negative.min(self.positive)
    }

    /// Label value of the smaller class (ties resolve to the positive class).
    pub fn minority_class(&self) -> u8 {
        if self.positive <= self.negative {
            1
        } else {
            0
        }
    }

    pub fn has_both_classes(&self) -> bool {
        self.negative > 0 && self.positive > 0
    }

    /// Fraction of positive rows, 0.0 for an empty label vector.
    pub fn positive_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.positive as f64 / self.total() as f64
        }
    }
}

/// Feature matrix X (row-major, named columns) with an aligned binary label
/// vector y.
///
/// `NaN` feature values are treated as missing. Infinite values are rejected
/// at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    feature_names: Vec<String>,
    values: Vec<f64>,
    labels: Vec<u8>,
    n_rows: usize,
    n_features: usize,
}

impl Dataset {
    /// Build a dataset from per-row feature vectors and numeric labels.
    ///
    /// Labels must be exactly `0.0` or `1.0`.
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>, labels: Vec<f64>) -> BtResult<Self> {
        if rows.len() != labels.len() {
            return Err(DataError::RowCountMismatch {
                features: rows.len(),
                labels: labels.len(),
            }
            .into());
        }

        let n_features = feature_names.len();
        let mut values = Vec::with_capacity(rows.len() * n_features);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(DataError::RaggedRow {
                    row: i,
                    expected: n_features,
                    actual: row.len(),
                }
                .into());
            }
            values.extend_from_slice(row);
        }

        let labels = labels
            .iter()
            .enumerate()
            .map(|(row, &value)| binary_label(row, value))
            .collect::<BtResult<Vec<u8>>>()?;

        Self::from_row_major(feature_names, values, labels)
    }

    /// Build a dataset from a flat row-major buffer.
    pub fn from_row_major(
        feature_names: Vec<String>,
        values: Vec<f64>,
        labels: Vec<u8>,
    ) -> BtResult<Self> {
        let n_features = feature_names.len();
        let n_rows = labels.len();

        if n_rows == 0 {
            return Err(DataError::Empty.into());
        }
        if n_features == 0 || values.len() % n_features != 0 {
            return Err(DataError::FeatureNameMismatch {
                names: n_features,
                features: values.len() / n_rows,
            }
            .into());
        }
        if values.len() / n_features != n_rows {
            return Err(DataError::RowCountMismatch {
                features: values.len() / n_features,
                labels: n_rows,
            }
            .into());
        }
        if let Some((row, &value)) = labels.iter().enumerate().find(|(_, &l)| l > 1) {
            return Err(DataError::NonBinaryLabel {
                row,
                value: value.to_string(),
            }
            .into());
        }
        if let Some(pos) = values.iter().position(|v| v.is_infinite()) {
            return Err(DataError::NonFiniteFeature {
                row: pos / n_features,
                feature: feature_names[pos % n_features].clone(),
            }
            .into());
        }

        Ok(Self {
            feature_names,
            values,
            labels,
            n_rows,
            n_features,
        })
    }

    /// Generate `f0, f1, ...` column names.
    pub fn default_feature_names(n_features: usize) -> Vec<String> {
        (0..n_features).map(|i| format!("f{i}")).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn label(&self, row: usize) -> u8 {
        self.labels[row]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.n_features;
        &self.values[start..start + self.n_features]
    }

    pub fn value(&self, row: usize, feature: usize) -> f64 {
        self.values[row * self.n_features + feature]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.n_features)
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(&self.labels)
    }

    /// Copy the given rows into a new dataset with the same schema.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        let mut values = Vec::with_capacity(indices.len() * self.n_features);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            values.extend_from_slice(self.row(i));
            labels.push(self.labels[i]);
        }
        Dataset {
            feature_names: self.feature_names.clone(),
            values,
            labels,
            n_rows: indices.len(),
            n_features: self.n_features,
        }
    }
}

/// Serialized form of [`Dataset`]; decoded through the same checks as
/// [`Dataset::from_row_major`]. Stored dimensions are recomputed.
#[derive(Deserialize)]
struct RawDataset {
    feature_names: Vec<String>,
    values: Vec<f64>,
    labels: Vec<u8>,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = BtError;

    fn try_from(raw: RawDataset) -> BtResult<Self> {
        Dataset::from_row_major(raw.feature_names, raw.values, raw.labels)
    }
}

fn binary_label(row: usize, value: f64) -> BtResult<u8> {
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(DataError::NonBinaryLabel {
            row,
            value: value.to_string(),
        }
        .into())
    }
}
