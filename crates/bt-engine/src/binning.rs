//! Quantile binning of feature columns for histogram split finding.
//!
//! Each feature gets an ascending list of cut points. A value lands in bin
//! `b` = number of cuts `<= value`, so "bin <= b" is equivalent to
//! "value < cuts[b]" and a split after bin `b` can be stored in the tree as
//! the raw threshold `cuts[b]`.

use bt_types::Dataset;

/// Bin index reserved for missing (`NaN`) values.
pub const MISSING_BIN: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBinner {
    cuts: Vec<Vec<f64>>,
}

impl FeatureBinner {
    /// Compute at most `max_bin` bins per feature from the dataset's
    /// non-missing values.
    pub fn fit(dataset: &Dataset, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, MISSING_BIN as usize);
        let cuts = (0..dataset.n_features())
            .map(|feature| {
                let values: Vec<f64> = dataset
                    .rows()
                    .map(|row| row[feature])
                    .filter(|v| !v.is_nan())
                    .collect();
                quantile_cuts(values, max_bin)
            })
            .collect();
        Self { cuts }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    /// Number of non-missing bins for `feature`.
    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    /// Raw threshold separating bins `..=bin` from `bin + 1..`.
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }

    pub fn bin_value(&self, feature: usize, value: f64) -> u16 {
        if value.is_nan() {
            return MISSING_BIN;
        }
        self.cuts[feature].partition_point(|&c| c <= value) as u16
    }

    pub fn transform(&self, dataset: &Dataset) -> BinnedMatrix {
        let n_features = self.n_features();
        let mut bins = Vec::with_capacity(dataset.n_rows() * n_features);
        for row in dataset.rows() {
            bins.extend(
                row.iter()
                    .enumerate()
                    .map(|(feature, &v)| self.bin_value(feature, v)),
            );
        }
        BinnedMatrix {
            bins,
            n_rows: dataset.n_rows(),
            n_features,
        }
    }
}

/// Row-major matrix of bin indices.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Vec<u16>,
    n_rows: usize,
    n_features: usize,
}

impl BinnedMatrix {
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> u16 {
        self.bins[row * self.n_features + feature]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[u16] {
        let start = row * self.n_features;
        &self.bins[start..start + self.n_features]
    }
}

fn quantile_cuts(mut values: Vec<f64>, max_bin: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    values.sort_by(f64::total_cmp);

    let mut distinct = values.clone();
    distinct.dedup();
    if distinct.len() <= max_bin {
        return distinct
            .windows(2)
            .map(|w| {
                let mid = 0.5 * (w[0] + w[1]);
                // Adjacent floats can round the midpoint down onto w[0].
                if mid <= w[0] {
                    w[1]
                } else {
                    mid
                }
            })
            .collect();
    }

    let n = values.len();
    let min = values[0];
    let mut cuts: Vec<f64> = Vec::with_capacity(max_bin - 1);
    for k in 1..max_bin {
        let candidate = values[k * n / max_bin];
        if candidate > min && cuts.last().map_or(true, |&last| candidate > last) {
            cuts.push(candidate);
        }
    }
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Dataset {
        let labels = (0..values.len()).map(|i| (i % 2) as u8).collect();
        Dataset::from_row_major(vec!["x".into()], values.to_vec(), labels).unwrap()
    }

    #[test]
    fn few_distinct_values_use_midpoints() {
        let binner = FeatureBinner::fit(&column(&[1.0, 3.0, 3.0, 5.0, f64::NAN]), 256);
        assert_eq!(binner.n_bins(0), 3);
        assert_eq!(binner.threshold(0, 0), 2.0);
        assert_eq!(binner.threshold(0, 1), 4.0);
        assert_eq!(binner.bin_value(0, 1.0), 0);
        assert_eq!(binner.bin_value(0, 3.0), 1);
        assert_eq!(binner.bin_value(0, 5.0), 2);
        assert_eq!(binner.bin_value(0, f64::NAN), MISSING_BIN);
    }

    #[test]
    fn many_values_respect_max_bin() {
        let values: Vec<f64> = (0..10_000).map(|i| (i as f64).sqrt()).collect();
        let binner = FeatureBinner::fit(&column(&values), 16);
        assert!(binner.n_bins(0) <= 16);
        assert!(binner.n_bins(0) >= 8);
    }

    #[test]
    fn bin_order_matches_threshold() {
        let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 * 0.5).collect();
        let binner = FeatureBinner::fit(&column(&values), 10);
        for bin in 0..binner.n_bins(0) - 1 {
            let threshold = binner.threshold(0, bin);
            for &v in &values {
                assert_eq!(binner.bin_value(0, v) as usize <= bin, v < threshold);
            }
        }
    }

    #[test]
    fn constant_and_all_missing_columns_have_one_bin() {
        let binner = FeatureBinner::fit(&column(&[2.0, 2.0, 2.0]), 256);
        assert_eq!(binner.n_bins(0), 1);
        let binner = FeatureBinner::fit(&column(&[f64::NAN, f64::NAN]), 256);
        assert_eq!(binner.n_bins(0), 1);
    }

    #[test]
    fn transform_is_row_major() {
        let dataset = Dataset::from_row_major(
            vec!["a".into(), "b".into()],
            vec![0.0, 10.0, 1.0, f64::NAN, 2.0, 30.0],
            vec![0, 1, 0],
        )
        .unwrap();
        let binner = FeatureBinner::fit(&dataset, 256);
        let matrix = binner.transform(&dataset);
        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(matrix.row(0), &[0, 0]);
        assert_eq!(matrix.get(1, 1), MISSING_BIN);
        assert_eq!(matrix.get(2, 0), 2);
        assert_eq!(matrix.get(2, 1), 1);
    }
}
