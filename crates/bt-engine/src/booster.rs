//! Gradient-boosted tree classifier.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bt_types::{
    validation_error, BoosterSettings, BtResult, DataError, Dataset, HyperParams, TrainingError,
};

use crate::binning::FeatureBinner;
use crate::grower::{SplitParams, TreeGrower};
use crate::loss::LogisticLoss;
use crate::metrics::roc_auc;
use crate::tree::RegressionTree;

/// Version tag written into saved models.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub n_training_rows: usize,
    /// Boosting rounds actually run (before any truncation).
    pub n_rounds: usize,
    /// Zero-based round with the best validation AUC, when a validation set
    /// was monitored.
    pub best_iteration: Option<usize>,
    pub best_score: Option<f64>,
    pub stopped_early: bool,
    /// Validation AUC after each round.
    pub eval_history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    format_version: u32,
    params: HyperParams,
    settings: BoosterSettings,
    feature_names: Vec<String>,
    base_margin: f64,
    trees: Vec<RegressionTree>,
    report: FitReport,
}

impl GradientBoostedClassifier {
    /// Fit `settings.n_estimators` rounds on the full training set.
    pub fn fit(train: &Dataset, params: &HyperParams, settings: &BoosterSettings) -> BtResult<Self> {
        Self::fit_with_validation(train, None, params, settings)
    }

    /// Fit with an optional validation set. When both a validation set and
    /// `settings.early_stopping_rounds` are given, training stops once
    /// validation AUC has not improved for that many rounds and the ensemble
    /// is truncated to the best round.
    pub fn fit_with_validation(
        train: &Dataset,
        validation: Option<&Dataset>,
        params: &HyperParams,
        settings: &BoosterSettings,
    ) -> BtResult<Self> {
        params.validate()?;
        settings.validate()?;
        if train.n_rows() == 0 {
            return Err(TrainingError::EmptyTrainingSet.into());
        }
        if let Some(valid) = validation {
            if valid.n_features() != train.n_features() {
                return Err(DataError::SchemaMismatch {
                    expected: train.n_features(),
                    actual: valid.n_features(),
                }
                .into());
            }
        }

        let n_rows = train.n_rows();
        let n_features = train.n_features();
        let binner = FeatureBinner::fit(train, settings.max_bin);
        let binned = binner.transform(train);
        let loss = LogisticLoss::new(params.scale_pos_weight);
        let split_params = SplitParams::new(params, settings);
        let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);

        let base_margin = loss.base_margin();
        let mut margins = vec![base_margin; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        let mut valid_margins = validation.map(|v| vec![base_margin; v.n_rows()]);
        let early_stopping = validation.and(settings.early_stopping_rounds);

        let mut trees = Vec::with_capacity(settings.n_estimators);
        let mut eval_history = Vec::new();
        let mut best: Option<(usize, f64)> = None;
        let mut stopped_early = false;

        for round in 0..settings.n_estimators {
            loss.gradients(&margins, train.labels(), &mut grad, &mut hess);
            if grad.iter().chain(hess.iter()).any(|v| !v.is_finite()) {
                return Err(TrainingError::NumericalInstability {
                    message: format!("non-finite gradient at round {round}"),
                }
                .into());
            }

            let rows = sample_indices(&mut rng, n_rows, params.subsample);
            let features = sample_indices(&mut rng, n_features, params.colsample_bytree);
            let tree = TreeGrower::new(&binner, &binned, &grad, &hess, split_params).grow(&rows, &features);

            for (r, margin) in margins.iter_mut().enumerate() {
                *margin += tree.predict_row(train.row(r));
            }

            if let (Some(valid), Some(vm)) = (validation, valid_margins.as_mut()) {
                for (r, margin) in vm.iter_mut().enumerate() {
                    *margin += tree.predict_row(valid.row(r));
                }
                let probabilities: Vec<f64> = vm.iter().map(|&m| LogisticLoss::sigmoid(m)).collect();
                let auc = roc_auc(valid.labels(), &probabilities)?;
                eval_history.push(auc);

                if best.map_or(true, |(_, score)| auc > score) {
                    best = Some((round, auc));
                }
            }
            trees.push(tree);

            if let (Some(patience), Some((best_round, best_score))) = (early_stopping, best) {
                if round - best_round >= patience {
                    debug!(
                        round,
                        best_iteration = best_round,
                        best_auc = best_score,
                        "early stopping"
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        let n_rounds = trees.len();
        debug!(
            rounds = n_rounds,
            train_loss = loss.loss(&margins, train.labels()),
            max_depth = trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            leaves = trees.iter().map(RegressionTree::n_leaves).sum::<usize>(),
            "boosting finished"
        );
        if early_stopping.is_some() {
            if let Some((best_round, _)) = best {
                trees.truncate(best_round + 1);
            }
        }

        let report = FitReport {
            n_training_rows: n_rows,
            n_rounds,
            best_iteration: best.map(|(round, _)| round),
            best_score: best.map(|(_, score)| score),
            stopped_early,
            eval_history,
        };

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            params: *params,
            settings: settings.clone(),
            feature_names: train.feature_names().to_vec(),
            base_margin,
            trees,
            report,
        })
    }

    /// Raw additive score (log-odds) for one row.
    pub fn predict_margin_row(&self, row: &[f64]) -> BtResult<f64> {
        self.check_schema(row.len())?;
        Ok(self.base_margin + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>())
    }

    /// Positive-class probability for one row.
    pub fn predict_proba_row(&self, row: &[f64]) -> BtResult<f64> {
        self.predict_margin_row(row).map(LogisticLoss::sigmoid)
    }

    /// Positive-class probability for each row.
    pub fn predict_proba<R: AsRef<[f64]>>(&self, rows: &[R]) -> BtResult<Vec<f64>> {
        rows.iter().map(|row| self.predict_proba_row(row.as_ref())).collect()
    }

    pub fn predict_proba_dataset(&self, dataset: &Dataset) -> BtResult<Vec<f64>> {
        self.check_schema(dataset.n_features())?;
        dataset.rows().map(|row| self.predict_proba_row(row)).collect()
    }

    /// Hard 0/1 predictions at the given probability threshold.
    pub fn predict<R: AsRef<[f64]>>(&self, rows: &[R], threshold: f64) -> BtResult<Vec<u8>> {
        Ok(self
            .predict_proba(rows)?
            .into_iter()
            .map(|p| u8::from(p >= threshold))
            .collect())
    }

    /// Total split gain per feature, normalized to sum to 1 (all zeros for an
    /// ensemble without splits).
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut gains = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            tree.accumulate_gain(&mut gains);
        }
        let total: f64 = gains.iter().sum();
        if total > 0.0 {
            gains.iter_mut().for_each(|g| *g /= total);
        }
        self.feature_names.iter().cloned().zip(gains).collect()
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn settings(&self) -> &BoosterSettings {
        &self.settings
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn n_training_rows(&self) -> usize {
        self.report.n_training_rows
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.report.best_iteration
    }

    pub fn report(&self) -> &FitReport {
        &self.report
    }

    pub fn to_json(&self) -> BtResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> BtResult<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.check_integrity()?;
        Ok(model)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> BtResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!("Saved model ({} trees) to {}", self.n_trees(), path.as_ref().display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> BtResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: Self = serde_json::from_reader(reader)?;
        model.check_integrity()?;
        tracing::info!("Loaded model ({} trees) from {}", model.n_trees(), path.as_ref().display());
        Ok(model)
    }

    fn check_schema(&self, n_features: usize) -> BtResult<()> {
        if n_features != self.n_features() {
            return Err(DataError::SchemaMismatch {
                expected: self.n_features(),
                actual: n_features,
            }
            .into());
        }
        Ok(())
    }

    fn check_integrity(&self) -> BtResult<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(validation_error!(
                "unsupported model format version {} (expected {})",
                self.format_version,
                MODEL_FORMAT_VERSION
            ));
        }
        if !self.base_margin.is_finite() {
            return Err(validation_error!("model base margin is not finite"));
        }
        let n_features = self.n_features();
        if let Some(idx) = self.trees.iter().position(|t| !t.is_well_formed(n_features)) {
            return Err(validation_error!("tree {} is malformed", idx));
        }
        Ok(())
    }
}

/// Seeded sample of `ceil(n * ratio)` indices without replacement, in
/// ascending order. Returns every index when `ratio >= 1`.
fn sample_indices(rng: &mut ChaCha8Rng, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64 * ratio).ceil() as usize).clamp(1, n.max(1));
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_data::{generate_imbalanced, SyntheticConfig};
    use bt_types::BtError;
    use tempfile::NamedTempFile;

    fn dataset() -> Dataset {
        generate_imbalanced(&SyntheticConfig::new(400, 6, 0.2).with_class_sep(2.0).with_seed(3)).unwrap()
    }

    fn quick_settings() -> BoosterSettings {
        BoosterSettings::default().with_n_estimators(40).with_early_stopping(None)
    }

    #[test]
    fn fits_and_ranks_training_data() {
        let data = dataset();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();

        assert_eq!(model.n_trees(), 40);
        assert_eq!(model.n_training_rows(), 400);
        let probabilities = model.predict_proba_dataset(&data).unwrap();
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(roc_auc(data.labels(), &probabilities).unwrap() > 0.9);
    }

    #[test]
    fn fitting_is_deterministic_under_subsampling() {
        let data = dataset();
        let params = HyperParams {
            subsample: 0.7,
            colsample_bytree: 0.6,
            ..HyperParams::default()
        };
        let a = GradientBoostedClassifier::fit(&data, &params, &quick_settings()).unwrap();
        let b = GradientBoostedClassifier::fit(&data, &params, &quick_settings()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn early_stopping_truncates_to_best_iteration() {
        let data = dataset();
        let (train_idx, valid_idx): (Vec<usize>, Vec<usize>) = (0..data.n_rows()).partition(|i| i % 3 != 0);
        let train = data.subset(&train_idx);
        let valid = data.subset(&valid_idx);
        let settings = BoosterSettings::default().with_n_estimators(300).with_early_stopping(Some(5));
        let params = HyperParams {
            learning_rate: 0.2,
            ..HyperParams::default()
        };

        let model = GradientBoostedClassifier::fit_with_validation(&train, Some(&valid), &params, &settings).unwrap();
        let report = model.report();
        let best = report.best_iteration.unwrap();
        assert_eq!(model.n_trees(), best + 1);
        assert_eq!(report.eval_history.len(), report.n_rounds);
        let max_auc = report.eval_history.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.best_score, Some(max_auc));
        if report.stopped_early {
            assert_eq!(report.n_rounds, best + 5 + 1);
        }
    }

    #[test]
    fn no_early_stopping_without_validation() {
        let data = dataset();
        let settings = BoosterSettings::default().with_n_estimators(25);
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &settings).unwrap();
        assert_eq!(model.n_trees(), 25);
        assert!(model.best_iteration().is_none());
    }

    #[test]
    fn rejects_wrong_row_width() {
        let data = dataset();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();
        let err = model.predict_proba_row(&[0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            BtError::Data(DataError::SchemaMismatch { expected: 6, actual: 3 })
        ));
    }

    #[test]
    fn missing_values_predict() {
        let data = generate_imbalanced(&SyntheticConfig::new(300, 4, 0.3).with_missing_rate(0.1)).unwrap();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();
        let p = model.predict_proba_row(&[f64::NAN; 4]).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        let params = HyperParams {
            max_depth: 42,
            ..HyperParams::default()
        };
        let err = GradientBoostedClassifier::fit(&dataset(), &params, &quick_settings()).unwrap_err();
        assert!(matches!(err, BtError::Training(TrainingError::InvalidHyperParameter { .. })));
    }

    #[test]
    fn feature_importance_is_normalized() {
        let data = dataset();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();
        let importance = model.feature_importance();
        assert_eq!(importance.len(), 6);
        let total: f64 = importance.iter().map(|(_, g)| g).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Informative features (the first four) dominate the noise columns.
        let informative: f64 = importance[..4].iter().map(|(_, g)| g).sum();
        assert!(informative > 0.5);
    }

    #[test]
    fn json_persistence_preserves_predictions() {
        let data = dataset();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();
        let file = NamedTempFile::new().unwrap();
        model.save_json(file.path()).unwrap();

        let loaded = GradientBoostedClassifier::load_json(file.path()).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(
            loaded.predict_proba_dataset(&data).unwrap(),
            model.predict_proba_dataset(&data).unwrap()
        );
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let data = generate_imbalanced(&SyntheticConfig::new(240, 5, 0.1).with_missing_rate(0.05)).unwrap();
        let settings = BoosterSettings::default().with_n_estimators(80).with_early_stopping(None);
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &settings).unwrap();

        let restored = GradientBoostedClassifier::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(restored, model);
        for row in data.rows() {
            let expected = model.predict_proba_row(row).unwrap();
            let actual = restored.predict_proba_row(row).unwrap();
            assert_eq!(actual.to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn corrupt_model_is_rejected() {
        let data = dataset();
        let model = GradientBoostedClassifier::fit(&data, &HyperParams::default(), &quick_settings()).unwrap();
        let json = model.to_json().unwrap().replace(
            &format!("\"format_version\": {}", MODEL_FORMAT_VERSION),
            "\"format_version\": 99",
        );
        assert!(matches!(
            GradientBoostedClassifier::from_json(&json).unwrap_err(),
            BtError::Validation(_)
        ));
    }

    #[test]
    fn sample_indices_sizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(sample_indices(&mut rng, 10, 1.0).len(), 10);
        let s = sample_indices(&mut rng, 10, 0.6);
        assert_eq!(s.len(), 6);
        assert!(s.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_indices(&mut rng, 3, 0.01).len(), 1);
    }
}
