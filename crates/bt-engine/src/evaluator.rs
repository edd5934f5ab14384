//! Cross-validated AUC objective.
//!
//! Folds are computed once per evaluator and reused for every trial, so all
//! trials in a run are scored on identical partitions.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bt_optimizer::ParameterSet;
use bt_types::{BoosterSettings, BtResult, Dataset, HyperParams};

use crate::booster::GradientBoostedClassifier;
use crate::cv::{Fold, StratifiedKFold};
use crate::metrics::roc_auc;
use crate::params::hyperparams_from_proposal;

/// Number of folds used by [`objective`].
pub const DEFAULT_N_SPLITS: usize = 3;

/// Per-fold and mean validation AUC for one hyperparameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScore {
    pub mean_auc: f64,
    pub fold_aucs: Vec<f64>,
    /// Best boosting round per fold when early stopping was active.
    pub best_iterations: Vec<Option<usize>>,
}

struct FoldData {
    index: usize,
    train: Dataset,
    validation: Dataset,
}

pub struct ObjectiveEvaluator {
    folds: Vec<FoldData>,
    settings: BoosterSettings,
    parallel_folds: bool,
}

impl ObjectiveEvaluator {
    /// Split `dataset` into `n_splits` stratified folds shuffled with
    /// `settings.seed`. Degenerate class balance is reported here, before
    /// any model is fitted.
    pub fn new(dataset: &Dataset, n_splits: usize, settings: BoosterSettings) -> BtResult<Self> {
        settings.validate()?;
        let folds = StratifiedKFold::new(n_splits, settings.seed).split(dataset.labels())?;
        let folds = folds
            .into_iter()
            .map(|Fold { index, train, validation }| FoldData {
                index,
                train: dataset.subset(&train),
                validation: dataset.subset(&validation),
            })
            .collect();
        Ok(Self {
            folds,
            settings,
            parallel_folds: false,
        })
    }

    /// Train folds concurrently. Scores are identical to sequential runs.
    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel_folds = parallel;
        self
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    pub fn settings(&self) -> &BoosterSettings {
        &self.settings
    }

    pub fn evaluate(&self, params: &HyperParams) -> BtResult<CvScore> {
        let results: Vec<(f64, Option<usize>)> = if self.parallel_folds {
            self.folds
                .par_iter()
                .map(|fold| self.evaluate_fold(fold, params))
                .collect::<BtResult<_>>()?
        } else {
            self.folds
                .iter()
                .map(|fold| self.evaluate_fold(fold, params))
                .collect::<BtResult<_>>()?
        };

        let (fold_aucs, best_iterations): (Vec<f64>, Vec<Option<usize>>) = results.into_iter().unzip();
        let mean_auc = fold_aucs.iter().sum::<f64>() / fold_aucs.len() as f64;
        Ok(CvScore {
            mean_auc,
            fold_aucs,
            best_iterations,
        })
    }

    pub fn evaluate_proposal(&self, proposal: &ParameterSet) -> BtResult<CvScore> {
        let params = hyperparams_from_proposal(proposal)?;
        self.evaluate(&params)
    }

    fn evaluate_fold(&self, fold: &FoldData, params: &HyperParams) -> BtResult<(f64, Option<usize>)> {
        let model = GradientBoostedClassifier::fit_with_validation(
            &fold.train,
            Some(&fold.validation),
            params,
            &self.settings,
        )?;
        let probabilities = model.predict_proba_dataset(&fold.validation)?;
        let auc = roc_auc(fold.validation.labels(), &probabilities)?;
        debug!(
            fold = fold.index,
            auc,
            best_iteration = ?model.best_iteration(),
            trees = model.n_trees(),
            "fold evaluated"
        );
        Ok((auc, model.best_iteration()))
    }
}

/// Mean 3-fold stratified cross-validated AUC of `proposal` on `dataset`,
/// with the default training settings (seed 42, up to 500 rounds, early
/// stopping after 30 rounds without improvement).
pub fn objective(proposal: &ParameterSet, dataset: &Dataset) -> BtResult<f64> {
    ObjectiveEvaluator::new(dataset, DEFAULT_N_SPLITS, BoosterSettings::default())?
        .evaluate_proposal(proposal)
        .map(|score| score.mean_auc)
}
