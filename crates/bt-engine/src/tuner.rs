//! Bayesian hyperparameter search followed by a final full-data fit.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use bt_optimizer::{
    ObjectiveDirection, OptimizationConfig, OptimizationStatus, StrategyKind, Study,
    TrialFailurePolicy, TrialOutcome, TrialResult,
};
use bt_types::{
    config_error, BoosterSettings, BtError, BtResult, Dataset, HyperParams, SearchError, TrainingError,
};

use crate::booster::GradientBoostedClassifier;
use crate::evaluator::ObjectiveEvaluator;
use crate::params::{hyperparameter_space, hyperparams_from_proposal};

/// Run-level knobs for [`Tuner`]. Missing fields in a JSON config take their
/// default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Trial budget.
    pub n_trials: usize,
    /// Random trials before the Gaussian process guides proposals.
    pub n_startup_trials: usize,
    /// Acquisition candidates scored per guided proposal.
    pub n_candidates: usize,
    pub seed: u64,
    pub n_splits: usize,
    /// Boosting rounds, both as the CV cap and for the final model.
    pub n_estimators: usize,
    /// Early-stopping patience during cross-validation.
    pub early_stopping_rounds: Option<usize>,
    pub max_bin: usize,
    pub failure_policy: TrialFailurePolicy,
    pub parallel_folds: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            n_trials: 15,
            n_startup_trials: 5,
            n_candidates: 1000,
            seed: 42,
            n_splits: 3,
            n_estimators: 500,
            early_stopping_rounds: Some(30),
            max_bin: 256,
            failure_policy: TrialFailurePolicy::Abort,
            parallel_folds: false,
        }
    }
}

impl TunerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> BtResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_splits(mut self, n: usize) -> Self {
        self.n_splits = n;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_early_stopping(mut self, rounds: Option<usize>) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    pub fn with_max_bin(mut self, max_bin: usize) -> Self {
        self.max_bin = max_bin;
        self
    }

    pub fn with_failure_policy(mut self, policy: TrialFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel_folds = parallel;
        self
    }

    pub fn validate(&self) -> BtResult<()> {
        if self.n_trials == 0 {
            return Err(SearchError::InvalidTrialBudget { budget: self.n_trials }.into());
        }
        if self.n_splits < 2 {
            return Err(config_error!("n_splits must be at least 2, got {}", self.n_splits));
        }
        if self.n_candidates == 0 {
            return Err(config_error!("n_candidates must be positive"));
        }
        // Booster settings come from this config, so report them as config errors.
        self.booster_settings().validate().map_err(|err| match err {
            BtError::Training(TrainingError::InvalidSettings { message }) => BtError::Config(message),
            other => other,
        })
    }

    /// Training settings used inside cross-validation.
    pub fn booster_settings(&self) -> BoosterSettings {
        BoosterSettings::default()
            .with_seed(self.seed)
            .with_n_estimators(self.n_estimators)
            .with_early_stopping(self.early_stopping_rounds)
            .with_max_bin(self.max_bin)
    }
}

/// Everything a tuning run produced.
#[derive(Debug, Clone)]
pub struct TuningOutcome {
    pub model: GradientBoostedClassifier,
    pub best_params: HyperParams,
    pub best_trial: TrialResult,
    pub status: OptimizationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Tuner {
    config: TunerConfig,
}

impl Tuner {
    pub fn new(config: TunerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Search for the best hyperparameters on `dataset`, then refit on all
    /// rows with early stopping disabled.
    pub fn run(&self, dataset: &Dataset) -> BtResult<TuningOutcome> {
        self.config.validate()?;
        let settings = self.config.booster_settings();
        let evaluator = ObjectiveEvaluator::new(dataset, self.config.n_splits, settings.clone())?
            .with_parallel_folds(self.config.parallel_folds);

        let counts = dataset.class_counts();
        info!(
            rows = dataset.n_rows(),
            features = dataset.n_features(),
            positives = counts.positive,
            trials = self.config.n_trials,
            folds = evaluator.n_folds(),
            "starting hyperparameter search"
        );

        let optimization = OptimizationConfig::new("boostune".to_string(), hyperparameter_space(), StrategyKind::Bayesian)
            .with_max_trials(self.config.n_trials)
            .with_startup_trials(self.config.n_startup_trials)
            .with_candidates(self.config.n_candidates)
            .with_seed(self.config.seed)
            .with_objective("auc", ObjectiveDirection::Maximize);
        let mut study = Study::new(optimization)?.with_failure_policy(self.config.failure_policy);

        let best_trial = study.optimize(|trial| {
            let score = evaluator.evaluate_proposal(&trial.parameters)?;
            Ok(score
                .fold_aucs
                .iter()
                .enumerate()
                .fold(TrialOutcome::new(score.mean_auc), |outcome, (i, auc)| {
                    outcome.with_metric(format!("fold_{i}_auc"), *auc)
                }))
        })?;

        let best_params = hyperparams_from_proposal(&best_trial.parameters)?;
        info!(
            best_auc = best_trial.objective,
            trial = best_trial.trial_number + 1,
            failed_trials = study.status().trials_failed,
            params = %best_params,
            "selected hyperparameters"
        );

        let model = GradientBoostedClassifier::fit(dataset, &best_params, &settings.for_final_fit())?;
        info!(
            trees = model.n_trees(),
            rows = model.n_training_rows(),
            "final model trained"
        );

        Ok(TuningOutcome {
            model,
            best_params,
            best_trial,
            status: study.into_status(),
        })
    }
}

/// Tune with `n_trials` trials and default settings, returning only the final
/// model.
pub fn train_final_model(dataset: &Dataset, n_trials: usize) -> BtResult<GradientBoostedClassifier> {
    Tuner::new(TunerConfig::default().with_n_trials(n_trials))
        .run(dataset)
        .map(|outcome| outcome.model)
}
