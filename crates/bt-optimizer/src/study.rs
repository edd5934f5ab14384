//! Sequential optimization loop.
//!
//! A [`Study`] owns the search strategy and the run status. Each iteration
//! asks the strategy for one proposal, evaluates it, and reports the score
//! back before the next proposal is made, so the surrogate always sees every
//! earlier observation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use bt_types::{BtError, BtResult, SearchError};

use crate::search::SearchStrategy;
use crate::trial::{OptimizationConfig, OptimizationStatus, Trial, TrialResult};

/// What to do when the objective fails for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialFailurePolicy {
    /// Propagate the error and stop the study.
    #[default]
    Abort,
    /// Record the trial as failed and continue with the next proposal.
    Skip,
}

/// Objective value of one trial plus any auxiliary metrics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialOutcome {
    pub objective: f64,
    pub metrics: HashMap<String, f64>,
}

impl TrialOutcome {
    pub fn new(objective: f64) -> Self {
        Self {
            objective,
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

pub struct Study {
    status: OptimizationStatus,
    strategy: Box<dyn SearchStrategy>,
    failure_policy: TrialFailurePolicy,
}

impl Study {
    /// Validate the configuration and build its search strategy.
    pub fn new(config: OptimizationConfig) -> BtResult<Self> {
        if config.max_trials == 0 {
            return Err(SearchError::InvalidTrialBudget {
                budget: config.max_trials,
            }
            .into());
        }
        config.search_space.validate()?;
        let strategy = config.build_strategy();
        Ok(Self {
            status: OptimizationStatus::new(config),
            strategy,
            failure_policy: TrialFailurePolicy::Abort,
        })
    }

    pub fn with_failure_policy(mut self, policy: TrialFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    pub fn into_status(self) -> OptimizationStatus {
        self.status
    }

    /// Run `max_trials` trials and return the best one.
    pub fn optimize<F>(&mut self, mut objective: F) -> BtResult<TrialResult>
    where
        F: FnMut(&Trial) -> BtResult<TrialOutcome>,
    {
        let max_trials = self.status.config.max_trials;
        info!(
            study = %self.status.config.name,
            strategy = self.strategy.name(),
            max_trials,
            "starting optimization"
        );
        self.status.mark_running();

        for trial_number in 0..max_trials {
            if let Err(e) = self.run_trial(trial_number, &mut objective) {
                self.status.mark_failed(e.to_string());
                return Err(e);
            }
        }

        match self.status.best_trial.clone() {
            Some(best) => {
                self.status.mark_completed();
                info!(
                    best_trial = best.trial_number,
                    best_objective = best.objective,
                    completed = self.status.trials_completed,
                    failed = self.status.trials_failed,
                    "optimization finished"
                );
                Ok(best)
            }
            None => {
                let err: BtError = SearchError::NoCompletedTrials.into();
                self.status.mark_failed(err.to_string());
                Err(err)
            }
        }
    }

    fn run_trial<F>(&mut self, trial_number: usize, objective: &mut F) -> BtResult<()>
    where
        F: FnMut(&Trial) -> BtResult<TrialOutcome>,
    {
        let max_trials = self.status.config.max_trials;
        let parameters = self
            .strategy
            .suggest(1)
            .pop()
            .ok_or(SearchError::EmptySearchSpace)?;
        let mut trial = Trial::new(self.status.id, trial_number, parameters);
        trial.mark_running();

        let outcome = objective(&trial).and_then(|outcome| {
            if outcome.objective.is_finite() {
                Ok(outcome)
            } else {
                Err(SearchError::TrialFailed {
                    trial_number,
                    message: format!("objective is not finite: {}", outcome.objective),
                }
                .into())
            }
        });

        match outcome {
            Ok(outcome) => {
                self.strategy.report(&trial.parameters, outcome.objective);
                trial.finished_at = Some(chrono::Utc::now());
                let result = TrialResult {
                    trial_id: trial.id,
                    trial_number,
                    objective: outcome.objective,
                    metrics: outcome.metrics,
                    parameters: trial.parameters.clone(),
                    duration_ms: trial.duration_ms(),
                };
                trial.mark_completed(result);
                let objective_value = outcome.objective;
                let improved = self.status.record(trial);
                let best = self
                    .status
                    .best_trial
                    .as_ref()
                    .map_or(objective_value, |b| b.objective);
                info!(
                    trial = trial_number + 1,
                    of = max_trials,
                    objective = objective_value,
                    best,
                    improved,
                    "trial finished"
                );
                Ok(())
            }
            Err(e) if self.failure_policy == TrialFailurePolicy::Skip && !e.is_input_error() => {
                warn!(trial = trial_number + 1, error = %e, "trial failed, skipping");
                trial.mark_failed(e.to_string());
                self.status.record(trial);
                Ok(())
            }
            Err(e) => {
                trial.mark_failed(e.to_string());
                self.status.record(trial);
                Err(e)
            }
        }
    }
}
