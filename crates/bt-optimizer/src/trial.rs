//! Trial tracking and optimization run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::search::{BayesianSearch, ParameterSet, RandomSearch, SearchSpace, SearchStrategy};

/// Unique optimization run identifier.
pub type OptimizationId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// True if `candidate` is strictly better than `incumbent`.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ObjectiveDirection::Maximize => candidate > incumbent,
            ObjectiveDirection::Minimize => candidate < incumbent,
        }
    }
}

/// Which search strategy proposes trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    #[default]
    Bayesian,
}

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub id: OptimizationId,
    pub name: String,
    pub description: String,

    /// The parameter search space.
    pub search_space: SearchSpace,

    pub strategy: StrategyKind,

    /// Number of trials to run.
    pub max_trials: usize,

    /// Random trials before the surrogate guides proposals (Bayesian only).
    pub n_startup_trials: usize,

    /// Acquisition candidates scored per proposal (Bayesian only).
    pub n_candidates: usize,

    /// Seed for the strategy's random number generator.
    pub seed: u64,

    /// Metric name being optimized (e.g. "auc").
    pub objective_metric: String,

    /// Direction of optimization.
    pub direction: ObjectiveDirection,

    pub created_at: DateTime<Utc>,
}

impl OptimizationConfig {
    pub fn new(name: String, search_space: SearchSpace, strategy: StrategyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description: String::new(),
            search_space,
            strategy,
            max_trials: 15,
            n_startup_trials: 5,
            n_candidates: 1000,
            seed: 42,
            objective_metric: "auc".to_string(),
            direction: ObjectiveDirection::Maximize,
            created_at: Utc::now(),
        }
    }

    pub fn with_max_trials(mut self, n: usize) -> Self {
        self.max_trials = n;
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

    pub fn with_objective(mut self, metric: &str, direction: ObjectiveDirection) -> Self {
        self.objective_metric = metric.to_string();
        self.direction = direction;
        self
    }

    /// Instantiate the configured search strategy.
    pub fn build_strategy(&self) -> Box<dyn SearchStrategy> {
        match self.strategy {
            StrategyKind::Random => Box::new(RandomSearch::new(self.search_space.clone(), self.seed)),
            StrategyKind::Bayesian => Box::new(
                BayesianSearch::new(self.search_space.clone(), self.seed)
                    .with_direction(self.direction)
                    .with_startup_trials(self.n_startup_trials)
                    .with_candidates(self.n_candidates),
            ),
        }
    }
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub id: OptimizationId,
    pub config: OptimizationConfig,
    pub state: OptimizationState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialResult>,
    /// Best objective after each completed trial.
    pub best_history: Vec<f64>,
    /// Every trial run so far, in execution order.
    pub trials: Vec<Trial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new(config: OptimizationConfig) -> Self {
        Self {
            id: config.id,
            config,
            state: OptimizationState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best_trial: None,
            best_history: Vec::new(),
            trials: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizationState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = OptimizationState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = OptimizationState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Update the best trial if `result` improves on the current best.
    /// Returns true when it did.
    pub fn update_best(&mut self, result: &TrialResult) -> bool {
        let dominated = match &self.best_trial {
            None => true,
            Some(current_best) => self
                .config
                .direction
                .improves(result.objective, current_best.objective),
        };
        if dominated {
            self.best_trial = Some(result.clone());
        }
        dominated
    }

    /// Record a finished trial and fold it into the counters and best-so-far.
    pub fn record(&mut self, trial: Trial) -> bool {
        let mut improved = false;
        match (&trial.status, &trial.result) {
            (TrialStatus::Completed, Some(result)) => {
                self.trials_completed += 1;
                improved = self.update_best(result);
                if let Some(best) = &self.best_trial {
                    self.best_history.push(best.objective);
                }
            }
            _ => self.trials_failed += 1,
        }
        self.trials.push(trial);
        improved
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial (one parameter combination evaluated by the objective).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub optimization_id: OptimizationId,
    pub trial_number: usize,
    pub parameters: ParameterSet,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(optimization_id: OptimizationId, trial_number: usize, parameters: ParameterSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            optimization_id,
            trial_number,
            parameters,
            status: TrialStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Wall-clock milliseconds between start and finish, if both are set.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => u64::try_from((end - start).num_milliseconds()).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    pub objective: f64,
    pub metrics: HashMap<String, f64>,
    pub parameters: ParameterSet,
    pub duration_ms: Option<u64>,
}
