//! # bt-optimizer
//!
//! Hyperparameter search for Boostune.
//!
//! Provides search space definitions, random and Gaussian-process Bayesian
//! search strategies, trial tracking, and the sequential [`Study`] loop that
//! drives an objective function for a fixed trial budget.

mod gp;
mod search;
mod study;
mod trial;

pub use gp::{expected_improvement, GaussianProcess};
pub use search::{
    BayesianSearch, ParameterDef, ParameterKind, ParameterSet, ParameterValue, RandomSearch,
    SearchSpace, SearchStrategy,
};
pub use study::{Study, TrialFailurePolicy, TrialOutcome};
pub use trial::{
    ObjectiveDirection, OptimizationConfig, OptimizationId, OptimizationState, OptimizationStatus,
    StrategyKind, Trial, TrialResult, TrialStatus,
};
