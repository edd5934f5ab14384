//! Search space definitions and parameter sweep strategies.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use bt_types::{BtResult, SearchError};

use crate::gp::{expected_improvement, GaussianProcess};
use crate::trial::ObjectiveDirection;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
}

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            Self::Int(v) => *v as f64,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// One proposed point: parameter name to value.
pub type ParameterSet = HashMap<String, ParameterValue>;

impl ParameterDef {
    fn validate(&self) -> BtResult<()> {
        let invalid = |message: String| -> BtResult<()> {
            Err(SearchError::InvalidRange {
                parameter: self.name.clone(),
                message,
            }
            .into())
        };
        match self.kind {
            ParameterKind::FloatRange { low, high } => {
                if !(low.is_finite() && high.is_finite() && low < high) {
                    return invalid(format!("expected finite low < high, got [{low}, {high}]"));
                }
            }
            ParameterKind::IntRange { low, high } => {
                if low > high {
                    return invalid(format!("expected low <= high, got [{low}, {high}]"));
                }
            }
            ParameterKind::LogUniform { low, high } => {
                if !(low > 0.0 && high.is_finite() && low < high) {
                    return invalid(format!("expected 0 < low < high, got [{low}, {high}]"));
                }
            }
        }
        Ok(())
    }

    /// Draw one value uniformly (log-uniformly for `LogUniform`).
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self.kind {
            ParameterKind::FloatRange { low, high } => ParameterValue::Float(rng.gen_range(low..=high)),
            ParameterKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(low..=high)),
            ParameterKind::LogUniform { low, high } => {
                let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(low, high))
            }
        }
    }

    /// Map a value onto [0, 1] (in log-space for `LogUniform`).
    pub fn to_unit(&self, value: &ParameterValue) -> f64 {
        let v = value.as_f64();
        let unit = match self.kind {
            ParameterKind::FloatRange { low, high } => (v - low) / (high - low),
            ParameterKind::IntRange { low, high } => {
                if high == low {
                    0.5
                } else {
                    (v - low as f64) / (high - low) as f64
                }
            }
            ParameterKind::LogUniform { low, high } => (v.ln() - low.ln()) / (high.ln() - low.ln()),
        };
        unit.clamp(0.0, 1.0)
    }

    /// Inverse of [`ParameterDef::to_unit`]; integers are rounded.
    pub fn from_unit(&self, unit: f64) -> ParameterValue {
        let t = unit.clamp(0.0, 1.0);
        match self.kind {
            ParameterKind::FloatRange { low, high } => ParameterValue::Float(low + t * (high - low)),
            ParameterKind::IntRange { low, high } => {
                let v = (low as f64 + t * (high - low) as f64).round() as i64;
                ParameterValue::Int(v.clamp(low, high))
            }
            ParameterKind::LogUniform { low, high } => {
                let v = (low.ln() + t * (high.ln() - low.ln())).exp();
                ParameterValue::Float(v.clamp(low, high))
            }
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn dimensions(&self) -> usize {
        self.parameters.len()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Reject empty spaces and malformed ranges.
    pub fn validate(&self) -> BtResult<()> {
        if self.parameters.is_empty() {
            return Err(SearchError::EmptySearchSpace.into());
        }
        for param in &self.parameters {
            param.validate()?;
        }
        Ok(())
    }

    /// Project a parameter set onto the unit hypercube, in declaration order.
    /// Returns `None` if a parameter is missing.
    pub fn to_unit_vector(&self, params: &ParameterSet) -> Option<Vec<f64>> {
        self.parameters
            .iter()
            .map(|p| params.get(&p.name).map(|v| p.to_unit(v)))
            .collect()
    }

    pub fn from_unit_vector(&self, unit: &[f64]) -> ParameterSet {
        self.parameters
            .iter()
            .zip(unit)
            .map(|(p, &u)| (p.name.clone(), p.from_unit(u)))
            .collect()
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> ParameterSet {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet>;

    /// Report completed trial results so adaptive strategies can learn.
    fn report(&mut self, _params: &ParameterSet, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet> {
        (0..count).map(|_| self.space.sample(&mut self.rng)).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search ----

const DEFAULT_STARTUP_TRIALS: usize = 5;
const DEFAULT_CANDIDATES: usize = 1000;
const NOISE_VARIANCE: f64 = 1e-6;
/// Exploration margin subtracted from the incumbent in EI.
const EI_XI: f64 = 0.01;
/// Share of acquisition candidates drawn as perturbations of the incumbent.
const LOCAL_CANDIDATE_FRACTION: f64 = 0.25;
/// Perturbation half-width, as a fraction of each unit dimension.
const LOCAL_PERTURBATION: f64 = 0.1;

/// Sequential model-based optimization with a Gaussian-process surrogate.
///
/// The first `n_startup_trials` suggestions are uniform random samples. After
/// that, each suggestion maximizes Expected Improvement under a GP fitted to
/// every reported observation. Candidates for the acquisition maximization are
/// a mix of uniform samples over the unit hypercube and perturbations of the
/// best point observed so far.
///
/// Observations are stored in unit-hypercube coordinates with the objective
/// sign-flipped for minimization, so the GP always maximizes.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
    direction: ObjectiveDirection,
    n_startup_trials: usize,
    n_candidates: usize,
    observations: Vec<(Vec<f64>, f64)>,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
            direction: ObjectiveDirection::Maximize,
            n_startup_trials: DEFAULT_STARTUP_TRIALS,
            n_candidates: DEFAULT_CANDIDATES,
            observations: Vec::new(),
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n.max(1);
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Pure exploration sample.
    fn explore(&mut self) -> ParameterSet {
        self.space.sample(&mut self.rng)
    }

    /// Incumbent (best observed point) in unit coordinates.
    fn incumbent(&self) -> Option<&[f64]> {
        self.observations
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(x, _)| x.as_slice())
    }

    /// Candidate maximizing EI under a freshly fitted GP, or `None` when the
    /// surrogate cannot be fitted.
    fn exploit(&mut self) -> Option<ParameterSet> {
        let (xs, ys): (Vec<Vec<f64>>, Vec<f64>) = self.observations.iter().cloned().unzip();
        let gp = GaussianProcess::fit(&xs, &ys, NOISE_VARIANCE)?;
        let best = gp.best_observed();
        let dims = self.space.dimensions();
        let incumbent = self.incumbent().map(<[f64]>::to_vec);
        let n_local = match incumbent {
            Some(_) => (self.n_candidates as f64 * LOCAL_CANDIDATE_FRACTION) as usize,
            None => 0,
        };

        let mut best_candidate: Option<(Vec<f64>, f64)> = None;
        for i in 0..self.n_candidates {
            let candidate: Vec<f64> = match (&incumbent, i < n_local) {
                (Some(center), true) => center
                    .iter()
                    .map(|c| {
                        (c + self.rng.gen_range(-LOCAL_PERTURBATION..LOCAL_PERTURBATION))
                            .clamp(0.0, 1.0)
                    })
                    .collect(),
                _ => (0..dims).map(|_| self.rng.gen::<f64>()).collect(),
            };
            // Snap to representable values so integer dimensions are scored
            // where they will actually be evaluated.
            let snapped = self.snap(&candidate);
            let (mean, std) = gp.predict(&snapped);
            let ei = expected_improvement(mean, std, best, EI_XI);
            if best_candidate.as_ref().map_or(true, |(_, b)| ei > *b) {
                best_candidate = Some((snapped, ei));
            }
        }

        best_candidate.map(|(x, ei)| {
            debug!(expected_improvement = ei, "bayesian search proposal");
            self.space.from_unit_vector(&x)
        })
    }

    fn snap(&self, unit: &[f64]) -> Vec<f64> {
        self.space
            .parameters
            .iter()
            .zip(unit)
            .map(|(p, &u)| p.to_unit(&p.from_unit(u)))
            .collect()
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet> {
        (0..count)
            .map(|_| {
                if self.observations.len() < self.n_startup_trials {
                    return self.explore();
                }
                match self.exploit() {
                    Some(params) => params,
                    None => {
                        warn!("gaussian process fit failed, falling back to random sample");
                        self.explore()
                    }
                }
            })
            .collect()
    }

    fn report(&mut self, params: &ParameterSet, objective: f64) {
        if !objective.is_finite() {
            warn!(objective, "ignoring non-finite objective");
            return;
        }
        let Some(x) = self.space.to_unit_vector(params) else {
            warn!("ignoring observation with missing parameters");
            return;
        };
        let y = match self.direction {
            ObjectiveDirection::Maximize => objective,
            ObjectiveDirection::Minimize => -objective,
        };
        self.observations.push((x, y));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("max_depth", 3, 10)
            .add_float("subsample", 0.6, 1.0)
            .add_log_uniform("lambda", 1e-3, 10.0)
    }

    fn quadratic(params: &ParameterSet) -> f64 {
        let x = params["subsample"].as_f64();
        let d = params["max_depth"].as_f64();
        -(x - 0.8).powi(2) - 0.01 * (d - 6.0).powi(2)
    }

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(sample_space(), 7);
        let suggestions = rs.suggest(50);
        assert_eq!(suggestions.len(), 50);

        for params in &suggestions {
            match params.get("max_depth") {
                Some(ParameterValue::Int(v)) => assert!(*v >= 3 && *v <= 10),
                other => panic!("unexpected max_depth value: {other:?}"),
            }
            match params.get("subsample") {
                Some(ParameterValue::Float(v)) => assert!(*v >= 0.6 && *v <= 1.0),
                other => panic!("unexpected subsample value: {other:?}"),
            }
        }
    }

    #[test]
    fn random_search_is_seeded() {
        let a = RandomSearch::new(sample_space(), 42).suggest(5);
        let b = RandomSearch::new(sample_space(), 42).suggest(5);
        assert_eq!(a, b);
    }

    #[test]
    fn log_uniform_stays_in_bounds() {
        let space = SearchSpace::new().add_log_uniform("alpha", 1e-3, 10.0);
        let mut rs = RandomSearch::new(space, 1);
        for params in &rs.suggest(200) {
            match params.get("alpha") {
                Some(ParameterValue::Float(v)) => {
                    assert!(*v >= 1e-3 && *v <= 10.0, "alpha out of bounds: {v}");
                }
                other => panic!("unexpected alpha value: {other:?}"),
            }
        }
    }

    #[test]
    fn unit_mapping_round_trips_through_log_scale() {
        let def = ParameterDef {
            name: "lambda".into(),
            kind: ParameterKind::LogUniform {
                low: 1e-3,
                high: 10.0,
            },
        };
        let mid = def.from_unit(0.5);
        assert!((mid.as_f64() - 0.1).abs() < 1e-9);
        assert!((def.to_unit(&mid) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn int_unit_mapping_rounds() {
        let def = ParameterDef {
            name: "max_depth".into(),
            kind: ParameterKind::IntRange { low: 3, high: 10 },
        };
        assert_eq!(def.from_unit(0.0), ParameterValue::Int(3));
        assert_eq!(def.from_unit(1.0), ParameterValue::Int(10));
        assert_eq!(def.from_unit(0.49), ParameterValue::Int(6));
    }

    #[test]
    fn space_validation() {
        assert!(sample_space().validate().is_ok());
        assert!(SearchSpace::new().validate().is_err());
        assert!(SearchSpace::new().add_float("x", 1.0, 0.0).validate().is_err());
        assert!(SearchSpace::new()
            .add_log_uniform("x", 0.0, 1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn bayesian_search_starts_with_exploration() {
        let mut bs = BayesianSearch::new(sample_space(), 42).with_startup_trials(3);
        let suggestions = bs.suggest(10);
        assert_eq!(suggestions.len(), 10);
        assert_eq!(bs.n_observations(), 0);
    }

    #[test]
    fn bayesian_search_stays_in_bounds_after_reports() {
        let mut bs = BayesianSearch::new(sample_space(), 42)
            .with_startup_trials(3)
            .with_candidates(200);

        for _ in 0..8 {
            let params = bs.suggest(1).remove(0);
            let score = quadratic(&params);
            bs.report(&params, score);
        }
        assert_eq!(bs.n_observations(), 8);

        for params in &bs.suggest(5) {
            match params.get("max_depth") {
                Some(ParameterValue::Int(v)) => assert!(*v >= 3 && *v <= 10),
                other => panic!("unexpected max_depth value: {other:?}"),
            }
            let lambda = params["lambda"].as_f64();
            assert!((1e-3..=10.0).contains(&lambda));
        }
    }

    #[test]
    fn bayesian_search_is_deterministic_for_a_seed() {
        let run = || {
            let mut bs = BayesianSearch::new(sample_space(), 11)
                .with_startup_trials(2)
                .with_candidates(100);
            let mut proposals = Vec::new();
            for _ in 0..5 {
                let params = bs.suggest(1).remove(0);
                bs.report(&params, quadratic(&params));
                proposals.push(params);
            }
            proposals
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn non_finite_reports_are_ignored() {
        let mut bs = BayesianSearch::new(sample_space(), 1);
        let params = bs.suggest(1).remove(0);
        bs.report(&params, f64::NAN);
        assert_eq!(bs.n_observations(), 0);
    }
}
