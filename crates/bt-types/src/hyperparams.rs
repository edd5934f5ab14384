//! Searched hyperparameters and fixed booster settings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{BtResult, TrainingError};

/// Sampling scale of a search dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamScale {
    Linear,
    Log,
}

/// Declared search range of one hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamRange {
    pub name: &'static str,
    pub low: f64,
    pub high: f64,
    pub scale: ParamScale,
    pub integer: bool,
}

impl ParamRange {
    const fn float(name: &'static str, low: f64, high: f64, scale: ParamScale) -> Self {
        Self {
            name,
            low,
            high,
            scale,
            integer: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.low && value <= self.high
    }

    fn check(&self, value: f64) -> BtResult<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(TrainingError::InvalidHyperParameter {
                parameter: self.name.to_string(),
                message: format!("{value} outside [{}, {}]", self.low, self.high),
            }
            .into())
        }
    }
}

pub const SCALE_POS_WEIGHT: ParamRange =
    ParamRange::float("scale_pos_weight", 10.0, 150.0, ParamScale::Linear);
pub const LEARNING_RATE: ParamRange = ParamRange::float("learning_rate", 0.01, 0.2, ParamScale::Linear);
pub const MAX_DEPTH: ParamRange = ParamRange {
    name: "max_depth",
    low: 3.0,
    high: 10.0,
    scale: ParamScale::Linear,
    integer: true,
};
pub const SUBSAMPLE: ParamRange = ParamRange::float("subsample", 0.6, 1.0, ParamScale::Linear);
pub const COLSAMPLE_BYTREE: ParamRange =
    ParamRange::float("colsample_bytree", 0.6, 1.0, ParamScale::Linear);
pub const LAMBDA: ParamRange = ParamRange::float("lambda", 1e-3, 10.0, ParamScale::Log);
pub const ALPHA: ParamRange = ParamRange::float("alpha", 1e-3, 10.0, ParamScale::Log);

/// The seven searched dimensions, in search-space order.
pub const SEARCH_RANGES: [ParamRange; 7] = [
    SCALE_POS_WEIGHT,
    LEARNING_RATE,
    MAX_DEPTH,
    SUBSAMPLE,
    COLSAMPLE_BYTREE,
    LAMBDA,
    ALPHA,
];

/// One concrete point of the hyperparameter search space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Multiplier on gradient and hessian of positive rows.
    pub scale_pos_weight: f64,
    /// Shrinkage applied to every tree's leaf values.
    pub learning_rate: f64,
    pub max_depth: u32,
    /// Fraction of rows sampled (without replacement) per tree.
    pub subsample: f64,
    /// Fraction of features sampled per tree.
    pub colsample_bytree: f64,
    /// L2 regularization on leaf weights.
    #[serde(rename = "lambda")]
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights.
    #[serde(rename = "alpha")]
    pub reg_alpha: f64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            scale_pos_weight: 10.0,
            learning_rate: 0.1,
            max_depth: 6,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 1e-3,
        }
    }
}

impl HyperParams {
    /// Check every field against its declared search range.
    pub fn validate(&self) -> BtResult<()> {
        SCALE_POS_WEIGHT.check(self.scale_pos_weight)?;
        LEARNING_RATE.check(self.learning_rate)?;
        MAX_DEPTH.check(self.max_depth as f64)?;
        SUBSAMPLE.check(self.subsample)?;
        COLSAMPLE_BYTREE.check(self.colsample_bytree)?;
        LAMBDA.check(self.reg_lambda)?;
        ALPHA.check(self.reg_alpha)?;
        Ok(())
    }

    /// `(name, value)` pairs in search-space order.
    pub fn as_pairs(&self) -> [(&'static str, f64); 7] {
        [
            (SCALE_POS_WEIGHT.name, self.scale_pos_weight),
            (LEARNING_RATE.name, self.learning_rate),
            (MAX_DEPTH.name, self.max_depth as f64),
            (SUBSAMPLE.name, self.subsample),
            (COLSAMPLE_BYTREE.name, self.colsample_bytree),
            (LAMBDA.name, self.reg_lambda),
            (ALPHA.name, self.reg_alpha),
        ]
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.as_pairs() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            if name == MAX_DEPTH.name {
                write!(f, "{name}={}", value as u32)?;
            } else {
                write!(f, "{name}={value:.4}")?;
            }
        }
        Ok(())
    }
}

/// Training objective. Only logistic binary classification is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    BinaryLogistic,
}

/// Validation metric used for early stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMetric {
    #[default]
    Auc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoosterKind {
    #[default]
    GbTree,
}

/// Non-searched training settings shared by every fit in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterSettings {
    pub objective: Objective,
    pub eval_metric: EvalMetric,
    pub booster: BoosterKind,
    /// Seed for row and column subsampling.
    pub seed: u64,
    /// Maximum number of boosting rounds.
    pub n_estimators: usize,
    /// Stop after this many rounds without validation improvement.
    /// Ignored when no validation set is supplied.
    pub early_stopping_rounds: Option<usize>,
    /// Maximum number of histogram bins per feature.
    pub max_bin: usize,
    /// Minimum hessian sum in each child of a split.
    pub min_child_weight: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
}

impl Default for BoosterSettings {
    fn default() -> Self {
        Self {
            objective: Objective::BinaryLogistic,
            eval_metric: EvalMetric::Auc,
            booster: BoosterKind::GbTree,
            seed: 42,
            n_estimators: 500,
            early_stopping_rounds: Some(30),
            max_bin: 256,
            min_child_weight: 1.0,
            gamma: 0.0,
        }
    }
}

impl BoosterSettings {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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

    /// Settings for the final full-data fit: same values, no early stopping.
    pub fn for_final_fit(&self) -> Self {
        self.clone().with_early_stopping(None)
    }

    pub fn validate(&self) -> BtResult<()> {
        let invalid = |message: String| -> BtResult<()> {
            Err(TrainingError::InvalidSettings { message }.into())
        };
        if self.n_estimators == 0 {
            return invalid("n_estimators must be positive".into());
        }
        if self.early_stopping_rounds == Some(0) {
            return invalid("early_stopping_rounds must be positive".into());
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bin) {
            return invalid(format!("max_bin must be in [2, {}], got {}", u16::MAX, self.max_bin));
        }
        if !(self.min_child_weight >= 0.0) {
            return invalid("min_child_weight must be non-negative".into());
        }
        if !(self.gamma >= 0.0) {
            return invalid("gamma must be non-negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BtError;

    #[test]
    fn default_params_are_in_range() {
        assert!(HyperParams::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_param_is_rejected() {
        let params = HyperParams {
            learning_rate: 0.5,
            ..Default::default()
        };
        match params.validate() {
            Err(BtError::Training(TrainingError::InvalidHyperParameter { parameter, .. })) => {
                assert_eq!(parameter, "learning_rate");
            }
            other => panic!("expected invalid learning_rate, got {other:?}"),
        }

        let params = HyperParams {
            max_depth: 11,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn search_ranges_match_table() {
        assert_eq!(SEARCH_RANGES.len(), 7);
        assert_eq!(LAMBDA.scale, ParamScale::Log);
        assert_eq!(ALPHA.scale, ParamScale::Log);
        assert!(MAX_DEPTH.integer);
        assert_eq!((SCALE_POS_WEIGHT.low, SCALE_POS_WEIGHT.high), (10.0, 150.0));
    }

    #[test]
    fn serde_uses_xgboost_names() {
        let json = serde_json::to_value(HyperParams::default()).unwrap();
        assert!(json.get("lambda").is_some());
        assert!(json.get("alpha").is_some());
        assert!(json.get("reg_lambda").is_none());
    }

    #[test]
    fn display_lists_all_fields() {
        let text = HyperParams::default().to_string();
        assert!(text.contains("max_depth=6"));
        assert!(text.contains("scale_pos_weight=10.0000"));
    }

    #[test]
    fn settings_defaults_and_final_fit() {
        let settings = BoosterSettings::default();
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.n_estimators, 500);
        assert_eq!(settings.early_stopping_rounds, Some(30));
        assert!(settings.validate().is_ok());
        assert_eq!(settings.for_final_fit().early_stopping_rounds, None);
    }

    #[test]
    fn settings_validation() {
        assert!(BoosterSettings::default().with_n_estimators(0).validate().is_err());
        assert!(BoosterSettings::default().with_max_bin(1).validate().is_err());
        assert!(BoosterSettings::default()
            .with_early_stopping(Some(0))
            .validate()
            .is_err());
    }
}
