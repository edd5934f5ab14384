//! Mapping between optimizer proposals and typed [`HyperParams`].

use bt_optimizer::{ParameterSet, ParameterValue, SearchSpace};
use bt_types::{
    BtResult, HyperParams, ParamRange, ParamScale, SearchError, ALPHA, COLSAMPLE_BYTREE, LAMBDA,
    LEARNING_RATE, MAX_DEPTH, SCALE_POS_WEIGHT, SEARCH_RANGES, SUBSAMPLE,
};

/// The seven-dimensional search space over every tunable hyperparameter.
pub fn hyperparameter_space() -> SearchSpace {
    SEARCH_RANGES
        .iter()
        .fold(SearchSpace::new(), |space, range| match (range.integer, range.scale) {
            (true, _) => space.add_int(range.name, range.low as i64, range.high as i64),
            (false, ParamScale::Log) => space.add_log_uniform(range.name, range.low, range.high),
            (false, ParamScale::Linear) => space.add_float(range.name, range.low, range.high),
        })
}

/// Materialize a validated [`HyperParams`] from an optimizer proposal.
pub fn hyperparams_from_proposal(proposal: &ParameterSet) -> BtResult<HyperParams> {
    let max_depth = match lookup(proposal, &MAX_DEPTH)? {
        ParameterValue::Int(v) => u32::try_from(v).map_err(|_| SearchError::ParameterType {
            parameter: MAX_DEPTH.name.to_string(),
            expected: "non-negative integer",
        })?,
        ParameterValue::Float(_) => {
            return Err(SearchError::ParameterType {
                parameter: MAX_DEPTH.name.to_string(),
                expected: "integer",
            }
            .into())
        }
    };

    let params = HyperParams {
        scale_pos_weight: lookup(proposal, &SCALE_POS_WEIGHT)?.as_f64(),
        learning_rate: lookup(proposal, &LEARNING_RATE)?.as_f64(),
        max_depth,
        subsample: lookup(proposal, &SUBSAMPLE)?.as_f64(),
        colsample_bytree: lookup(proposal, &COLSAMPLE_BYTREE)?.as_f64(),
        reg_lambda: lookup(proposal, &LAMBDA)?.as_f64(),
        reg_alpha: lookup(proposal, &ALPHA)?.as_f64(),
    };
    params.validate()?;
    Ok(params)
}

/// Inverse of [`hyperparams_from_proposal`].
pub fn hyperparams_to_proposal(params: &HyperParams) -> ParameterSet {
    params
        .as_pairs()
        .into_iter()
        .map(|(name, value)| {
            let value = if name == MAX_DEPTH.name {
                ParameterValue::Int(value as i64)
            } else {
                ParameterValue::Float(value)
            };
            (name.to_string(), value)
        })
        .collect()
}

fn lookup(proposal: &ParameterSet, range: &ParamRange) -> BtResult<ParameterValue> {
    proposal.get(range.name).copied().ok_or_else(|| {
        SearchError::MissingParameter {
            parameter: range.name.to_string(),
        }
        .into()
    })
}
