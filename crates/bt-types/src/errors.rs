use thiserror::Error;

/// Main error type for the Boostune system
#[derive(Error, Debug)]
pub enum BtError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl BtError {
    /// True for errors caused by the caller's inputs rather than by a fit.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BtError::Data(_) | BtError::Validation(_) | BtError::Config(_)
        ) || matches!(self, BtError::Search(SearchError::InvalidTrialBudget { .. }))
    }
}

/// Dataset and input validation errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset is empty")]
    Empty,

    #[error("Row count mismatch: {features} feature rows but {labels} labels")]
    RowCountMismatch { features: usize, labels: usize },

    #[error("Row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Feature name count {names} does not match feature count {features}")]
    FeatureNameMismatch { names: usize, features: usize },

    #[error("Label at row {row} is not binary: {value}")]
    NonBinaryLabel { row: usize, value: String },

    #[error("Non-finite value at row {row}, feature {feature}")]
    NonFiniteFeature { row: usize, feature: String },

    #[error("Class {class} has {count} members, need at least {required} for {required}-fold stratification")]
    InsufficientClassMembers {
        class: u8,
        count: usize,
        required: usize,
    },

    #[error("Fold {fold} {part} set does not contain both classes")]
    SingleClassFold { fold: usize, part: &'static str },

    #[error("Schema mismatch: model expects {expected} features, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },
}

/// Model fitting errors
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Invalid hyperparameter {parameter}: {message}")]
    InvalidHyperParameter { parameter: String, message: String },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Numerical instability: {message}")]
    NumericalInstability { message: String },

    #[error("Metric undefined: {message}")]
    MetricUndefined { message: String },

    #[error("Invalid training settings: {message}")]
    InvalidSettings { message: String },
}

/// Optimizer and study errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Trial budget must be positive, got {budget}")]
    InvalidTrialBudget { budget: usize },

    #[error("Search space is empty")]
    EmptySearchSpace,

    #[error("Invalid range for parameter {parameter}: {message}")]
    InvalidRange { parameter: String, message: String },

    #[error("Parameter missing from trial proposal: {parameter}")]
    MissingParameter { parameter: String },

    #[error("Parameter {parameter} has wrong type, expected {expected}")]
    ParameterType {
        parameter: String,
        expected: &'static str,
    },

    #[error("No trial completed successfully")]
    NoCompletedTrials,

    #[error("Trial {trial_number} failed: {message}")]
    TrialFailed { trial_number: usize, message: String },
}

/// Result type alias for Boostune operations
pub type BtResult<T> = Result<T, BtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DataError::InsufficientClassMembers {
            class: 1,
            count: 2,
            required: 3,
        };

        assert!(error.to_string().contains("Class 1"));
        assert!(error.to_string().contains("2 members"));
        assert!(error.to_string().contains("3-fold"));
    }

    #[test]
    fn test_error_conversion() {
        let data_error = DataError::RowCountMismatch {
            features: 10,
            labels: 9,
        };
        let bt_error: BtError = data_error.into();

        match bt_error {
            BtError::Data(_) => (),
            _ => panic!("Expected Data error"),
        }
    }

    #[test]
    fn test_input_error_classification() {
        let budget: BtError = SearchError::InvalidTrialBudget { budget: 0 }.into();
        assert!(budget.is_input_error());

        let fit: BtError = TrainingError::NumericalInstability {
            message: "nan gradient".into(),
        }
        .into();
        assert!(!fit.is_input_error());
    }

    #[test]
    fn test_macros() {
        let _validation_err = validation_error!("Invalid value: {}", 42);
        let _internal_err = internal_error!("Something went wrong");
        let _config_err = config_error!("Missing required field: {}", "n_trials");
    }
}
