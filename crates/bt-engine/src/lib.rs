// Boostune engine: boosted trees, cross-validated objective and tuner

pub mod binning;
pub mod booster;
pub mod cv;
pub mod evaluator;
pub mod grower;
pub mod loss;
pub mod metrics;
pub mod params;
pub mod tree;
pub mod tuner;

pub use booster::{FitReport, GradientBoostedClassifier, MODEL_FORMAT_VERSION};
pub use cv::{Fold, StratifiedKFold};
pub use evaluator::{objective, CvScore, ObjectiveEvaluator, DEFAULT_N_SPLITS};
pub use metrics::roc_auc;
pub use params::{hyperparameter_space, hyperparams_from_proposal, hyperparams_to_proposal};
pub use tuner::{train_final_model, Tuner, TunerConfig, TuningOutcome};
