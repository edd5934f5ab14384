pub mod dataset;
pub mod errors;
pub mod hyperparams;

pub use dataset::*;
pub use errors::*;
pub use hyperparams::*;
