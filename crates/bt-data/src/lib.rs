pub mod loaders;
pub mod synthetic;

pub use loaders::*;
pub use synthetic::*;
