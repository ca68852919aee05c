//! Optimizers that update layer weights and quantizer thresholds

mod optimizer;
mod sgd;

pub use optimizer::Optimizer;
pub use sgd::SGD;
