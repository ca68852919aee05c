//! Declarative YAML configuration for quantization-aware training

mod builder;
mod load;
mod schema;
mod validate;


pub use builder::{
    build_activation_quantizer, build_conv2d, build_linear, build_optimizer,
    build_weight_quantizer,
};
pub use load::{load_spec, parse_spec};
pub use schema::{ActivationSpec, OptimSpec, QuantSpec};
pub use validate::{validate_spec, ValidationError};
