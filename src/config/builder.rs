//! Build quantizers, layers and optimizers from configuration

use super::schema::{ActivationSpec, OptimSpec, QuantSpec};
use crate::error::{Error, Result};
use crate::nn::{Conv2dConfig, QuantizedConv2d, QuantizedLinear};
use crate::optim::{Optimizer, SGD};
use crate::quant::{
    ActivationQuantizer, ClampQuantizer, FixedClipQuantizer, PactQuantizer, WeightQuantizer,
};

/// Build the weight quantizer for a spec
pub fn build_weight_quantizer(spec: &QuantSpec) -> Result<WeightQuantizer> {
    WeightQuantizer::new(spec.w_bit.get())
}

/// Build the activation quantizer selected by `spec.kind`
pub fn build_activation_quantizer(spec: &ActivationSpec) -> Result<Box<dyn ActivationQuantizer>> {
    let quantizer: Box<dyn ActivationQuantizer> = match *spec {
        ActivationSpec::Pact { a_bit, alpha } => Box::new(PactQuantizer::new(a_bit.get(), alpha)?),
        ActivationSpec::FixedClip { a_bit, scale_coef } => {
            Box::new(FixedClipQuantizer::new(a_bit.get(), scale_coef)?)
        }
        ActivationSpec::Clamp { a_bit } => Box::new(ClampQuantizer::new(a_bit.get())?),
    };
    tracing::debug!(quantizer = %quantizer, "activation quantizer built");
    Ok(quantizer)
}

/// Build a quantized convolution with the spec's weight bit width
pub fn build_conv2d(spec: &QuantSpec, config: Conv2dConfig) -> Result<QuantizedConv2d> {
    QuantizedConv2d::new(spec.w_bit.get(), config)
}

/// Build a quantized linear layer with the spec's weight bit width
pub fn build_linear(
    spec: &QuantSpec,
    in_features: usize,
    out_features: usize,
    bias: bool,
) -> Result<QuantizedLinear> {
    QuantizedLinear::new(spec.w_bit.get(), in_features, out_features, bias)
}

/// Build optimizer from configuration
pub fn build_optimizer(spec: &OptimSpec) -> Result<Box<dyn Optimizer>> {
    match spec.name.to_lowercase().as_str() {
        "sgd" => Ok(Box::new(SGD::new(spec.lr, spec.momentum))),
        name => Err(Error::ConfigError(format!("Unknown optimizer: {name}"))),
    }
}
