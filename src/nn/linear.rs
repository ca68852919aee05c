//! Quantized linear layer

use super::init::uniform_fan_in;
use crate::autograd::linear;
use crate::error::{Error, Result};
use crate::quant::WeightQuantizer;
use crate::Tensor;
use std::fmt;

/// Linear layer `y = x @ Q(W)ᵀ + b`
pub struct QuantizedLinear {
    in_features: usize,
    out_features: usize,
    quantizer: WeightQuantizer,
    /// Full-precision weight `[out_features, in_features]`
    weight: Tensor,
    bias: Option<Tensor>,
}

impl QuantizedLinear {
    /// Create a layer with randomly initialised parameters
    pub fn new(w_bit: u8, in_features: usize, out_features: usize, bias: bool) -> Result<Self> {
        let weight = uniform_fan_in(out_features * in_features, in_features);
        let bias = bias.then(|| uniform_fan_in(out_features, in_features));
        Self::from_parts(w_bit, in_features, out_features, weight, bias)
    }

    /// Create a layer with a bias, the default for linear layers
    pub fn with_bias(w_bit: u8, in_features: usize, out_features: usize) -> Result<Self> {
        Self::new(w_bit, in_features, out_features, true)
    }

    /// Create a layer from existing parameters
    pub fn from_parts(
        w_bit: u8,
        in_features: usize,
        out_features: usize,
        weight: Tensor,
        bias: Option<Tensor>,
    ) -> Result<Self> {
        let quantizer = WeightQuantizer::new(w_bit)?;
        if in_features == 0 || out_features == 0 {
            return Err(Error::InvalidParameter(format!(
                "features must be > 0, got {in_features} -> {out_features}"
            )));
        }
        if weight.len() != out_features * in_features {
            return Err(Error::ShapeMismatch {
                expected: vec![out_features, in_features],
                got: vec![weight.len()],
            });
        }
        if let Some(b) = bias.as_ref().filter(|b| b.len() != out_features) {
            return Err(Error::ShapeMismatch {
                expected: vec![out_features],
                got: vec![b.len()],
            });
        }

        tracing::debug!(w_bit, in_features, out_features, "quantized linear constructed");

        Ok(Self {
            in_features,
            out_features,
            quantizer,
            weight,
            bias,
        })
    }

    /// Forward pass over `[batch, in_features]` input
    pub fn forward(&self, input: &Tensor, batch: usize) -> Result<Tensor> {
        let weight_q = self.quantizer.forward(&self.weight);
        tracing::trace!(batch, "quantized linear forward");
        linear(
            input,
            &weight_q,
            self.bias.as_ref(),
            batch,
            self.in_features,
            self.out_features,
        )
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn quantizer(&self) -> &WeightQuantizer {
        &self.quantizer
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Weight and bias, for optimizer updates
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weight];
        if let Some(bias) = self.bias.as_mut() {
            params.push(bias);
        }
        params
    }
}

impl fmt::Display for QuantizedLinear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuantizedLinear( Wbit={}, {}, {} )",
            self.quantizer.bits(),
            self.in_features,
            self.out_features
        )
    }
}
