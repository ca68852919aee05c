//! Uniform grid quantizer with a straight-through gradient

use super::BitWidth;
use crate::autograd::{sign, BackwardOp, GradCell, Tensor};
use crate::error::Result;
use ndarray::Array1;
use std::fmt;
use std::rc::Rc;

/// Snap every element to the nearest of `2^k - 1` equal steps of the unit
/// interval (scaled by `1/n`).
///
/// - `k == 32`: identity
/// - `k == 1`: `sign(x)`, i.e. `{-1, 0, +1}`
/// - otherwise: `round(x * n) / n` with ties rounded to even
///
/// Rounding has zero derivative almost everywhere, so the backward pass
/// substitutes the identity (straight-through estimator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformQuantizer {
    bits: BitWidth,
}

impl UniformQuantizer {
    pub fn new(bits: u8) -> Result<Self> {
        let bits = BitWidth::new(bits)?;
        tracing::debug!(bits = bits.get(), "uniform quantizer constructed");
        Ok(Self { bits })
    }

    pub(crate) fn from_bits(bits: BitWidth) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> BitWidth {
        self.bits
    }

    /// Forward evaluation on raw data.
    pub fn quantize(&self, x: &Array1<f32>) -> Array1<f32> {
        if self.bits.is_full_precision() {
            return x.clone();
        }
        match self.bits.get() {
            1 => x.mapv(sign),
            _ => {
                let n = self.bits.levels();
                x.mapv(|v| (v * n).round_ties_even() / n)
            }
        }
    }

    /// Gradient with respect to the input: the upstream gradient, unchanged.
    pub fn gradient(&self, grad_output: &Array1<f32>) -> Array1<f32> {
        grad_output.clone()
    }

    /// Quantize a tensor, recording the straight-through node on the tape.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        if self.bits.is_full_precision() {
            return x.clone();
        }
        straight_through(x, self.quantize(x.data()))
    }
}

impl fmt::Display for UniformQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniformQuantizer(k={})", self.bits)
    }
}

/// Wrap already-quantized data as the output of `input`, passing the
/// upstream gradient through unmasked.
pub(crate) fn straight_through(input: &Tensor, data: Array1<f32>) -> Tensor {
    let requires_grad = input.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(StraightThroughBackward {
            input: input.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct StraightThroughBackward {
    input: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for StraightThroughBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.input]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.input.requires_grad() {
                self.input.accumulate_grad(grad.clone());
            }
        }
    }
}
