//! PACT: activation clipping with a learnable upper bound
//!
//! Forward (for `k != 32`):
//!
//! ```text
//! y     = clamp(x, 0, α)
//! scale = (2^k - 1) / α
//! y_q   = round(y * scale) / scale
//! ```
//!
//! Backward, given `g = ∂L/∂y_q`:
//!
//! ```text
//! ∂L/∂x = g  where 0 <= x <= α, else 0
//! ∂L/∂α = Σ g  over elements with x >= α
//! ```
//!
//! Both comparisons are inclusive at `x == α`: such an element passes its
//! gradient to `x` and also contributes to `α`.

use super::{ActivationQuantizer, BitWidth};
use crate::autograd::{BackwardOp, GradCell, Tensor};
use crate::error::Result;
use ndarray::{Array1, Zip};
use std::fmt;
use std::rc::Rc;

/// Initial clipping threshold when none is given
pub const DEFAULT_ALPHA: f32 = 10.0;

/// Activation quantizer with a trainable clipping threshold `α`.
///
/// The quantizer owns `α` as a one-element tensor but never updates it;
/// an optimizer mutates it in place through
/// [`ActivationQuantizer::parameters_mut`] between training steps. The
/// tensor must keep exactly one element; [`PactQuantizer::alpha_mut`] only
/// hands out that element. Each forward call snapshots `α` once and the backward
/// pass reuses that snapshot. `α` must stay positive: the quantizer does
/// not check, and a non-positive value yields Inf/NaN outputs.
#[derive(Clone, Debug)]
pub struct PactQuantizer {
    bits: BitWidth,
    alpha: Tensor,
}

impl PactQuantizer {
    pub fn new(a_bit: u8, alpha: f32) -> Result<Self> {
        let bits = BitWidth::new(a_bit)?;
        tracing::debug!(a_bit, alpha, "PACT quantizer constructed");
        Ok(Self {
            bits,
            alpha: Tensor::scalar(alpha, true),
        })
    }

    pub fn with_default_alpha(a_bit: u8) -> Result<Self> {
        Self::new(a_bit, DEFAULT_ALPHA)
    }

    /// Clipping threshold
    pub fn alpha(&self) -> &Tensor {
        &self.alpha
    }

    /// Clipping threshold value, for manual updates
    pub fn alpha_mut(&mut self) -> &mut f32 {
        &mut self.alpha.data_mut()[0]
    }

    /// Forward evaluation on raw data with the current `α`.
    pub fn quantize(&self, x: &Array1<f32>) -> Array1<f32> {
        if self.bits.is_full_precision() {
            return x.clone();
        }
        pact_quantize(self.bits, x, self.alpha.item())
    }
}

/// PACT forward on raw data.
pub fn pact_quantize(bits: BitWidth, x: &Array1<f32>, alpha: f32) -> Array1<f32> {
    let scale = bits.levels() / alpha;
    x.mapv(|v| (clip(v, alpha) * scale).round_ties_even() / scale)
}

/// PACT backward on raw data: `(∂L/∂x, ∂L/∂α)`.
pub fn pact_gradient(x: &Array1<f32>, alpha: f32, grad_output: &Array1<f32>) -> (Array1<f32>, f32) {
    let grad_x = Zip::from(x)
        .and(grad_output)
        .map_collect(|&v, &g| if v < 0.0 || v > alpha { 0.0 } else { g });
    let grad_alpha = Zip::from(x)
        .and(grad_output)
        .fold(0.0, |acc, &v, &g| if v >= alpha { acc + g } else { acc });
    (grad_x, grad_alpha)
}

/// `min(max(x, 0), α)`, letting NaN through
fn clip(x: f32, alpha: f32) -> f32 {
    let lower = if x < 0.0 { 0.0 } else { x };
    if lower > alpha {
        alpha
    } else {
        lower
    }
}

impl ActivationQuantizer for PactQuantizer {
    fn bits(&self) -> BitWidth {
        self.bits
    }

    fn forward(&self, x: &Tensor) -> Tensor {
        if self.bits.is_full_precision() {
            return x.clone();
        }

        let alpha = self.alpha.item();
        if alpha.is_nan() || alpha <= 0.0 {
            tracing::warn!(alpha, "PACT clipping threshold is not positive");
        }

        let data = pact_quantize(self.bits, x.data(), alpha);
        let requires_grad = x.requires_grad() || self.alpha.requires_grad();
        let mut result = Tensor::new(data, requires_grad);

        if requires_grad {
            let backward_op = Rc::new(PactBackward {
                input: x.clone(),
                alpha: self.alpha.clone(),
                alpha_value: alpha,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(backward_op);
        }

        result
    }

    /// `α`, to be updated in place; replacing it with a tensor of another
    /// length breaks the quantizer.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.alpha]
    }
}

struct PactBackward {
    input: Tensor,
    alpha: Tensor,
    alpha_value: f32,
    result_grad: GradCell,
}

impl BackwardOp for PactBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.input, &self.alpha]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (grad_x, grad_alpha) = pact_gradient(self.input.data(), self.alpha_value, grad);

            if self.input.requires_grad() {
                self.input.accumulate_grad(grad_x);
            }
            if self.alpha.requires_grad() {
                self.alpha.accumulate_grad(Array1::from_elem(1, grad_alpha));
            }
        }
    }
}

impl fmt::Display for PactQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PactQuantizer( Abit={}, Alpha={} )", self.bits, self.alpha.item())
    }
}
