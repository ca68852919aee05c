//! Fake quantization primitives for quantization-aware training
//!
//! Each quantizer snaps values onto a finite grid in the forward pass and
//! registers an analytically chosen gradient on the autograd tape:
//!
//! - [`UniformQuantizer`]: `2^k - 1` step grid, straight-through gradient
//! - [`WeightQuantizer`]: tanh + max-abs normalisation into `[-1, 1]`
//! - [`PactQuantizer`]: learnable clip `[0, α]`, range-masked gradient plus
//!   a gradient for `α`
//! - [`FixedClipQuantizer`]: fixed clip `[0, c]`, straight-through
//! - [`ClampQuantizer`]: `clamp(0.1 x, 0, 1)`, straight-through
//!
//! Bit width `32` turns every quantizer into an exact identity.

mod bits;
mod clamp;
mod fixed_clip;
mod pact;
mod uniform;
mod weight;

pub use bits::BitWidth;
pub use clamp::{ClampQuantizer, INPUT_RESCALE};
pub use fixed_clip::{FixedClipQuantizer, DEFAULT_SCALE_COEF};
pub use pact::{pact_gradient, pact_quantize, PactQuantizer, DEFAULT_ALPHA};
pub use uniform::UniformQuantizer;
pub use weight::WeightQuantizer;

use crate::Tensor;

/// Activation quantizer that block-composition code can swap freely.
pub trait ActivationQuantizer: std::fmt::Display {
    /// Configured bit width
    fn bits(&self) -> BitWidth;

    /// Quantize on the tape; output has the input's length.
    fn forward(&self, x: &Tensor) -> Tensor;

    /// Trainable parameters owned by the quantizer
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }
}
