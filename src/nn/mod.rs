//! Layers whose weights are fake-quantized on every forward pass
//!
//! The layers own the full-precision weight; a quantized copy is produced
//! per call and never stored, so gradients land on the raw weight through
//! the quantizer's backward rule. Biases are never quantized.

mod conv;
mod init;
mod linear;
mod padding;

pub use conv::{Conv2dConfig, QuantizedConv2d};
pub use linear::QuantizedLinear;
pub use padding::{same_padding, Padding};
