//! # Cuantizar: Fake Quantization for Quantization-Aware Training
//!
//! Cuantizar provides drop-in fake-quantized layers on top of a small
//! tape-based autograd engine. Quantizers round values onto low-bit grids in
//! the forward pass and register straight-through or range-masked gradients
//! so that training can proceed through the rounding.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation, dense and conv ops
//! - **quant**: Uniform, weight, PACT, fixed-clip and clamp quantizers
//! - **nn**: Quantized convolution and linear layers
//! - **optim**: Optimizers for weights and learnable clip thresholds
//! - **config**: Declarative YAML configuration

pub mod autograd;
pub mod config;
pub mod nn;
pub mod optim;
pub mod quant;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use error::{Error, Result};
