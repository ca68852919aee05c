//! Convolution padding policies

use serde::{Deserialize, Serialize};

/// Spatial zero padding applied on every side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Explicit(usize),
    /// Derived so that `out ≈ in / stride`, see [`same_padding`]
    Same,
}

impl Padding {
    pub fn resolve(self, kernel_size: usize, stride: usize, dilation: usize) -> usize {
        match self {
            Padding::Explicit(p) => p,
            Padding::Same => same_padding(kernel_size, stride, dilation),
        }
    }
}

impl Default for Padding {
    fn default() -> Self {
        Padding::Explicit(0)
    }
}

/// `ceil((dilation * (kernel - 1) + 1 - stride) / 2)`, floored at zero
pub fn same_padding(kernel_size: usize, stride: usize, dilation: usize) -> usize {
    let extent = dilation * kernel_size.saturating_sub(1) + 1;
    extent.saturating_sub(stride).div_ceil(2)
}
