//! Legacy activation quantizer: fixed rescale and clamp into [0, 1]

use super::uniform::straight_through;
use super::{ActivationQuantizer, BitWidth, UniformQuantizer};
use crate::autograd::Tensor;
use crate::error::Result;
use ndarray::Array1;
use std::fmt;

/// Assumed input range is `[0, 10]`; inputs are multiplied by this before
/// clamping into the unit interval.
pub const INPUT_RESCALE: f32 = 0.1;

/// `UniformQuantizer(clamp(x * 0.1, 0, 1))` with a straight-through gradient
/// for every element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClampQuantizer {
    grid: UniformQuantizer,
}

impl ClampQuantizer {
    pub fn new(a_bit: u8) -> Result<Self> {
        let grid = UniformQuantizer::from_bits(BitWidth::new(a_bit)?);
        tracing::debug!(a_bit, "clamp quantizer constructed");
        Ok(Self { grid })
    }

    /// Forward evaluation on raw data.
    pub fn quantize(&self, x: &Array1<f32>) -> Array1<f32> {
        if self.grid.bits().is_full_precision() {
            return x.clone();
        }
        let clamped = x.mapv(|v| {
            let v = v * INPUT_RESCALE;
            if v < 0.0 {
                0.0
            } else if v > 1.0 {
                1.0
            } else {
                v
            }
        });
        self.grid.quantize(&clamped)
    }
}

impl ActivationQuantizer for ClampQuantizer {
    fn bits(&self) -> BitWidth {
        self.grid.bits()
    }

    fn forward(&self, x: &Tensor) -> Tensor {
        if self.grid.bits().is_full_precision() {
            return x.clone();
        }
        straight_through(x, self.quantize(x.data()))
    }
}

impl fmt::Display for ClampQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClampQuantizer( Abit={} )", self.grid.bits())
    }
}
