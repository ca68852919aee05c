//! Clip-then-quantize activations with a fixed threshold

use super::uniform::straight_through;
use super::{ActivationQuantizer, BitWidth, UniformQuantizer};
use crate::autograd::Tensor;
use crate::error::Result;
use ndarray::Array1;
use std::fmt;

/// Default clipping threshold
pub const DEFAULT_SCALE_COEF: f32 = 2.0;

/// Clips activations to `[0, scale_coef]` and snaps them to a `2^k - 1`
/// step grid over that interval.
///
/// The clip is computed branch-free as `0.5 * (|x| - |x - c| + c)`. The
/// whole op is straight-through: every element, clipped or not, receives
/// the upstream gradient unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedClipQuantizer {
    grid: UniformQuantizer,
    scale_coef: f32,
}

impl FixedClipQuantizer {
    pub fn new(a_bit: u8, scale_coef: f32) -> Result<Self> {
        let grid = UniformQuantizer::from_bits(BitWidth::new(a_bit)?);
        tracing::debug!(a_bit, scale_coef, "fixed clip quantizer constructed");
        Ok(Self { grid, scale_coef })
    }

    pub fn scale_coef(&self) -> f32 {
        self.scale_coef
    }

    /// Forward evaluation on raw data.
    pub fn quantize(&self, x: &Array1<f32>) -> Array1<f32> {
        if self.grid.bits().is_full_precision() {
            return x.clone();
        }
        let c = self.scale_coef;
        let clamped = x.mapv(|v| 0.5 * (v.abs() - (v - c).abs() + c));
        self.grid.quantize(&(clamped / c)) * c
    }
}

impl ActivationQuantizer for FixedClipQuantizer {
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

impl fmt::Display for FixedClipQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FixedClipQuantizer( Abit={}, ScaleCoef={} )",
            self.grid.bits(),
            self.scale_coef
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use proptest::prelude::*;

    #[test]
    fn test_clips_and_quantizes() {
        // c = 3, k = 2: grid {0, 1, 2, 3}
        let q = FixedClipQuantizer::new(2, 3.0).unwrap();
        let out = q.quantize(&arr1(&[-2.0, 0.0, 0.9, 1.2, 2.9, 5.0]));
        let expected = [0.0, 0.0, 1.0, 1.0, 3.0, 3.0];
        for (o, e) in out.iter().zip(expected) {
            assert_abs_diff_eq!(*o, e, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_gradient_is_unmasked() {
        let q = FixedClipQuantizer::new(4, DEFAULT_SCALE_COEF).unwrap();
        let x = Tensor::from_vec(vec![-5.0, 1.0, 9.0], true);
        let mut y = q.forward(&x);
        backward(&mut y, Some(arr1(&[0.1, 0.2, 0.3])));
        assert_eq!(x.grad().unwrap(), arr1(&[0.1, 0.2, 0.3]));
    }

    #[test]
    fn test_full_precision_identity() {
        let q = FixedClipQuantizer::new(32, 2.0).unwrap();
        let x = Tensor::from_vec(vec![-5.0, 1.0, 9.0], true);
        let y = q.forward(&x);
        assert_eq!(y.data(), x.data());
    }

    #[test]
    fn test_display() {
        let q = FixedClipQuantizer::new(4, 2.0).unwrap();
        assert_eq!(q.to_string(), "FixedClipQuantizer( Abit=4, ScaleCoef=2 )");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_matches_clamp(
            x in prop::collection::vec(-20.0f32..20.0, 1..32),
            c in 0.5f32..10.0,
        ) {
            // with 16 bits the grid error is far below the tolerance
            let q = FixedClipQuantizer::new(16, c).unwrap();
            for (&v, &o) in x.iter().zip(q.quantize(&Array1::from(x.clone())).iter()) {
                let expected = v.max(0.0).min(c);
                prop_assert!((o - expected).abs() < 1e-3 * c.max(1.0), "{} -> {} (c={})", v, o, c);
            }
        }

        #[test]
        fn prop_straight_through(
            xg in prop::collection::vec((-20.0f32..20.0, -2.0f32..2.0), 1..32),
            bits in 1u8..=16,
        ) {
            let (x, g): (Vec<f32>, Vec<f32>) = xg.into_iter().unzip();
            let q = FixedClipQuantizer::new(bits, 2.0).unwrap();
            let input = Tensor::from_vec(x, true);
            let mut y = q.forward(&input);
            backward(&mut y, Some(Array1::from(g.clone())));
            prop_assert_eq!(input.grad().unwrap(), Array1::from(g));
        }
    }
}
