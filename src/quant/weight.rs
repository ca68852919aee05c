//! Weight quantization: tanh squashing, symmetric normalisation, uniform grid

use super::{BitWidth, UniformQuantizer};
use crate::autograd::{add_scalar, normalize_max_abs, scale, tanh, Tensor};
use crate::error::Result;
use ndarray::Array1;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    FullPrecision,
    /// One bit: `(sign(x / E) + 1) / 2 * E` with `E = mean|x|` detached
    Binary(UniformQuantizer),
    /// `k = w_bit - 1` bits of magnitude over `[-1, 1]`, one bit for sign
    Symmetric(UniformQuantizer),
}

/// Quantizes a weight tensor into a bounded symmetric grid.
///
/// For `2 <= w_bit <= 16` the weight is squashed with `tanh`, divided by its
/// largest magnitude so it spans `[-1, 1]`, then snapped to a grid of
/// `2^(w_bit-1) - 1` steps per side. Gradients flow through `tanh` and the
/// normalisation by the ordinary chain rule and through the grid by the
/// straight-through rule.
///
/// The one-bit path snaps with `sign` instead of a `k = 0` uniform grid,
/// whose `2^0 - 1 = 0` steps would divide by zero and turn every weight
/// into NaN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightQuantizer {
    bits: BitWidth,
    mode: Mode,
}

impl WeightQuantizer {
    pub fn new(w_bit: u8) -> Result<Self> {
        let bits = BitWidth::new(w_bit)?;
        let mode = match w_bit {
            32 => Mode::FullPrecision,
            1 => Mode::Binary(UniformQuantizer::from_bits(bits)),
            _ => Mode::Symmetric(UniformQuantizer::from_bits(BitWidth::new(w_bit - 1)?)),
        };
        tracing::debug!(w_bit, "weight quantizer constructed");
        Ok(Self { bits, mode })
    }

    pub fn bits(&self) -> BitWidth {
        self.bits
    }

    /// Forward evaluation on raw data.
    pub fn quantize(&self, x: &Array1<f32>) -> Array1<f32> {
        match self.mode {
            Mode::FullPrecision => x.clone(),
            Mode::Binary(grid) => {
                let e = mean_abs(x);
                grid.quantize(&(x / e)).mapv(|s| (s + 1.0) / 2.0 * e)
            }
            Mode::Symmetric(grid) => {
                let t = x.mapv(f32::tanh);
                let m = crate::autograd::max_abs(&t);
                grid.quantize(&(t / m))
            }
        }
    }

    /// Quantize a weight tensor on the tape. The result is a fresh tensor on
    /// every call; only the raw weight persists.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        match self.mode {
            Mode::FullPrecision => x.clone(),
            Mode::Binary(grid) => {
                // E is a plain f32, so it never receives a gradient
                let e = mean_abs(x.data());
                if e.is_nan() || e <= 0.0 {
                    tracing::warn!(mean_abs = e, "binary weight scale is not positive");
                }
                let snapped = grid.forward(&scale(x, 1.0 / e));
                add_scalar(&scale(&snapped, e / 2.0), e / 2.0)
            }
            Mode::Symmetric(grid) => grid.forward(&normalize_max_abs(&tanh(x))),
        }
    }
}

fn mean_abs(x: &Array1<f32>) -> f32 {
    x.mapv(f32::abs).mean().unwrap_or(f32::NAN)
}

impl fmt::Display for WeightQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeightQuantizer(Wbit={})", self.bits)
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
    fn test_three_bit_weights() {
        let q = WeightQuantizer::new(3).unwrap();
        let x = Tensor::from_vec(vec![-2.0, -0.5, 0.0, 0.5, 2.0], true);
        let y = q.forward(&x);
        let expected = [-1.0, -1.0 / 3.0, 0.0, 1.0 / 3.0, 1.0];
        for (o, e) in y.data().iter().zip(expected) {
            assert_abs_diff_eq!(*o, e, epsilon = 1e-6);
        }
        assert_eq!(y.data(), &q.quantize(x.data()));
    }

    #[test]
    fn test_two_bit_weights_use_sign_grid() {
        let q = WeightQuantizer::new(2).unwrap();
        let out = q.quantize(&arr1(&[-3.0, -0.01, 0.0, 0.01, 3.0]));
        assert_eq!(out, arr1(&[-1.0, -1.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn test_full_precision_identity() {
        let q = WeightQuantizer::new(32).unwrap();
        let x = Tensor::from_vec(vec![-7.5, 0.25, 3.0], true);
        let mut y = q.forward(&x);
        assert_eq!(y.data(), x.data());

        backward(&mut y, Some(arr1(&[1.0, -2.0, 0.5])));
        assert_eq!(x.grad().unwrap(), arr1(&[1.0, -2.0, 0.5]));
    }

    #[test]
    fn test_binary_weights() {
        // E = mean|x| = 1.0
        let q = WeightQuantizer::new(1).unwrap();
        let x = Tensor::from_vec(vec![-2.0, 0.0, 1.0, 1.0], true);
        let mut y = q.forward(&x);
        assert_eq!(y.data(), &arr1(&[0.0, 0.5, 1.0, 1.0]));
        assert!(y.data().iter().all(|v| v.is_finite()));

        // d/dx [(ste(x/E) + 1) / 2 * E] = 1/2 with E detached
        backward(&mut y, Some(arr1(&[1.0, 1.0, 2.0, -4.0])));
        assert_eq!(x.grad().unwrap(), arr1(&[0.5, 0.5, 1.0, -2.0]));
    }

    #[test]
    fn test_binary_all_zero_weights_are_degenerate() {
        let q = WeightQuantizer::new(1).unwrap();
        let y = q.forward(&Tensor::zeros(3, false));
        assert!(y.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_gradient_matches_unquantized_chain() {
        let x = vec![-1.2, 0.3, 0.7, -0.1];
        let up = arr1(&[0.5, -1.0, 2.0, 1.5]);

        let q = WeightQuantizer::new(4).unwrap();
        let a = Tensor::from_vec(x.clone(), true);
        let mut y = q.forward(&a);
        backward(&mut y, Some(up.clone()));

        let b = Tensor::from_vec(x, true);
        let mut reference = normalize_max_abs(&tanh(&b));
        backward(&mut reference, Some(up));

        let (ga, gb) = (a.grad().unwrap(), b.grad().unwrap());
        for i in 0..4 {
            assert_abs_diff_eq!(ga[i], gb[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_invalid_widths() {
        assert!(WeightQuantizer::new(0).is_err());
        assert!(WeightQuantizer::new(17).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(WeightQuantizer::new(8).unwrap().to_string(), "WeightQuantizer(Wbit=8)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_symmetric_range(
            x in prop::collection::vec(-50.0f32..50.0, 1..64),
            w_bit in 2u8..=16,
        ) {
            prop_assume!(x.iter().any(|v| v.abs() > 1e-3));
            let q = WeightQuantizer::new(w_bit).unwrap();
            for &v in q.quantize(&Array1::from(x)).iter() {
                prop_assert!((-1.0..=1.0).contains(&v), "{} outside [-1, 1]", v);
            }
        }

        #[test]
        fn prop_levels_per_side(
            x in prop::collection::vec(-5.0f32..5.0, 1..64),
            w_bit in 3u8..=8,
        ) {
            prop_assume!(x.iter().any(|v| v.abs() > 1e-3));
            let q = WeightQuantizer::new(w_bit).unwrap();
            let n = ((1u32 << (w_bit - 1)) - 1) as f32;
            for &v in q.quantize(&Array1::from(x)).iter() {
                prop_assert!(((v * n) - (v * n).round()).abs() < 1e-3);
            }
        }
    }
}
