//! Parameter initialisation

use crate::Tensor;
use rand::Rng;

/// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in))`, the usual default for
/// dense and convolution layers.
pub(crate) fn uniform_fan_in(len: usize, fan_in: usize) -> Tensor {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let mut rng = rand::rng();
    let data: Vec<f32> = (0..len).map(|_| rng.random_range(-bound..bound)).collect();
    Tensor::from_vec(data, true)
}
