//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Optimizers are the only writers of trainable parameters, including the
/// clipping thresholds owned by activation quantizers. They run between
/// forward/backward passes, never during one.
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [&mut Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [&mut Tensor]) {
        for param in params.iter() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
