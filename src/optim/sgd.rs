//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// SGD optimizer with optional momentum
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        if self.velocities.len() != params.len() {
            self.velocities = vec![None; params.len()];
        }

        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            let Some(grad) = param.grad() else { continue };

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let v = match velocity.take() {
                    Some(v) => v * self.momentum - &grad * self.lr,
                    None => &grad * (-self.lr),
                };
                *param.data_mut() += &v;
                *velocity = Some(v);
            } else {
                // param -= lr * grad
                param.data_mut().scaled_add(-self.lr, &grad);
            }
        }
        tracing::trace!(params = params.len(), lr = self.lr, "sgd step");
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_plain_step() {
        let mut w = Tensor::from_vec(vec![1.0, 2.0], true);
        w.set_grad(ndarray::arr1(&[0.5, -1.0]));

        let mut opt = SGD::new(0.1, 0.0);
        opt.step(&mut [&mut w]);

        assert_abs_diff_eq!(w.data()[0], 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(w.data()[1], 2.1, epsilon = 1e-6);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut w = Tensor::scalar(0.0, true);
        let mut opt = SGD::new(1.0, 0.5);

        w.set_grad(ndarray::arr1(&[1.0]));
        opt.step(&mut [&mut w]);
        assert_abs_diff_eq!(w.item(), -1.0);

        // v = 0.5 * -1 - 1 = -1.5
        opt.step(&mut [&mut w]);
        assert_abs_diff_eq!(w.item(), -2.5);
    }

    #[test]
    fn test_skips_params_without_grad() {
        let mut a = Tensor::scalar(1.0, true);
        let mut b = Tensor::scalar(1.0, true);
        b.set_grad(ndarray::arr1(&[1.0]));

        let mut opt = SGD::new(0.5, 0.0);
        opt.step(&mut [&mut a, &mut b]);

        assert_abs_diff_eq!(a.item(), 1.0);
        assert_abs_diff_eq!(b.item(), 0.5);
    }

    #[test]
    fn test_zero_grad_and_lr() {
        let mut a = Tensor::scalar(1.0, true);
        a.set_grad(ndarray::arr1(&[3.0]));
        let mut opt = SGD::new(0.1, 0.0);
        opt.zero_grad(&mut [&mut a]);
        assert!(a.grad().is_none());

        opt.set_lr(0.01);
        assert_abs_diff_eq!(opt.lr(), 0.01);
    }
}
