//! Elementwise and reduction ops with backward passes

use super::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, Zip};
use std::rc::Rc;

/// Add two tensors
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a, &self.b]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
        }
    }
}

/// Scale tensor by a constant
///
/// The factor is not part of the tape, which is how detached scalars
/// (e.g. a mean-abs normaliser) enter a computation.
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * factor
                self.a.accumulate_grad(grad * self.factor);
            }
        }
    }
}

/// Add a constant to every element
pub fn add_scalar(a: &Tensor, offset: f32) -> Tensor {
    let data = a.data() + offset;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddScalarBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddScalarBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddScalarBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
        }
    }
}

/// Sum all elements
pub fn sum(a: &Tensor) -> Tensor {
    let data = Array1::from_elem(1, a.data().sum());
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂sum * 1 (broadcast)
                self.a
                    .accumulate_grad(Array1::from_elem(self.a.len(), grad[0]));
            }
        }
    }
}

/// Hyperbolic tangent
pub fn tanh(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::tanh);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(TanhBackward {
            a: a.clone(),
            output: result.data().clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct TanhBackward {
    a: Tensor,
    output: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for TanhBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂tanh/∂x = 1 - tanh²(x)
                let grad_a = Zip::from(grad)
                    .and(&self.output)
                    .map_collect(|&g, &y| g * (1.0 - y * y));
                self.a.accumulate_grad(grad_a);
            }
        }
    }
}

/// Largest absolute value of a slice of data; NaN is ignored unless every
/// element is NaN.
pub(crate) fn max_abs(data: &Array1<f32>) -> f32 {
    data.iter().fold(f32::NEG_INFINITY, |acc, &x| acc.max(x.abs()))
}

/// Divide by the largest absolute element: y = x / max|x|
///
/// The result lies in `[-1, 1]`. An all-zero input yields NaN, which is
/// propagated rather than masked. The backward pass differentiates through
/// the max as well; ties share the max's gradient evenly.
pub fn normalize_max_abs(a: &Tensor) -> Tensor {
    let m = max_abs(a.data());
    let data = a.data() / m;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(NormalizeMaxAbsBackward {
            a: a.clone(),
            max_abs: m,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct NormalizeMaxAbsBackward {
    a: Tensor,
    max_abs: f32,
    result_grad: GradCell,
}

impl BackwardOp for NormalizeMaxAbsBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        vec![&self.a]
    }

    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let m = self.max_abs;
                let x = self.a.data();

                // Direct term: ∂y_i/∂x_i = 1/m
                let mut grad_a = grad / m;

                // Through the max: ∂L/∂m = -Σ g_i x_i / m², and ∂m/∂x_j = sign(x_j)
                // for every j attaining the max.
                let grad_m = -(grad * x).sum() / (m * m);
                let ties = x.iter().filter(|v| v.abs() == m).count();
                if ties > 0 {
                    let share = grad_m / ties as f32;
                    Zip::from(&mut grad_a).and(x).for_each(|ga, &xi| {
                        if xi.abs() == m {
                            *ga += share * sign(xi);
                        }
                    });
                }

                self.a.accumulate_grad(grad_a);
            }
        }
    }
}

/// Sign with `sign(0) == 0`, matching the tensor-library convention rather
/// than `f32::signum` (which maps `+0.0` to `1.0`).
pub(crate) fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        // Keeps NaN as NaN
        x * 0.0
    }
}
