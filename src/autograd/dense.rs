//! Dense ops: linear map and 2-D convolution
//!
//! Both operate on flat row-major buffers. Shapes are validated up front and
//! reported as [`Error::ShapeMismatch`].

use super::{BackwardOp, GradCell, Tensor};
use crate::error::{Error, Result};
use ndarray::Array1;
use std::rc::Rc;

fn check_len(tensor: &Tensor, expected: usize) -> Result<()> {
    if tensor.len() != expected {
        return Err(Error::ShapeMismatch {
            expected: vec![expected],
            got: vec![tensor.len()],
        });
    }
    Ok(())
}

/// Linear map: y = x @ Wᵀ + b
///
/// # Arguments
/// * `input` - `[batch, in_features]` flattened
/// * `weight` - `[out_features, in_features]` flattened
/// * `bias` - optional `[out_features]`
pub fn linear(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    batch: usize,
    in_features: usize,
    out_features: usize,
) -> Result<Tensor> {
    check_len(input, batch * in_features)?;
    check_len(weight, out_features * in_features)?;
    if let Some(b) = bias {
        check_len(b, out_features)?;
    }

    let x = input.data();
    let w = weight.data();
    let mut out = vec![0.0; batch * out_features];
    for n in 0..batch {
        for o in 0..out_features {
            let mut acc = bias.map_or(0.0, |b| b.data()[o]);
            for i in 0..in_features {
                acc += x[n * in_features + i] * w[o * in_features + i];
            }
            out[n * out_features + o] = acc;
        }
    }

    let requires_grad = input.requires_grad()
        || weight.requires_grad()
        || bias.is_some_and(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            batch,
            in_features,
            out_features,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct LinearBackward {
    input: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    batch: usize,
    in_features: usize,
    out_features: usize,
    result_grad: GradCell,
}

impl BackwardOp for LinearBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        let mut inputs = vec![&self.input, &self.weight];
        inputs.extend(self.bias.as_ref());
        inputs
    }

    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (batch, fin, fout) = (self.batch, self.in_features, self.out_features);

            // ∂L/∂x = ∂L/∂y @ W
            if self.input.requires_grad() {
                let w = self.weight.data();
                let mut grad_x = vec![0.0; batch * fin];
                for n in 0..batch {
                    for i in 0..fin {
                        let mut acc = 0.0;
                        for o in 0..fout {
                            acc += grad_output[n * fout + o] * w[o * fin + i];
                        }
                        grad_x[n * fin + i] = acc;
                    }
                }
                self.input.accumulate_grad(Array1::from(grad_x));
            }

            // ∂L/∂W = (∂L/∂y)ᵀ @ x
            if self.weight.requires_grad() {
                let x = self.input.data();
                let mut grad_w = vec![0.0; fout * fin];
                for o in 0..fout {
                    for i in 0..fin {
                        let mut acc = 0.0;
                        for n in 0..batch {
                            acc += grad_output[n * fout + o] * x[n * fin + i];
                        }
                        grad_w[o * fin + i] = acc;
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }

            if let Some(bias) = self.bias.as_ref().filter(|b| b.requires_grad()) {
                let mut grad_b = vec![0.0; fout];
                for n in 0..batch {
                    for o in 0..fout {
                        grad_b[o] += grad_output[n * fout + o];
                    }
                }
                bias.accumulate_grad(Array1::from(grad_b));
            }
        }
    }
}

/// Geometry of a grouped, strided, padded and dilated 2-D convolution over
/// NCHW data with square kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conv2dShape {
    pub batch: usize,
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
}

impl Conv2dShape {
    /// Spatial output size, or an error when the dilated kernel does not fit
    /// the padded input.
    pub fn output_hw(&self) -> Result<(usize, usize)> {
        let extent = self.dilation * self.kernel_size.saturating_sub(1) + 1;
        let span = |len: usize| -> Result<usize> {
            let padded = len + 2 * self.padding;
            if padded < extent {
                return Err(Error::ShapeMismatch {
                    expected: vec![extent],
                    got: vec![padded],
                });
            }
            Ok((padded - extent) / self.stride + 1)
        };
        Ok((span(self.height)?, span(self.width)?))
    }

    fn in_per_group(&self) -> usize {
        self.in_channels / self.groups
    }

    fn out_per_group(&self) -> usize {
        self.out_channels / self.groups
    }

    /// Number of weight elements: `out * (in / groups) * k * k`
    pub fn weight_len(&self) -> usize {
        self.out_channels * self.in_per_group() * self.kernel_size * self.kernel_size
    }

    pub fn input_len(&self) -> usize {
        self.batch * self.in_channels * self.height * self.width
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch", self.batch),
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
            ("dilation", self.dilation),
            ("groups", self.groups),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidParameter(format!("{name} must be > 0")));
        }
        if self.in_channels % self.groups != 0 || self.out_channels % self.groups != 0 {
            return Err(Error::InvalidParameter(format!(
                "channels ({} in, {} out) must be divisible by groups ({})",
                self.in_channels, self.out_channels, self.groups
            )));
        }
        Ok(())
    }

    /// Visit every (output, input, weight) index triple that contributes to
    /// the convolution. Padding taps are skipped.
    fn for_each_tap(&self, out_h: usize, out_w: usize, mut f: impl FnMut(usize, usize, usize)) {
        let (ipg, opg) = (self.in_per_group(), self.out_per_group());
        let k = self.kernel_size;
        for n in 0..self.batch {
            for oc in 0..self.out_channels {
                let g = oc / opg;
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let out_idx = ((n * self.out_channels + oc) * out_h + oh) * out_w + ow;
                        for icg in 0..ipg {
                            let ic = g * ipg + icg;
                            for kh in 0..k {
                                let ih = (oh * self.stride + kh * self.dilation)
                                    .checked_sub(self.padding)
                                    .filter(|&ih| ih < self.height);
                                let Some(ih) = ih else { continue };
                                for kw in 0..k {
                                    let iw = (ow * self.stride + kw * self.dilation)
                                        .checked_sub(self.padding)
                                        .filter(|&iw| iw < self.width);
                                    let Some(iw) = iw else { continue };
                                    let in_idx =
                                        ((n * self.in_channels + ic) * self.height + ih) * self.width + iw;
                                    let w_idx = ((oc * ipg + icg) * k + kh) * k + kw;
                                    f(out_idx, in_idx, w_idx);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// 2-D convolution over NCHW input
///
/// # Arguments
/// * `input` - `[batch, in_channels, height, width]` flattened
/// * `weight` - `[out_channels, in_channels / groups, k, k]` flattened
/// * `bias` - optional `[out_channels]`
///
/// Returns `[batch, out_channels, out_h, out_w]` flattened.
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    shape: Conv2dShape,
) -> Result<Tensor> {
    shape.validate()?;
    check_len(input, shape.input_len())?;
    check_len(weight, shape.weight_len())?;
    if let Some(b) = bias {
        check_len(b, shape.out_channels)?;
    }
    let (out_h, out_w) = shape.output_hw()?;
    let plane = out_h * out_w;

    let mut out = vec![0.0; shape.batch * shape.out_channels * plane];
    if let Some(b) = bias {
        for (idx, v) in out.iter_mut().enumerate() {
            *v = b.data()[(idx / plane) % shape.out_channels];
        }
    }
    let (x, w) = (input.data(), weight.data());
    shape.for_each_tap(out_h, out_w, |o, i, k| out[o] += x[i] * w[k]);

    let requires_grad = input.requires_grad()
        || weight.requires_grad()
        || bias.is_some_and(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Conv2dBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            shape,
            out_h,
            out_w,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct Conv2dBackward {
    input: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    shape: Conv2dShape,
    out_h: usize,
    out_w: usize,
    result_grad: GradCell,
}

impl BackwardOp for Conv2dBackward {
    fn inputs(&self) -> Vec<&Tensor> {
        let mut inputs = vec![&self.input, &self.weight];
        inputs.extend(self.bias.as_ref());
        inputs
    }

    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (x, w) = (self.input.data(), self.weight.data());
            let mut grad_x = Array1::<f32>::zeros(x.len());
            let mut grad_w = Array1::<f32>::zeros(w.len());
            self.shape.for_each_tap(self.out_h, self.out_w, |o, i, k| {
                let g = grad_output[o];
                grad_x[i] += g * w[k];
                grad_w[k] += g * x[i];
            });

            if self.input.requires_grad() {
                self.input.accumulate_grad(grad_x);
            }
            if self.weight.requires_grad() {
                self.weight.accumulate_grad(grad_w);
            }
            if let Some(bias) = self.bias.as_ref().filter(|b| b.requires_grad()) {
                let plane = self.out_h * self.out_w;
                let mut grad_b = Array1::<f32>::zeros(self.shape.out_channels);
                for (idx, &g) in grad_output.iter().enumerate() {
                    grad_b[(idx / plane) % self.shape.out_channels] += g;
                }
                bias.accumulate_grad(grad_b);
            }
        }
    }
}
