//! Quantized 2-D convolution

use super::init::uniform_fan_in;
use super::Padding;
use crate::autograd::{conv2d, Conv2dShape};
use crate::error::{Error, Result};
use crate::quant::WeightQuantizer;
use crate::Tensor;
use std::fmt;

/// Convolution geometry, built up from the channel counts and kernel size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: Padding,
    pub dilation: usize,
    pub groups: usize,
    pub bias: bool,
}

impl Conv2dConfig {
    /// Stride 1, no padding, no dilation, one group, no bias
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: Padding::default(),
            dilation: 1,
            groups: 1,
            bias: false,
        }
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }
}

/// Convolution whose weight passes through a [`WeightQuantizer`] on every
/// forward call.
pub struct QuantizedConv2d {
    config: Conv2dConfig,
    padding: usize,
    quantizer: WeightQuantizer,
    /// Full-precision weight `[out, in / groups, k, k]`
    weight: Tensor,
    bias: Option<Tensor>,
}

impl QuantizedConv2d {
    /// Create a layer with randomly initialised parameters
    pub fn new(w_bit: u8, config: Conv2dConfig) -> Result<Self> {
        let probe = Self::shape_for(&config, 0, 1, 1, 1);
        probe.validate()?;
        let fan_in = config.in_channels / config.groups * config.kernel_size * config.kernel_size;
        let weight = uniform_fan_in(probe.weight_len(), fan_in);
        let bias = config
            .bias
            .then(|| uniform_fan_in(config.out_channels, fan_in));
        Self::from_parts(w_bit, config, weight, bias)
    }

    /// Create a layer from existing parameters
    pub fn from_parts(
        w_bit: u8,
        config: Conv2dConfig,
        weight: Tensor,
        bias: Option<Tensor>,
    ) -> Result<Self> {
        let quantizer = WeightQuantizer::new(w_bit)?;
        if !matches!(config.stride, 1 | 2) {
            return Err(Error::InvalidParameter(format!(
                "stride must be 1 or 2, got {}",
                config.stride
            )));
        }
        let padding = config
            .padding
            .resolve(config.kernel_size, config.stride, config.dilation);
        let probe = Self::shape_for(&config, padding, 1, 1, 1);
        probe.validate()?;

        if weight.len() != probe.weight_len() {
            return Err(Error::ShapeMismatch {
                expected: vec![
                    config.out_channels,
                    config.in_channels / config.groups,
                    config.kernel_size,
                    config.kernel_size,
                ],
                got: vec![weight.len()],
            });
        }
        match (&bias, config.bias) {
            (Some(b), true) if b.len() == config.out_channels => {}
            (None, false) => {}
            (b, _) => {
                return Err(Error::ShapeMismatch {
                    expected: vec![if config.bias { config.out_channels } else { 0 }],
                    got: vec![b.as_ref().map_or(0, Tensor::len)],
                })
            }
        }

        tracing::debug!(
            w_bit,
            in_channels = config.in_channels,
            out_channels = config.out_channels,
            kernel_size = config.kernel_size,
            stride = config.stride,
            padding,
            groups = config.groups,
            "quantized conv2d constructed"
        );

        Ok(Self {
            config,
            padding,
            quantizer,
            weight,
            bias,
        })
    }

    fn shape_for(
        config: &Conv2dConfig,
        padding: usize,
        batch: usize,
        height: usize,
        width: usize,
    ) -> Conv2dShape {
        Conv2dShape {
            batch,
            in_channels: config.in_channels,
            height,
            width,
            out_channels: config.out_channels,
            kernel_size: config.kernel_size,
            stride: config.stride,
            padding,
            dilation: config.dilation,
            groups: config.groups,
        }
    }

    /// Spatial size of the output for an input of `height x width`
    pub fn output_hw(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Self::shape_for(&self.config, self.padding, 1, height, width).output_hw()
    }

    /// Forward pass over `[batch, in_channels, height, width]` input.
    ///
    /// Returns `[batch, out_channels, out_h, out_w]`, see
    /// [`QuantizedConv2d::output_hw`].
    pub fn forward(
        &self,
        input: &Tensor,
        batch: usize,
        height: usize,
        width: usize,
    ) -> Result<Tensor> {
        let weight_q = self.quantizer.forward(&self.weight);
        let shape = Self::shape_for(&self.config, self.padding, batch, height, width);
        tracing::trace!(batch, height, width, "quantized conv2d forward");
        conv2d(input, &weight_q, self.bias.as_ref(), shape)
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    /// Padding after resolving [`Padding::Same`]
    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn quantizer(&self) -> &WeightQuantizer {
        &self.quantizer
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Weight and bias, for optimizer updates
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weight];
        if let Some(bias) = self.bias.as_mut() {
            params.push(bias);
        }
        params
    }
}

impl fmt::Display for QuantizedConv2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuantizedConv2d( Wbit={}, {}, {}, kernel={}, padding={}, stride={}, group={} )",
            self.quantizer.bits(),
            self.config.in_channels,
            self.config.out_channels,
            self.config.kernel_size,
            self.padding,
            self.config.stride,
            self.config.groups
        )
    }
}
