//! YAML schema definitions for quantization-aware training

use crate::quant::{BitWidth, DEFAULT_ALPHA, DEFAULT_SCALE_COEF};
use serde::{Deserialize, Serialize};

/// Quantization settings for a layer family plus the optimizer that trains
/// them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantSpec {
    /// Weight bit width (1..=16, or 32 for full precision), checked on parse
    #[serde(default = "default_full_precision")]
    pub w_bit: BitWidth,

    /// Activation quantizer applied after the layer
    #[serde(default)]
    pub activation: ActivationSpec,

    /// Optimizer for weights and learnable thresholds
    #[serde(default)]
    pub optimizer: OptimSpec,
}

/// Activation quantizer selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationSpec {
    /// Learnable clipping threshold
    Pact {
        a_bit: BitWidth,
        #[serde(default = "default_alpha")]
        alpha: f32,
    },
    /// Fixed clipping threshold
    FixedClip {
        a_bit: BitWidth,
        #[serde(default = "default_scale_coef")]
        scale_coef: f32,
    },
    /// `clamp(0.1 x, 0, 1)`
    Clamp { a_bit: BitWidth },
}

impl ActivationSpec {
    pub fn a_bit(&self) -> BitWidth {
        match self {
            ActivationSpec::Pact { a_bit, .. }
            | ActivationSpec::FixedClip { a_bit, .. }
            | ActivationSpec::Clamp { a_bit } => *a_bit,
        }
    }
}

impl Default for ActivationSpec {
    fn default() -> Self {
        ActivationSpec::Pact {
            a_bit: default_full_precision(),
            alpha: default_alpha(),
        }
    }
}

/// Optimizer specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "sgd"
    #[serde(default = "default_optimizer")]
    pub name: String,

    /// Learning rate
    #[serde(default = "default_lr")]
    pub lr: f32,

    /// Momentum factor
    #[serde(default)]
    pub momentum: f32,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self {
            name: default_optimizer(),
            lr: default_lr(),
            momentum: 0.0,
        }
    }
}

fn default_full_precision() -> BitWidth {
    BitWidth::FULL_PRECISION
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

fn default_scale_coef() -> f32 {
    DEFAULT_SCALE_COEF
}

fn default_optimizer() -> String {
    "sgd".to_string()
}

fn default_lr() -> f32 {
    0.01
}
