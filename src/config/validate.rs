//! Configuration validation

use super::schema::{ActivationSpec, QuantSpec};

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid PACT alpha: {0} (must be > 0.0)")]
    InvalidAlpha(f32),

    #[error("Invalid clip coefficient: {0} (must be > 0.0)")]
    InvalidScaleCoef(f32),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid momentum: {0} (must be in [0.0, 1.0))")]
    InvalidMomentum(f32),

    #[error("Invalid optimizer: {0} (must be: sgd)")]
    InvalidOptimizer(String),
}

/// Validate a quantization specification
///
/// Bit widths are already checked when the spec is deserialized. The
/// quantizers themselves accept any threshold; positivity of `alpha` and
/// `scale_coef` is enforced here, at configuration time.
pub fn validate_spec(spec: &QuantSpec) -> Result<(), ValidationError> {
    match spec.activation {
        ActivationSpec::Pact { alpha, .. } if !(alpha > 0.0 && alpha.is_finite()) => {
            return Err(ValidationError::InvalidAlpha(alpha));
        }
        ActivationSpec::FixedClip { scale_coef, .. }
            if !(scale_coef > 0.0 && scale_coef.is_finite()) =>
        {
            return Err(ValidationError::InvalidScaleCoef(scale_coef));
        }
        _ => {}
    }

    let optimizer = &spec.optimizer;
    if optimizer.name.to_lowercase() != "sgd" {
        return Err(ValidationError::InvalidOptimizer(optimizer.name.clone()));
    }
    if !(optimizer.lr > 0.0) {
        return Err(ValidationError::InvalidLearningRate(optimizer.lr));
    }
    if !(0.0..1.0).contains(&optimizer.momentum) {
        return Err(ValidationError::InvalidMomentum(optimizer.momentum));
    }

    Ok(())
}
