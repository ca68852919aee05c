//! Loading quantization specs from YAML

use super::schema::QuantSpec;
use super::validate::validate_spec;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Load and validate a spec from a YAML file
///
/// Read failures surface as [`Error::Io`], everything after as
/// [`Error::ConfigError`].
pub fn load_spec<P: AsRef<Path>>(path: P) -> Result<QuantSpec> {
    let yaml_content = fs::read_to_string(path.as_ref()).inspect_err(|e| {
        tracing::warn!(path = %path.as_ref().display(), error = %e, "failed to read config file");
    })?;
    parse_spec(&yaml_content)
}

/// Parse and validate a spec from YAML text
pub fn parse_spec(yaml: &str) -> Result<QuantSpec> {
    let spec: QuantSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;

    validate_spec(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;

    tracing::debug!(
        w_bit = spec.w_bit.get(),
        a_bit = spec.activation.a_bit().get(),
        "quantization spec loaded"
    );
    Ok(spec)
}
