//! Validated quantization bit width

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits a quantizer targets.
///
/// Valid values are `1..=16`, plus `32` which means full precision: every
/// quantizer built with it is an exact identity in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BitWidth(u8);

impl BitWidth {
    /// Pass-through sentinel
    pub const FULL_PRECISION: BitWidth = BitWidth(32);

    /// Largest bit width that is actually quantized
    pub const MAX_QUANTIZED: u8 = 16;

    /// Validate a raw bit width.
    pub fn new(bits: u8) -> Result<Self> {
        match bits {
            1..=Self::MAX_QUANTIZED | 32 => Ok(Self(bits)),
            _ => Err(Error::InvalidBitWidth(bits)),
        }
    }

    /// Raw number of bits
    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_full_precision(self) -> bool {
        self.0 == 32
    }

    /// Number of grid steps, `2^k - 1`.
    pub fn levels(self) -> f32 {
        ((1u64 << self.0) - 1) as f32
    }
}

impl TryFrom<u8> for BitWidth {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        Self::new(bits)
    }
}

impl From<BitWidth> for u8 {
    fn from(bits: BitWidth) -> u8 {
        bits.0
    }
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
