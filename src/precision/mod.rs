//! Mixed-precision support
//!
//! - [`Precision`]: autocast precision for the forward pass. Activations and
//!   outputs are rounded through `f16`/`bf16` while losses and reductions stay
//!   in `f32`.
//! - [`LossScaler`] / [`GradScaler`]: scaled backward pass with overflow
//!   detection, optional gradient clipping and the optimizer step.

mod scaler;

pub use scaler::{GradScaler, LossScaler, StepReport};

use half::{bf16, f16};
use ndarray::{ArrayBase, DataMut, Dimension};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type precision levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floating point
    Fp32,
    /// 16-bit floating point (IEEE half precision)
    #[default]
    Fp16,
    /// 16-bit brain floating point (truncated mantissa)
    Bf16,
}

impl Precision {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
        }
    }

    /// Whether this is a reduced precision type
    pub fn is_reduced(&self) -> bool {
        matches!(self, Precision::Fp16 | Precision::Bf16)
    }

    /// Round a value to the nearest representable value of this precision
    pub fn round(&self, value: f32) -> f32 {
        match self {
            Precision::Fp32 => value,
            Precision::Fp16 => f16::from_f32(value).to_f32(),
            Precision::Bf16 => bf16::from_f32(value).to_f32(),
        }
    }

    /// Round every element of an array in place
    pub fn cast_array<S, D>(&self, array: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        if self.is_reduced() {
            let precision = *self;
            array.mapv_inplace(|v| precision.round(v));
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fp32_round_is_identity() {
        let v = 0.1_f32 + 1e-7;
        assert_eq!(Precision::Fp32.round(v), v);
    }

    #[test]
    fn test_fp16_round_loses_mantissa() {
        let v = 1.0001_f32;
        let r = Precision::Fp16.round(v);
        assert_ne!(r, v);
        assert!((r - v).abs() < 1e-3);
    }

    #[test]
    fn test_fp16_overflow_is_infinite() {
        assert!(Precision::Fp16.round(1e6).is_infinite());
        assert!(Precision::Bf16.round(1e6).is_finite());
    }

    #[test]
    fn test_cast_array() {
        let mut a = array![[1.0001_f32, 2.0], [3.0, 4.0]];
        Precision::Bf16.cast_array(&mut a);
        assert_eq!(a[[0, 1]], 2.0);
        assert_ne!(a[[0, 0]], 1.0001);
    }

    #[test]
    fn test_serde_names() {
        let p: Precision = serde_yaml::from_str("bf16").unwrap();
        assert_eq!(p, Precision::Bf16);
        assert_eq!(Precision::default().to_string(), "fp16");
    }
}
