//! Numeric scalar bounds shared across the engine.

use std::fmt;

use ndarray::{LinalgScalar, ScalarOperand};
use num_complex::ComplexFloat;
use num_traits::ToPrimitive;

/// Trait collecting the bounds required of the amplitude and density matrix element type.
///
/// This is implemented for `f64` and `Complex<f64>` (and their single-precision counterparts)
/// through a blanket implementation.
pub trait TdmScalar:
    ComplexFloat + LinalgScalar + ScalarOperand + Send + Sync + fmt::Debug + fmt::LowerExp
{
}

impl<T> TdmScalar for T where
    T: ComplexFloat + LinalgScalar + ScalarOperand + Send + Sync + fmt::Debug + fmt::LowerExp
{
}

/// Returns the modulus of a scalar as an `f64`.
///
/// A modulus that cannot be represented is reported as infinite so that tolerance checks fail.
pub(crate) fn modulus<T: TdmScalar>(x: T) -> f64 {
    ComplexFloat::abs(x).to_f64().unwrap_or(f64::INFINITY)
}

/// Multiplies a scalar by a fermionic phase.
pub(crate) fn with_phase<T: TdmScalar>(x: T, negative: bool) -> T {
    if negative {
        -x
    } else {
        x
    }
}
