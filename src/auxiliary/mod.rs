//! Helper items shared across the engine.

pub mod scalar;
pub mod spin;
