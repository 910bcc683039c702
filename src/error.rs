//! Error types raised by the transition density matrix engine.

use std::error::Error;
use std::fmt;

use itertools::Itertools;

/// An enumerated type for fatal conditions encountered while assembling transition density
/// matrices.
///
/// All variants indicate invariant violations in the input or in an upstream solver; none of
/// them is transient. They are raised through [`anyhow::Error`] and can be recovered with
/// `downcast_ref::<TdmError>()`.
#[derive(Debug, Clone, PartialEq)]
pub enum TdmError {
    /// Variant for a pair of states whose excitation pattern has no assembly rule, or for an
    /// intermediate request whose local operator pattern is not supported.
    UnsupportedExcitationPattern {
        /// The bra state.
        bra: usize,

        /// The ket state.
        ket: usize,

        /// The fragment at which the unsupported request was made, if the failure is local.
        fragment: Option<usize>,

        /// The per-fragment `(α, β)` hops of the pair.
        hops: Vec<(i64, i64)>,
    },

    /// Variant for a computed amplitude that violates a required symmetry relation.
    ConsistencyViolation {
        /// The fragment whose amplitude is at fault, if any.
        fragment: Option<usize>,

        /// The bra state.
        bra: usize,

        /// The ket state.
        ket: usize,

        /// The spin channel of the offending quantity.
        channel: String,

        /// The largest deviation found.
        deviation: f64,
    },

    /// Variant for inconsistent or out-of-range inputs detected at entry validation.
    MalformedInput(String),
}

impl fmt::Display for TdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TdmError::UnsupportedExcitationPattern {
                bra,
                ket,
                fragment,
                hops,
            } => {
                let hops_str = hops
                    .iter()
                    .map(|(a, b)| format!("({a:+}, {b:+})"))
                    .join(", ");
                match fragment {
                    Some(frag) => write!(
                        f,
                        "Unsupported excitation pattern at fragment {frag} for bra {bra} and ket {ket}; hops: [{hops_str}]."
                    ),
                    None => write!(
                        f,
                        "Unsupported excitation pattern for bra {bra} and ket {ket}; hops: [{hops_str}]."
                    ),
                }
            }
            TdmError::ConsistencyViolation {
                fragment,
                bra,
                ket,
                channel,
                deviation,
            } => {
                let frag_str = fragment
                    .map(|frag| format!("fragment {frag}, "))
                    .unwrap_or_default();
                write!(
                    f,
                    "Consistency violation ({frag_str}bra {bra}, ket {ket}, channel {channel}): largest deviation {deviation:.3e}."
                )
            }
            TdmError::MalformedInput(msg) => write!(f, "Malformed input: {msg}"),
        }
    }
}

impl Error for TdmError {}
